//! Text normalization shared by every field comparator.
//!
//! All functions are pure and never fail: missing or empty input yields an
//! empty string. Comparators always normalize both sides the same way, so
//! any change here shifts every score. Run tests after changes.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Bracketed/parenthesized segments with surrounding whitespace: "(Live)", "[Mono]", "{Demo}"
pub static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[\(\[\{].*?[\)\]\}]\s*").unwrap());

/// Anything that is not a letter, digit, whitespace, hyphen or apostrophe
pub static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s\-']").unwrap());

/// Runs of whitespace (including tabs/newlines)
pub static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Noise words common in video/streaming titles, matched as whole words
pub static NOISE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:official|video|audio|lyric|hd|hq|version|edit|extended|radio)\b")
        .unwrap()
});

/// Featuring indicator and everything after it: "song feat someone" → "song "
///
/// Assumes featuring credits trail the title. A standalone "x" or "with"
/// inside a real title truncates it too; that limitation is accepted.
pub static FEATURING_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\b(?:feat|ft|featuring|with|vs|x)\b|&).*$").unwrap()
});

/// "Artist - Title" filename convention
pub static ARTIST_TITLE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*-\s*(.+)$").unwrap());

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize optional text for comparison. `None` and "" give "".
pub fn normalize(raw: Option<&str>) -> String {
    match raw {
        Some(s) => normalize_str(s),
        None => String::new(),
    }
}

/// Lower-case, drop bracketed segments, replace punctuation with spaces,
/// collapse whitespace and trim.
/// e.g., "Shape of You (Official Video)" → "shape of you"
pub fn normalize_str(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    // Compose first so decomposed accents (common in macOS filenames) stay letters
    let composed: String = raw.nfc().collect();
    let lower = composed.to_lowercase();

    let result = BRACKETED.replace_all(&lower, " ");
    let result = DISALLOWED_CHARS.replace_all(&result, " ");
    collapse_whitespace(&result)
}

/// Remove noise words, then cut at the first featuring token.
/// Input is expected to be output of `normalize_str`.
/// e.g., "shape of you official video" → "shape of you"
///       "song feat someone" → "song"
pub fn strip_noise_and_featuring(normalized: &str) -> String {
    let result = NOISE_WORDS.replace_all(normalized, "");
    let result = FEATURING_TAIL.replace(&result, "");
    collapse_whitespace(&result)
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s, " ").trim().to_string()
}

/// Split on whitespace, skipping empty entries.
pub fn words(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}

// ============================================================================
// PATH HELPERS
// ============================================================================

/// Final path component, accepting both '/' and '\' separators.
fn file_name(location: &str) -> Option<&str> {
    let name = location.rsplit(['/', '\\']).next().unwrap_or("");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Bare file name without extension.
/// Returns None when the location has no file name component.
/// e.g., "/music/Artist - Song.flac" → Some("Artist - Song")
pub fn file_stem(location: &str) -> Option<&str> {
    let name = file_name(location)?;
    match name.rfind('.') {
        // ".hidden" has no extension
        Some(idx) if idx > 0 => Some(&name[..idx]),
        _ => Some(name),
    }
}

/// Lower-cased extension without the dot, or "" when there is none.
pub fn extension_of(location: &str) -> String {
    file_name(location)
        .and_then(|name| match name.rfind('.') {
            Some(idx) if idx > 0 => Some(name[idx + 1..].to_lowercase()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Artist taken from an "Artist - Title" file name, normalized.
/// Used only when a file carries no artist tags.
pub fn artist_from_filename(location: &str) -> Option<String> {
    let stem = file_stem(location)?;
    let caps = ARTIST_TITLE_FILENAME.captures(stem)?;
    let artist = normalize_str(caps.get(1)?.as_str());
    if artist.is_empty() {
        None
    } else {
        Some(artist)
    }
}

// ============================================================================
// TESTS
// ============================================================================
