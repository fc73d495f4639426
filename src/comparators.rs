//! Per-field comparators: title, artist, album and filename.
//!
//! Each returns a score in [0.0, 1.0]. Missing artist or album data yields
//! `NEUTRAL_SCORE` instead of zero so poorly tagged files are not excluded.

use crate::config::NEUTRAL_SCORE;
use crate::error::{MatchError, Result};
use crate::models::{LocalFile, RemoteTrack};
use crate::normalize::{
    artist_from_filename, file_stem, normalize, normalize_str, strip_noise_and_featuring, words,
};
use crate::similarity::similarity;

/// Score given when one stripped title contains the other
pub const CONTAINMENT_SCORE: f64 = 0.85;

/// Score given when titles only match after noise/featuring stripping
pub const STRIPPED_EXACT_SCORE: f64 = 0.95;

/// Pairwise artist similarity above which an artist counts as present
pub const PARTIAL_ARTIST_THRESHOLD: f64 = 0.8;

// ============================================================================
// Title
// ============================================================================

/// Compare titles using exact, stripped, fuzzy, containment and word-order strategies.
pub fn title_similarity(remote_title: &str, local_title: &str) -> f64 {
    let remote = normalize_str(remote_title);
    let local = normalize_str(local_title);

    if remote.is_empty() || local.is_empty() {
        return 0.0;
    }
    if remote == local {
        return 1.0;
    }

    let remote_clean = strip_noise_and_featuring(&remote);
    let local_clean = strip_noise_and_featuring(&local);

    if remote_clean == local_clean {
        return STRIPPED_EXACT_SCORE;
    }

    let mut score = similarity(&remote_clean, &local_clean);

    // A side emptied by stripping counts as contained
    if remote_clean.contains(&local_clean) || local_clean.contains(&remote_clean) {
        score = score.max(CONTAINMENT_SCORE);
    }

    score.max(word_order_similarity(&remote_clean, &local_clean))
}

/// Fraction of words shared regardless of order.
/// Each word of `b` can be consumed once; divided by the larger word count.
/// e.g., "hey jude" vs "jude hey" → 1.0
pub fn word_order_similarity(a: &str, b: &str) -> f64 {
    let words_a = words(a);
    let words_b = words(b);

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let mut used = vec![false; words_b.len()];
    let mut matched = 0usize;

    for word in &words_a {
        let hit = words_b
            .iter()
            .enumerate()
            .find(|(i, candidate)| !used[*i] && candidate.to_lowercase() == word.to_lowercase());
        if let Some((i, _)) = hit {
            used[i] = true;
            matched += 1;
        }
    }

    matched as f64 / words_a.len().max(words_b.len()) as f64
}

// ============================================================================
// Artist
// ============================================================================

/// Normalize a credited artist list, dropping entries that end up empty.
pub fn normalize_artists(artists: &[String]) -> Vec<String> {
    artists
        .iter()
        .map(|a| normalize_str(a))
        .filter(|a| !a.is_empty())
        .collect()
}

/// Artists credited on a local file. Falls back to the "Artist - Title"
/// file name when the file has no artist tags.
pub fn local_artists(file: &LocalFile) -> Vec<String> {
    let artists = normalize_artists(&file.artists);
    if !artists.is_empty() {
        return artists;
    }
    artist_from_filename(&file.location).into_iter().collect()
}

/// Compare normalized artist lists (multi-artist, featuring-aware).
///
/// Uses max-over-pairs, with a partial-credit fraction for collaborations
/// where several remote artists each appear on the file.
pub fn artist_similarity(remote_artists: &[String], local_artists: &[String]) -> f64 {
    if remote_artists.is_empty() || local_artists.is_empty() {
        return NEUTRAL_SCORE;
    }

    let mut best: f64 = 0.0;
    for remote in remote_artists {
        for local in local_artists {
            if remote.to_lowercase() == local.to_lowercase() {
                return 1.0;
            }
            best = best.max(similarity(remote, local));
        }
    }

    best.max(partial_artist_fraction(remote_artists, local_artists))
}

/// Share of remote artists that have a close local counterpart.
pub fn partial_artist_fraction(remote_artists: &[String], local_artists: &[String]) -> f64 {
    let total = remote_artists.len().max(local_artists.len());
    if total == 0 {
        return 0.0;
    }

    let present = remote_artists
        .iter()
        .filter(|remote| {
            local_artists
                .iter()
                .any(|local| similarity(remote, local) > PARTIAL_ARTIST_THRESHOLD)
        })
        .count();

    present as f64 / total as f64
}

// ============================================================================
// Album
// ============================================================================

pub fn album_similarity(remote_album: Option<&str>, local_album: Option<&str>) -> f64 {
    let remote = normalize(remote_album);
    let local = normalize(local_album);

    if remote.is_empty() || local.is_empty() {
        return NEUTRAL_SCORE;
    }
    if remote == local {
        return 1.0;
    }

    similarity(&remote, &local)
}

// ============================================================================
// Filename
// ============================================================================

/// Compare the file's bare name with the expected "{artist} - {title}" pattern.
pub fn filename_similarity(track: &RemoteTrack, file: &LocalFile) -> Result<f64> {
    let stem = file_stem(&file.location).ok_or_else(|| MatchError::InvalidLocation {
        location: file.location.clone(),
    })?;

    let expected = format!("{} - {}", track.primary_artist().unwrap_or(""), track.title);

    Ok(similarity(&normalize_str(stem), &normalize_str(&expected)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_title_exact_after_normalization() {
        assert_eq!(title_similarity("Yesterday", "yesterday"), 1.0);
        assert_eq!(title_similarity("Hey Jude!", "hey jude"), 1.0);
        // Bracketed noise disappears in plain normalization
        assert_eq!(title_similarity("Shape of You (Official Video)", "Shape of You"), 1.0);
    }

    #[test]
    fn test_title_stripped_match() {
        assert_eq!(title_similarity("Shape of You Official Video", "Shape of You"), 0.95);
        assert_eq!(title_similarity("Song feat. Someone", "Song"), 0.95);
    }

    #[test]
    fn test_title_empty() {
        assert_eq!(title_similarity("", "Song"), 0.0);
        assert_eq!(title_similarity("Song", "!!!"), 0.0);
    }

    #[test]
    fn test_title_containment() {
        let score = title_similarity("Bohemian Rhapsody", "Bohemian Rhapsody Live at Wembley");
        assert!(score >= 0.85, "score = {score}");
    }

    #[test]
    fn test_title_stripped_to_empty_is_contained() {
        // "x" is a featuring token, so the remote side strips to nothing
        assert_eq!(title_similarity("X", "Something"), 0.85);
        assert_eq!(title_similarity("Official Video", "Yesterday"), 0.85);
    }

    #[test]
    fn test_title_word_order() {
        assert_eq!(title_similarity("Jude Hey", "Hey Jude"), 1.0);
        assert_eq!(word_order_similarity("hey jude", "jude hey"), 1.0);
        assert_eq!(word_order_similarity("a a b", "a b c"), 2.0 / 3.0);
        assert_eq!(word_order_similarity("", "a"), 0.0);
    }

    #[test]
    fn test_title_unrelated_is_low() {
        assert!(title_similarity("Yesterday", "Bohemian Rhapsody") < 0.5);
    }

    #[test]
    fn test_artist_missing_is_neutral() {
        assert_eq!(artist_similarity(&[], &names(&["beatles"])), 0.5);
        assert_eq!(artist_similarity(&names(&["beatles"]), &[]), 0.5);
    }

    #[test]
    fn test_artist_exact_pair() {
        let remote = names(&["ed sheeran", "justin bieber"]);
        let local = names(&["justin bieber"]);
        assert_eq!(artist_similarity(&remote, &local), 1.0);
        assert_eq!(
            artist_similarity(&names(&["The Beatles"]), &names(&["the beatles"])),
            1.0
        );
    }

    #[test]
    fn test_artist_fuzzy() {
        let score = artist_similarity(&names(&["beatles"]), &names(&["the beatles"]));
        assert!(score > 0.6 && score < 1.0, "score = {score}");
    }

    #[test]
    fn test_partial_artist_fraction() {
        let remote = names(&["daft punk", "pharrell williams", "nile rodgers"]);
        let local = names(&["daft punk", "pharrell william"]);
        // two of three remote artists present, divided by max(3, 2)
        assert!((partial_artist_fraction(&remote, &local) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_local_artists_filename_fallback() {
        let file = LocalFile::new("/music/The Beatles - Yesterday.mp3", "Yesterday", &[""]);
        assert_eq!(local_artists(&file), vec!["the beatles".to_string()]);

        let tagged = LocalFile::new("/music/x.mp3", "Yesterday", &["The Beatles"]);
        assert_eq!(local_artists(&tagged), vec!["the beatles".to_string()]);

        let bare = LocalFile::new("/music/Yesterday.mp3", "Yesterday", &[]);
        assert!(local_artists(&bare).is_empty());
    }

    #[test]
    fn test_album_neutral_when_missing() {
        assert_eq!(album_similarity(None, Some("Help!")), 0.5);
        assert_eq!(album_similarity(Some("Help!"), None), 0.5);
        assert_eq!(album_similarity(Some(""), Some("Help!")), 0.5);
    }

    #[test]
    fn test_album_exact_and_fuzzy() {
        assert_eq!(album_similarity(Some("Help!"), Some("help")), 1.0);
        assert_eq!(album_similarity(Some("Abbey Road (Remastered)"), Some("Abbey Road")), 1.0);
        let score = album_similarity(Some("Abbey Road"), Some("Abbey Roads"));
        assert!(score > 0.9 && score <= 1.0);
    }

    #[test]
    fn test_filename_similarity() {
        let track = RemoteTrack::new("t1", "Yesterday", &["The Beatles"]);
        let file = LocalFile::new("/music/The Beatles - Yesterday.mp3", "", &[]);
        assert_eq!(filename_similarity(&track, &file).unwrap(), 1.0);

        let other = LocalFile::new("/music/track01.mp3", "", &[]);
        assert!(filename_similarity(&track, &other).unwrap() < 0.5);
    }

    #[test]
    fn test_filename_without_artist() {
        let track = RemoteTrack::new("t1", "Yesterday", &[]);
        let file = LocalFile::new("/music/Yesterday.mp3", "", &[]);
        // expected pattern " - Yesterday" normalizes to "- yesterday"
        let score = filename_similarity(&track, &file).unwrap();
        assert!(score > 0.7 && score < 1.0, "score = {score}");
    }

    #[test]
    fn test_filename_invalid_location() {
        let track = RemoteTrack::new("t1", "Yesterday", &["The Beatles"]);
        let file = LocalFile::new("/music/", "Yesterday", &[]);
        let err = filename_similarity(&track, &file).unwrap_err();
        assert!(matches!(err, MatchError::InvalidLocation { .. }));
    }
}
