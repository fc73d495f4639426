//! Edit-distance string similarity with a common-prefix boost.

/// Minimum length (in chars) for edit-distance scoring; shorter strings
/// only score on exact (case-insensitive) equality.
pub const MIN_FUZZY_LEN: usize = 3;

/// Prefix lengths above this earn the boost
const PREFIX_BOOST_MIN: usize = 2;

const PREFIX_BOOST_FACTOR: f64 = 0.1;

/// Similarity between two normalized strings (0.0 to 1.0).
///
/// `1 - levenshtein / max_len`, plus `0.1 * prefix / min_len` when the
/// strings share more than two leading chars, capped at 1.0. The boost
/// favors titles that diverge only in a trailing suffix ("song" vs
/// "song remix").
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let len_a = a.chars().count();
    let len_b = b.chars().count();

    if len_a < MIN_FUZZY_LEN || len_b < MIN_FUZZY_LEN {
        return if a.to_lowercase() == b.to_lowercase() {
            1.0
        } else {
            0.0
        };
    }

    let distance = strsim::levenshtein(a, b);
    let max_len = len_a.max(len_b);
    let mut score = 1.0 - distance as f64 / max_len as f64;

    let prefix = common_prefix_len(a, b);
    if prefix > PREFIX_BOOST_MIN {
        score += PREFIX_BOOST_FACTOR * (prefix as f64 / len_a.min(len_b) as f64);
    }

    score.min(1.0)
}

/// Length in chars of the case-insensitive common prefix.
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x.to_lowercase().eq(y.to_lowercase()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_identity() {
        for s in ["a", "ab", "abc", "yesterday", "shape of you", "björk"] {
            assert_eq!(similarity(s, s), 1.0, "similarity({s:?}, {s:?})");
        }
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(similarity("", "abc"), 0.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn test_short_strings_exact_only() {
        assert_eq!(similarity("ab", "AB"), 1.0);
        assert_eq!(similarity("ab", "ac"), 0.0);
        assert_eq!(similarity("ab", "abc"), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            ("yesterday", "yesterdays"),
            ("the beatles", "beatles"),
            ("shape of you", "shape of me"),
            ("abc", "xyz"),
            ("song", "song remix"),
        ];
        for (a, b) in pairs {
            assert!((similarity(a, b) - similarity(b, a)).abs() < EPSILON, "{a} / {b}");
        }
    }

    #[test]
    fn test_levenshtein_ratio_without_prefix() {
        // distance 3 over max length 3, no shared prefix
        assert_eq!(similarity("abc", "xyz"), 0.0);
        // "kitten"/"sitting": distance 3, max 7, prefix 0
        assert!((similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < EPSILON);
    }

    #[test]
    fn test_prefix_boost() {
        // "song" vs "song remix": distance 6, max 10, prefix 4, min 4
        let expected = (1.0 - 6.0 / 10.0) + 0.1 * (4.0 / 4.0);
        assert!((similarity("song", "song remix") - expected).abs() < EPSILON);
    }

    #[test]
    fn test_prefix_boost_requires_three_chars() {
        // prefix "ab" only: no boost
        assert!((similarity("abcd", "abxy") - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_range() {
        let samples = ["", "a", "yesterday", "yesterdays", "hey jude", "jude hey"];
        for a in samples {
            for b in samples {
                let s = similarity(a, b);
                assert!((0.0..=1.0).contains(&s), "{a} / {b} = {s}");
            }
        }
    }

    #[test]
    fn test_common_prefix_case_insensitive() {
        assert_eq!(common_prefix_len("Yesterday", "yes"), 3);
        assert_eq!(common_prefix_len("abc", "xbc"), 0);
    }
}
