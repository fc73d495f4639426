//! Scoring a remote track against one local file.
//!
//! This module combines the four field comparators into a single
//! confidence:
//! - Weighted aggregation of title/artist/album/filename scores
//! - Bonuses and penalties (exact pair, album confirmation, collaborations,
//!   lossless files)
//! - Match type classification

use crate::comparators::{
    album_similarity, artist_similarity, filename_similarity, local_artists, normalize_artists,
    title_similarity,
};
use crate::config::MatchConfig;
use crate::error::Result;
use crate::models::{FieldScoreBreakdown, LocalFile, MatchType, RemoteTrack, ScoredMatch};

// ============================================================================
// Thresholds
// ============================================================================

/// Title and artist both above this: exact pair (bonus + ExactMatch)
pub const EXACT_FIELD_THRESHOLD: f64 = 0.95;

/// Album above this: album bonus, AlbumConfirmed
pub const ALBUM_CONFIRM_THRESHOLD: f64 = 0.90;

/// HighConfidence requires title above this...
pub const HIGH_TITLE_THRESHOLD: f64 = 0.90;

/// ...and artist above this
pub const HIGH_ARTIST_THRESHOLD: f64 = 0.80;

/// Remote tracks crediting more artists than this are penalized
pub const COLLABORATION_ARTIST_COUNT: usize = 2;

/// Extensions that earn the lossless bonus
pub const LOSSLESS_EXTENSIONS: &[&str] = &["flac", "wav"];

// ============================================================================
// Classification
// ============================================================================

/// First matching rule wins.
pub fn classify(breakdown: &FieldScoreBreakdown) -> MatchType {
    if breakdown.title > EXACT_FIELD_THRESHOLD && breakdown.artist > EXACT_FIELD_THRESHOLD {
        MatchType::ExactMatch
    } else if breakdown.title > HIGH_TITLE_THRESHOLD && breakdown.artist > HIGH_ARTIST_THRESHOLD {
        MatchType::HighConfidence
    } else if breakdown.album > ALBUM_CONFIRM_THRESHOLD {
        MatchType::AlbumConfirmed
    } else if breakdown.filename > breakdown.title {
        MatchType::FilenameMatch
    } else {
        MatchType::FuzzyMatch
    }
}

pub fn is_lossless(extension: &str) -> bool {
    LOSSLESS_EXTENSIONS.contains(&extension)
}

// ============================================================================
// Scorer
// ============================================================================

/// Stateless apart from its configuration; safe to share across workers.
#[derive(Debug, Clone, Default)]
pub struct MatchScorer {
    config: MatchConfig,
}

impl MatchScorer {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Per-field similarity for one pair.
    pub fn breakdown(&self, track: &RemoteTrack, file: &LocalFile) -> Result<FieldScoreBreakdown> {
        Ok(FieldScoreBreakdown {
            title: title_similarity(&track.title, &file.title),
            artist: artist_similarity(&normalize_artists(&track.artists), &local_artists(file)),
            album: album_similarity(track.album.as_deref(), file.album.as_deref()),
            filename: filename_similarity(track, file)?,
        })
    }

    /// Weighted sum of the field scores, before adjustments.
    pub fn weighted_base(&self, breakdown: &FieldScoreBreakdown) -> f64 {
        let w = &self.config.weights;
        breakdown.title * w.title
            + breakdown.artist * w.artist
            + breakdown.album * w.album
            + breakdown.filename * w.filename
    }

    /// Sum of bonuses and penalties for one pair.
    pub fn adjustments(
        &self,
        breakdown: &FieldScoreBreakdown,
        track: &RemoteTrack,
        file: &LocalFile,
    ) -> f64 {
        let mut adjustment = 0.0;

        if breakdown.title > EXACT_FIELD_THRESHOLD && breakdown.artist > EXACT_FIELD_THRESHOLD {
            adjustment += self.config.exact_bonus;
        }

        if breakdown.album > ALBUM_CONFIRM_THRESHOLD {
            adjustment += self.config.album_bonus;
        }

        // Collaborations are harder to pin down exactly
        if track.artists.len() > COLLABORATION_ARTIST_COUNT {
            adjustment -= self.config.collaboration_penalty;
        }

        // Tie-break toward higher-fidelity copies
        if is_lossless(&file.extension()) {
            adjustment += self.config.lossless_bonus;
        }

        adjustment
    }

    /// Score one (track, file) pair. Deterministic for unchanged inputs.
    pub fn score(&self, track: &RemoteTrack, file: &LocalFile) -> Result<ScoredMatch> {
        let breakdown = self.breakdown(track, file)?;
        let raw_score = self.weighted_base(&breakdown) + self.adjustments(&breakdown, track, file);

        Ok(ScoredMatch {
            confidence: raw_score.clamp(0.0, 1.0),
            raw_score,
            match_type: classify(&breakdown),
            breakdown,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;

    fn breakdown(title: f64, artist: f64, album: f64, filename: f64) -> FieldScoreBreakdown {
        FieldScoreBreakdown {
            title,
            artist,
            album,
            filename,
        }
    }

    #[test]
    fn test_exact_match_scenario() {
        let scorer = MatchScorer::default();
        let track = RemoteTrack::new("t1", "Yesterday", &["The Beatles"]);
        let file = LocalFile::new("/music/yesterday.mp3", "yesterday", &["the beatles"]);

        let scored = scorer.score(&track, &file).unwrap();
        assert_eq!(scored.breakdown.title, 1.0);
        assert_eq!(scored.breakdown.artist, 1.0);
        assert_eq!(scored.match_type, MatchType::ExactMatch);
        assert!(scored.confidence >= 0.95, "confidence = {}", scored.confidence);
        assert!(scored.confidence <= 1.0);
    }

    #[test]
    fn test_noise_stripped_title_scenario() {
        let scorer = MatchScorer::default();
        let track = RemoteTrack::new("t1", "Shape of You (Official Video)", &["Ed Sheeran"]);
        let file = LocalFile::new("/music/Ed Sheeran - Shape of You.mp3", "Shape of You", &["Ed Sheeran"]);

        let scored = scorer.score(&track, &file).unwrap();
        assert!(scored.confidence >= 0.95, "confidence = {}", scored.confidence);
        assert_eq!(scored.match_type, MatchType::ExactMatch);
    }

    #[test]
    fn test_missing_album_is_neutral() {
        let scorer = MatchScorer::default();
        let track = RemoteTrack::new("t1", "Yesterday", &["The Beatles"]);
        let file = LocalFile::new("/music/yesterday.mp3", "Yesterday", &["The Beatles"]).with_album("Help!");

        let scored = scorer.score(&track, &file).unwrap();
        assert_eq!(scored.breakdown[Field::Album], 0.5);
    }

    #[test]
    fn test_weighted_base_uses_weights() {
        let scorer = MatchScorer::default();
        let b = breakdown(1.0, 0.5, 0.5, 0.0);
        let expected = 0.40 + 0.35 * 0.5 + 0.15 * 0.5;
        assert!((scorer.weighted_base(&b) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_album_bonus() {
        let scorer = MatchScorer::default();
        let track = RemoteTrack::new("t1", "Something", &["The Beatles"]).with_album("Abbey Road");
        let with_album =
            LocalFile::new("/music/a.mp3", "Something Else Entirely", &["Other"]).with_album("Abbey Road");
        let without_album = LocalFile::new("/music/a.mp3", "Something Else Entirely", &["Other"]);

        let a = scorer.score(&track, &with_album).unwrap();
        let b = scorer.score(&track, &without_album).unwrap();
        // album 1.0 vs 0.5 neutral: weight difference plus the bonus
        assert!((a.raw_score - b.raw_score - (0.15 * 0.5 + 0.05)).abs() < 1e-9);
        assert_eq!(a.match_type, MatchType::AlbumConfirmed);
    }

    #[test]
    fn test_collaboration_penalty() {
        let scorer = MatchScorer::default();
        let solo = RemoteTrack::new("t1", "Get Lucky", &["Daft Punk"]);
        let collab = RemoteTrack::new("t1", "Get Lucky", &["Daft Punk", "Pharrell Williams", "Nile Rodgers"]);
        let file = LocalFile::new("/music/a.mp3", "Get Lucky", &["Daft Punk"]);

        let b_solo = scorer.breakdown(&solo, &file).unwrap();
        let b_collab = scorer.breakdown(&collab, &file).unwrap();
        assert_eq!(scorer.adjustments(&b_solo, &solo, &file), 0.10);
        assert!((scorer.adjustments(&b_collab, &collab, &file) - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_lossless_bonus() {
        let scorer = MatchScorer::default();
        let track = RemoteTrack::new("t1", "Song Title", &["Nobody Known"]);
        let mp3 = LocalFile::new("/music/x.mp3", "Other Words", &["Someone"]);
        let flac = LocalFile::new("/music/x.flac", "Other Words", &["Someone"]);

        let a = scorer.score(&track, &mp3).unwrap();
        let b = scorer.score(&track, &flac).unwrap();
        assert!((b.raw_score - a.raw_score - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let scorer = MatchScorer::default();
        let track = RemoteTrack::new("t1", "Yesterday", &["The Beatles"]).with_album("Help!");
        let file = LocalFile::new("/music/The Beatles - Yesterday.flac", "Yesterday", &["The Beatles"])
            .with_album("Help!");

        let scored = scorer.score(&track, &file).unwrap();
        assert!(scored.raw_score > 1.0);
        assert_eq!(scored.confidence, 1.0);
    }

    #[test]
    fn test_score_is_idempotent() {
        let scorer = MatchScorer::default();
        let track = RemoteTrack::new("t1", "Bohemian Rhapsody", &["Queen"]);
        let file = LocalFile::new("/music/queen - bohemian.mp3", "Bohemian Rhapsody Live", &["Queen"]);

        let first = scorer.score(&track, &file).unwrap();
        let second = scorer.score(&track, &file).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_confidence_range_over_samples() {
        let scorer = MatchScorer::default();
        let tracks = [
            RemoteTrack::new("t1", "", &[]),
            RemoteTrack::new("t2", "Yesterday", &["The Beatles"]).with_album("Help!"),
            RemoteTrack::new("t3", "x", &["a", "b", "c", "d"]),
        ];
        let files = [
            LocalFile::new("/m/a.wav", "", &[]),
            LocalFile::new("/m/The Beatles - Yesterday.flac", "Yesterday", &["The Beatles"]).with_album("Help!"),
            LocalFile::new("/m/zz.mp3", "zz", &["zz"]),
        ];
        for track in &tracks {
            for file in &files {
                let scored = scorer.score(track, file).unwrap();
                assert!((0.0..=1.0).contains(&scored.confidence));
            }
        }
    }

    #[test]
    fn test_classify_rules_in_order() {
        assert_eq!(classify(&breakdown(0.96, 0.96, 0.0, 0.0)), MatchType::ExactMatch);
        assert_eq!(classify(&breakdown(0.91, 0.81, 1.0, 0.0)), MatchType::HighConfidence);
        assert_eq!(classify(&breakdown(0.5, 0.5, 0.91, 0.9)), MatchType::AlbumConfirmed);
        assert_eq!(classify(&breakdown(0.5, 0.5, 0.5, 0.6)), MatchType::FilenameMatch);
        assert_eq!(classify(&breakdown(0.5, 0.5, 0.5, 0.5)), MatchType::FuzzyMatch);
        // Boundaries are strict
        assert_eq!(classify(&breakdown(0.95, 0.95, 0.9, 0.0)), MatchType::HighConfidence);
    }

    #[test]
    fn test_invalid_location_propagates() {
        let scorer = MatchScorer::default();
        let track = RemoteTrack::new("t1", "Yesterday", &["The Beatles"]);
        let file = LocalFile::new("", "Yesterday", &["The Beatles"]);
        assert!(scorer.score(&track, &file).is_err());
    }
}
