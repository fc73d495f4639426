//! Core data models for playlist reconciliation.
//!
//! Remote tracks and local files are produced by external collaborators
//! (playlist retrieval, library scanning) and are only read here, except
//! for the per-file match cache.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;
use std::sync::{Arc, RwLock};

use crate::normalize::extension_of;

// ============================================================================
// Remote Tracks
// ============================================================================

/// Track from a remote playlist. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub track_id: String,
    pub title: String,
    /// Credited artists, primary first. May be empty.
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
}

impl RemoteTrack {
    pub fn new(track_id: &str, title: &str, artists: &[&str]) -> Self {
        Self {
            track_id: track_id.to_string(),
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: None,
        }
    }

    pub fn with_album(mut self, album: &str) -> Self {
        self.album = Some(album.to_string());
        self
    }

    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }

    /// Id plus every compared field, length-prefixed so no two distinct
    /// tracks share a key. Tracks reusing an id (or with empty ids) but
    /// carrying different metadata never collide.
    pub fn content_key(&self) -> String {
        fn push(key: &mut String, part: &str) {
            key.push_str(&part.len().to_string());
            key.push(':');
            key.push_str(part);
        }

        let mut key = String::new();
        push(&mut key, &self.track_id);
        push(&mut key, &self.title);
        push(&mut key, &self.artists.len().to_string());
        for artist in &self.artists {
            push(&mut key, artist);
        }
        match &self.album {
            Some(album) => push(&mut key, album),
            None => key.push('-'),
        }
        key
    }
}

// ============================================================================
// Local Files
// ============================================================================

/// Audio file from the local library.
///
/// `location` is the identity key. When tags are empty it also serves as a
/// naming source ("Artist - Title.ext").
#[derive(Debug, Serialize, Deserialize)]
pub struct LocalFile {
    pub location: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// Lower-case extension without the dot; derived from `location` when empty
    #[serde(default)]
    pub extension: String,
    #[serde(skip)]
    match_cache: MatchCache,
}

impl LocalFile {
    pub fn new(location: &str, title: &str, artists: &[&str]) -> Self {
        Self {
            location: location.to_string(),
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: None,
            extension: extension_of(location),
            match_cache: MatchCache::default(),
        }
    }

    pub fn with_album(mut self, album: &str) -> Self {
        self.album = Some(album.to_string());
        self
    }

    /// Extension used for scoring: the stored one, else derived from the location.
    pub fn extension(&self) -> String {
        if self.extension.is_empty() {
            extension_of(&self.location)
        } else {
            self.extension.trim_start_matches('.').to_lowercase()
        }
    }

    /// Cached score under `key` (see `MatchEngine::cache_key`).
    pub fn cached_score(&self, key: &str) -> Option<ScoredMatch> {
        self.match_cache.get(key)
    }

    /// Store a score under `key` unless one is already present.
    /// Returns the value that ends up in the cache.
    pub fn cache_score_if_absent(&self, key: &str, score: ScoredMatch) -> ScoredMatch {
        self.match_cache.insert_if_absent(key, score)
    }

    pub fn cached_track_count(&self) -> usize {
        self.match_cache.len()
    }
}

/// Per-file map from a scoring key (config and track content) to its score.
///
/// Entries are never overwritten. Two workers racing on the same pair
/// compute the same value, so whichever insert lands first is kept.
#[derive(Debug, Default)]
struct MatchCache {
    entries: RwLock<FxHashMap<String, ScoredMatch>>,
}

impl MatchCache {
    fn get(&self, key: &str) -> Option<ScoredMatch> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).copied()
    }

    fn insert_if_absent(&self, key: &str, score: ScoredMatch) -> ScoredMatch {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        *entries.entry(key.to_string()).or_insert(score)
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

// ============================================================================
// Scoring Models
// ============================================================================

/// Compared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    Title,
    Artist,
    Album,
    Filename,
}

/// Per-field similarity, each in [0.0, 1.0].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FieldScoreBreakdown {
    pub title: f64,
    pub artist: f64,
    pub album: f64,
    pub filename: f64,
}

impl Index<Field> for FieldScoreBreakdown {
    type Output = f64;

    fn index(&self, field: Field) -> &f64 {
        match field {
            Field::Title => &self.title,
            Field::Artist => &self.artist,
            Field::Album => &self.album,
            Field::Filename => &self.filename,
        }
    }
}

impl fmt::Display for FieldScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "title:{:.0}% artist:{:.0}% album:{:.0}% filename:{:.0}%",
            self.title * 100.0,
            self.artist * 100.0,
            self.album * 100.0,
            self.filename * 100.0
        )
    }
}

/// Which factors drove a match. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MatchType {
    /// Title and artist both above 0.95
    ExactMatch,
    /// Title above 0.90 and artist above 0.80
    HighConfidence,
    /// Album above 0.90
    AlbumConfirmed,
    /// Filename scored higher than the title tag
    FilenameMatch,
    FuzzyMatch,
}

impl MatchType {
    pub fn label(self) -> &'static str {
        match self {
            MatchType::ExactMatch => "Exact Match",
            MatchType::HighConfidence => "High Confidence",
            MatchType::AlbumConfirmed => "Album Confirmed",
            MatchType::FilenameMatch => "Filename Match",
            MatchType::FuzzyMatch => "Fuzzy Match",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Display bucket for a confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConfidenceTier {
    Perfect,
    VeryGood,
    Good,
    Weak,
    VeryWeak,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        match confidence {
            c if c >= 0.95 => ConfidenceTier::Perfect,
            c if c >= 0.85 => ConfidenceTier::VeryGood,
            c if c >= 0.75 => ConfidenceTier::Good,
            c if c >= 0.65 => ConfidenceTier::Weak,
            _ => ConfidenceTier::VeryWeak,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceTier::Perfect => "Perfect",
            ConfidenceTier::VeryGood => "Very Good",
            ConfidenceTier::Good => "Good",
            ConfidenceTier::Weak => "Weak",
            ConfidenceTier::VeryWeak => "Very Weak",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of scoring one (track, file) pair. Also the match cache value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredMatch {
    /// Clamped to [0.0, 1.0]
    pub confidence: f64,
    /// Weighted base plus adjustments, before clamping
    pub raw_score: f64,
    pub match_type: MatchType,
    pub breakdown: FieldScoreBreakdown,
}

/// Accepted candidate for a remote track.
/// Only built for pairs at or above the acceptance threshold.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub local_file: Arc<LocalFile>,
    pub confidence: f64,
    pub raw_score: f64,
    pub match_type: MatchType,
    pub breakdown: FieldScoreBreakdown,
}

impl MatchResult {
    pub fn new(local_file: Arc<LocalFile>, scored: ScoredMatch) -> Self {
        Self {
            local_file,
            confidence: scored.confidence,
            raw_score: scored.raw_score,
            match_type: scored.match_type,
            breakdown: scored.breakdown,
        }
    }

    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_confidence(self.confidence)
    }
}

// ============================================================================
// Result Slots
// ============================================================================

/// Why a track has no local file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum UnmatchedReason {
    /// No candidate reached the acceptance threshold
    NoCandidates,
    /// Scoring failed; the track was left unmatched
    ScoringFailed { message: String },
}

/// Caller-visible result for one remote track, updated by the reconciler.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrackSlot {
    pub is_local: bool,
    pub path: String,
    pub confidence: f64,
    pub match_type: Option<MatchType>,
    /// Generation of the batch that last wrote this slot (0 = never written)
    pub generation: u64,
    pub failure: Option<UnmatchedReason>,
}

impl TrackSlot {
    pub fn matched(result: &MatchResult, generation: u64) -> Self {
        Self {
            is_local: true,
            path: result.local_file.location.clone(),
            confidence: result.confidence,
            match_type: Some(result.match_type),
            generation,
            failure: None,
        }
    }

    pub fn unmatched(reason: UnmatchedReason, generation: u64) -> Self {
        Self {
            generation,
            failure: Some(reason),
            ..Self::default()
        }
    }

    /// Match type as display text, "" when unmatched.
    pub fn match_type_label(&self) -> &'static str {
        self.match_type.map(MatchType::label).unwrap_or("")
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-batch reconciliation statistics.
#[derive(Default, Debug, Clone, Serialize)]
pub struct ReconcileStats {
    pub generation: u64,
    pub total_tracks: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,

    // Match types
    pub exact_matches: usize,
    pub high_confidence_matches: usize,
    pub album_confirmed_matches: usize,
    pub filename_matches: usize,
    pub fuzzy_matches: usize,

    // Confidence tiers
    pub tier_perfect: usize,
    pub tier_very_good: usize,
    pub tier_good: usize,
    pub tier_weak: usize,
    pub tier_very_weak: usize,

    pub library_size: usize,
    pub elapsed_seconds: f64,
}

impl ReconcileStats {
    /// Tally a set of slots.
    pub fn from_slots<'a>(slots: impl IntoIterator<Item = &'a TrackSlot>) -> Self {
        let mut stats = ReconcileStats::default();
        for slot in slots {
            stats.record(slot);
        }
        stats
    }

    pub fn record(&mut self, slot: &TrackSlot) {
        self.total_tracks += 1;

        if !slot.is_local {
            if matches!(slot.failure, Some(UnmatchedReason::ScoringFailed { .. })) {
                self.failed += 1;
            } else {
                self.unmatched += 1;
            }
            return;
        }

        self.matched += 1;
        match slot.match_type {
            Some(MatchType::ExactMatch) => self.exact_matches += 1,
            Some(MatchType::HighConfidence) => self.high_confidence_matches += 1,
            Some(MatchType::AlbumConfirmed) => self.album_confirmed_matches += 1,
            Some(MatchType::FilenameMatch) => self.filename_matches += 1,
            Some(MatchType::FuzzyMatch) | None => self.fuzzy_matches += 1,
        }
        match ConfidenceTier::from_confidence(slot.confidence) {
            ConfidenceTier::Perfect => self.tier_perfect += 1,
            ConfidenceTier::VeryGood => self.tier_very_good += 1,
            ConfidenceTier::Good => self.tier_good += 1,
            ConfidenceTier::Weak => self.tier_weak += 1,
            ConfidenceTier::VeryWeak => self.tier_very_weak += 1,
        }
    }

    /// Calculate match rate as a percentage
    pub fn match_rate(&self) -> f64 {
        if self.total_tracks == 0 {
            0.0
        } else {
            100.0 * self.matched as f64 / self.total_tracks as f64
        }
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(confidence: f64) -> ScoredMatch {
        ScoredMatch {
            confidence,
            raw_score: confidence,
            match_type: MatchType::FuzzyMatch,
            breakdown: FieldScoreBreakdown::default(),
        }
    }

    #[test]
    fn test_match_cache_insert_if_absent() {
        let file = LocalFile::new("/music/a.mp3", "A", &["B"]);
        assert!(file.cached_score("t1").is_none());

        let first = file.cache_score_if_absent("t1", scored(0.7));
        assert_eq!(first.confidence, 0.7);

        // Second insert for the same track keeps the original value
        let second = file.cache_score_if_absent("t1", scored(0.9));
        assert_eq!(second.confidence, 0.7);
        assert_eq!(file.cached_score("t1").unwrap().confidence, 0.7);

        file.cache_score_if_absent("t2", scored(0.8));
        assert_eq!(file.cached_track_count(), 2);
    }

    #[test]
    fn test_match_cache_concurrent_inserts_converge() {
        let file = Arc::new(LocalFile::new("/music/a.mp3", "A", &["B"]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let file = Arc::clone(&file);
                std::thread::spawn(move || file.cache_score_if_absent("t1", scored(0.75)))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().confidence, 0.75);
        }
        assert_eq!(file.cached_track_count(), 1);
    }

    #[test]
    fn test_local_file_extension() {
        let file = LocalFile::new("/music/Song.FLAC", "Song", &[]);
        assert_eq!(file.extension(), "flac");

        let json = r#"{"location": "/music/Song.wav", "title": "Song"}"#;
        let file: LocalFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.extension, "");
        assert_eq!(file.extension(), "wav");

        let json = r#"{"location": "/music/Song", "extension": ".MP3"}"#;
        let file: LocalFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.extension(), "mp3");
    }

    #[test]
    fn test_content_key_distinguishes_metadata() {
        let yesterday = RemoteTrack::new("t1", "Yesterday", &["The Beatles"]);
        let reused_id = RemoteTrack::new("t1", "Something Else Entirely", &["Nobody"]);
        assert_ne!(yesterday.content_key(), reused_id.content_key());

        let a = RemoteTrack::new("", "Yesterday", &["The Beatles"]);
        let b = RemoteTrack::new("", "Bohemian Rhapsody", &["Queen"]);
        assert_ne!(a.content_key(), b.content_key());

        // Field boundaries cannot be shifted
        let split = RemoteTrack::new("", "a", &["b", "c"]);
        let joined = RemoteTrack::new("", "a", &["bc"]);
        assert_ne!(split.content_key(), joined.content_key());

        assert_ne!(
            yesterday.content_key(),
            yesterday.clone().with_album("Help!").content_key()
        );
        assert_eq!(yesterday.content_key(), yesterday.clone().content_key());
    }

    #[test]
    fn test_remote_track_from_json_defaults() {
        let track: RemoteTrack =
            serde_json::from_str(r#"{"track_id": "t1", "title": "Yesterday"}"#).unwrap();
        assert!(track.artists.is_empty());
        assert!(track.album.is_none());
        assert_eq!(track.primary_artist(), None);
    }

    #[test]
    fn test_breakdown_index() {
        let breakdown = FieldScoreBreakdown {
            title: 0.1,
            artist: 0.2,
            album: 0.5,
            filename: 0.4,
        };
        assert_eq!(breakdown[Field::Title], 0.1);
        assert_eq!(breakdown[Field::Artist], 0.2);
        assert_eq!(breakdown[Field::Album], 0.5);
        assert_eq!(breakdown[Field::Filename], 0.4);
    }

    #[test]
    fn test_confidence_tier() {
        assert_eq!(ConfidenceTier::from_confidence(1.0), ConfidenceTier::Perfect);
        assert_eq!(ConfidenceTier::from_confidence(0.9), ConfidenceTier::VeryGood);
        assert_eq!(ConfidenceTier::from_confidence(0.8), ConfidenceTier::Good);
        assert_eq!(ConfidenceTier::from_confidence(0.65), ConfidenceTier::Weak);
        assert_eq!(ConfidenceTier::from_confidence(0.6), ConfidenceTier::VeryWeak);
        assert_eq!(ConfidenceTier::VeryGood.to_string(), "Very Good");
    }

    #[test]
    fn test_match_result_tier() {
        let file = Arc::new(LocalFile::new("/music/a.mp3", "A", &["B"]));
        assert_eq!(MatchResult::new(Arc::clone(&file), scored(0.97)).tier(), ConfidenceTier::Perfect);
        assert_eq!(MatchResult::new(file, scored(0.70)).tier(), ConfidenceTier::Weak);
    }

    #[test]
    fn test_match_type_labels() {
        assert_eq!(MatchType::ExactMatch.to_string(), "Exact Match");
        assert_eq!(MatchType::FilenameMatch.to_string(), "Filename Match");
        assert_eq!(TrackSlot::default().match_type_label(), "");
    }

    #[test]
    fn test_stats_from_slots() {
        let file = Arc::new(LocalFile::new("/music/a.mp3", "A", &["B"]));
        let exact = MatchResult::new(
            Arc::clone(&file),
            ScoredMatch {
                match_type: MatchType::ExactMatch,
                ..scored(1.0)
            },
        );
        let slots = vec![
            TrackSlot::matched(&exact, 1),
            TrackSlot::unmatched(UnmatchedReason::NoCandidates, 1),
            TrackSlot::unmatched(
                UnmatchedReason::ScoringFailed {
                    message: "boom".to_string(),
                },
                1,
            ),
        ];

        let stats = ReconcileStats::from_slots(&slots);
        assert_eq!(stats.total_tracks, 3);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.exact_matches, 1);
        assert_eq!(stats.tier_perfect, 1);
        assert!((stats.match_rate() - 100.0 / 3.0).abs() < 1e-9);
    }
}
