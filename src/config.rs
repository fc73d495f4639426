//! Tunable parameters for scoring and reconciliation.
//!
//! Defaults reproduce the observed matcher behavior. Every field can be
//! overridden from a JSON file (missing keys keep their default) and the
//! CLI layers its flags on top.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MatchError, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Minimum confidence for a result to be reported at all
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.60;

pub const DEFAULT_TITLE_WEIGHT: f64 = 0.40;
pub const DEFAULT_ARTIST_WEIGHT: f64 = 0.35;
pub const DEFAULT_ALBUM_WEIGHT: f64 = 0.15;
pub const DEFAULT_FILENAME_WEIGHT: f64 = 0.10;

/// Score returned by a comparator when one side has no data
pub const NEUTRAL_SCORE: f64 = 0.5;

// ============================================================================
// Match Config
// ============================================================================

/// Per-factor weights of the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub title: f64,
    pub artist: f64,
    pub album: f64,
    pub filename: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_WEIGHT,
            artist: DEFAULT_ARTIST_WEIGHT,
            album: DEFAULT_ALBUM_WEIGHT,
            filename: DEFAULT_FILENAME_WEIGHT,
        }
    }
}

/// Scoring parameters shared by the scorer and the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub weights: ScoreWeights,
    pub min_confidence: f64,
    /// Added when title and artist both exceed 0.95
    pub exact_bonus: f64,
    /// Added when album exceeds 0.90
    pub album_bonus: f64,
    /// Subtracted when the remote track credits more than two artists
    pub collaboration_penalty: f64,
    /// Added for flac/wav files
    pub lossless_bonus: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            exact_bonus: 0.10,
            album_bonus: 0.05,
            collaboration_penalty: 0.02,
            lossless_bonus: 0.01,
        }
    }
}

impl MatchConfig {
    /// Load from a JSON file. Keys absent from the file keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MatchError::Config(format!("{}: {}", path.display(), e)))?;
        let config: MatchConfig = serde_json::from_str(&text)
            .map_err(|e| MatchError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [
            ("weights.title", w.title),
            ("weights.artist", w.artist),
            ("weights.album", w.album),
            ("weights.filename", w.filename),
            ("exact_bonus", self.exact_bonus),
            ("album_bonus", self.album_bonus),
            ("collaboration_penalty", self.collaboration_penalty),
            ("lossless_bonus", self.lossless_bonus),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MatchError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(MatchError::Config(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Reconciler Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Worker threads; 0 uses the number of available processing units
    pub workers: usize,
}

impl ReconcilerConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
