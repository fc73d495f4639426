//! Ranking a remote track against a snapshot of the local library.

use rustc_hash::FxHasher;
use std::cmp::Ordering;
use std::hash::Hasher;
use std::sync::Arc;

use crate::config::MatchConfig;
use crate::error::Result;
use crate::models::{LocalFile, MatchResult, RemoteTrack, ScoredMatch};
use crate::scoring::MatchScorer;

/// Full scan of a file snapshot for one track.
///
/// Scores are read from each file's match cache when present and inserted
/// (if absent) otherwise, so repeated passes over a growing library only
/// score the new files. Cache keys combine the scoring config with the
/// track's full content, so engines with different configs and tracks that
/// reuse an id never see each other's scores.
#[derive(Debug, Clone)]
pub struct MatchEngine {
    scorer: MatchScorer,
    fingerprint: u64,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(MatchScorer::default())
    }
}

impl MatchEngine {
    pub fn new(scorer: MatchScorer) -> Self {
        let fingerprint = config_fingerprint(scorer.config());
        Self { scorer, fingerprint }
    }

    pub fn scorer(&self) -> &MatchScorer {
        &self.scorer
    }

    pub fn min_confidence(&self) -> f64 {
        self.scorer.config().min_confidence
    }

    /// Key under which this engine caches scores for `track`.
    pub fn cache_key(&self, track: &RemoteTrack) -> String {
        format!("{:016x}/{}", self.fingerprint, track.content_key())
    }

    /// Score via the file's cache.
    pub fn score_cached(&self, track: &RemoteTrack, file: &LocalFile) -> Result<ScoredMatch> {
        self.score_with_key(&self.cache_key(track), track, file)
    }

    fn score_with_key(&self, key: &str, track: &RemoteTrack, file: &LocalFile) -> Result<ScoredMatch> {
        if let Some(cached) = file.cached_score(key) {
            return Ok(cached);
        }
        let scored = self.scorer.score(track, file)?;
        Ok(file.cache_score_if_absent(key, scored))
    }

    /// All candidates at or above the acceptance threshold, best first.
    /// Equal confidences keep input order.
    pub fn find_all_matches(
        &self,
        track: &RemoteTrack,
        files: &[Arc<LocalFile>],
    ) -> Result<Vec<MatchResult>> {
        let min_confidence = self.min_confidence();
        let key = self.cache_key(track);
        let mut matches = Vec::new();

        for file in files {
            let scored = self.score_with_key(&key, track, file)?;
            if scored.confidence >= min_confidence {
                matches.push(MatchResult::new(Arc::clone(file), scored));
            }
        }

        // sort_by is stable
        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        Ok(matches)
    }

    pub fn find_best_match(
        &self,
        track: &RemoteTrack,
        files: &[Arc<LocalFile>],
    ) -> Result<Option<MatchResult>> {
        Ok(self.find_all_matches(track, files)?.into_iter().next())
    }
}

/// Hash of every scoring parameter.
fn config_fingerprint(config: &MatchConfig) -> u64 {
    let w = &config.weights;
    let mut hasher = FxHasher::default();
    for value in [
        w.title,
        w.artist,
        w.album,
        w.filename,
        config.min_confidence,
        config.exact_bonus,
        config.album_bonus,
        config.collaboration_penalty,
        config.lossless_bonus,
    ] {
        hasher.write_u64(value.to_bits());
    }
    hasher.finish()
}
