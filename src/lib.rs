//! Playlist reconciliation library: fuzzy matching of remote playlist
//! tracks against a local music library, with concurrent incremental
//! rematching as the library grows.

pub mod comparators;
pub mod config;
pub mod engine;
pub mod error;
pub mod library;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod reconciler;
pub mod safety;
pub mod scoring;
pub mod similarity;

pub use config::{MatchConfig, ReconcilerConfig};
pub use engine::MatchEngine;
pub use error::{MatchError, Result};
pub use library::{LibraryCollection, LibraryEvent};
pub use models::{LocalFile, MatchResult, MatchType, RemoteTrack, TrackSlot};
pub use reconciler::{BatchHandle, ConcurrentReconciler, LibraryWatcher};
pub use scoring::MatchScorer;
