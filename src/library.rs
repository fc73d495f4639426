//! Shared local-file collection with snapshot reads and batch-level change events.
//!
//! Readers take a snapshot (a cloned `Arc` of the current file list) and
//! keep it for the lifetime of their unit of work. Writers build a new list
//! and swap it in, so scans never block on a library scan in progress and
//! always see either the old or the new collection.
//!
//! Change events fire once per `add_files`/`remove_file` call, never per
//! file, and carry no delta: subscribers re-derive from `snapshot()`.
//! Every mutating call also bumps `revision()` before it returns, so a
//! subscriber can tell synchronously that an event is on its way.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex, RwLock};

use crate::models::LocalFile;
use crate::normalize::file_stem;

/// Immutable view of the collection at one point in time
pub type LibrarySnapshot = Arc<Vec<Arc<LocalFile>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryEvent {
    FilesAdded { count: usize },
    FilesRemoved { count: usize },
}

#[derive(Default)]
struct LibraryState {
    files: LibrarySnapshot,
    locations: FxHashSet<String>,
    revision: u64,
}

#[derive(Default)]
pub struct LibraryCollection {
    state: RwLock<LibraryState>,
    subscribers: Mutex<Vec<Sender<LibraryEvent>>>,
}

impl LibraryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from an initial set of files without emitting events.
    pub fn from_files(files: impl IntoIterator<Item = LocalFile>) -> Self {
        let library = Self::new();
        library.insert_batch(files);
        library
    }

    /// Current files. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> LibrarySnapshot {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&state.files)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mutating batches applied so far.
    pub fn revision(&self) -> u64 {
        self.state.read().unwrap_or_else(|e| e.into_inner()).revision
    }

    pub fn contains(&self, location: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.locations.contains(location)
    }

    /// Append a batch of files, skipping duplicate locations and locations
    /// with no file name. Notifies subscribers once if anything was added.
    /// Returns the number of files added.
    pub fn add_files(&self, files: impl IntoIterator<Item = LocalFile>) -> usize {
        let added = self.insert_batch(files);
        if added > 0 {
            info!("Library: added {} files ({} total)", added, self.len());
            self.notify(LibraryEvent::FilesAdded { count: added });
        }
        added
    }

    fn insert_batch(&self, files: impl IntoIterator<Item = LocalFile>) -> usize {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut next: Vec<Arc<LocalFile>> = state.files.as_ref().clone();
        let before = next.len();

        for file in files {
            if file_stem(&file.location).is_none() {
                warn!("Library: skipping file with invalid location '{}'", file.location);
                continue;
            }
            if !state.locations.insert(file.location.clone()) {
                debug!("Library: already contains '{}'", file.location);
                continue;
            }
            next.push(Arc::new(file));
        }

        let added = next.len() - before;
        if added > 0 {
            state.files = Arc::new(next);
            state.revision += 1;
        }
        added
    }

    /// Remove a file by location. Its match cache goes with it once no
    /// snapshot still holds the file.
    pub fn remove_file(&self, location: &str) -> bool {
        let removed = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if state.locations.remove(location) {
                let next: Vec<Arc<LocalFile>> = state
                    .files
                    .iter()
                    .filter(|f| f.location != location)
                    .cloned()
                    .collect();
                state.files = Arc::new(next);
                state.revision += 1;
                true
            } else {
                false
            }
        };

        if removed {
            info!("Library: removed '{}'", location);
            self.notify(LibraryEvent::FilesRemoved { count: 1 });
        }
        removed
    }

    /// Receive a `LibraryEvent` after every mutating batch.
    /// The channel disconnects when the collection is dropped.
    pub fn subscribe(&self) -> Receiver<LibraryEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    fn notify(&self, event: LibraryEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        // Drop subscribers whose receiver is gone
        subscribers.retain(|tx| tx.send(event).is_ok());
    }
}
