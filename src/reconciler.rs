//! Concurrent reconciliation of a playlist against the shared library.
//!
//! Each batch (full or incremental) gets a generation number. One unit of
//! work scans one track against one library snapshot on the rayon pool.
//!
//! Ordering rules:
//! - a unit whose batch was superseded before it started does not score
//! - a track is never scored by two workers at once (per-track lock)
//! - a slot only accepts writes from a generation at least as new as the
//!   one that last wrote it, so the newest batch wins regardless of finish order
//!
//! While a library watcher is active, a library revision newer than the one
//! the latest batch started from counts as a pending rematch: `is_running()`
//! reports it and `wait_idle_timeout()` waits for the batch it will start.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::ReconcilerConfig;
use crate::engine::MatchEngine;
use crate::error::Result;
use crate::library::{LibraryCollection, LibraryEvent};
use crate::models::{
    LocalFile, MatchResult, ReconcileStats, RemoteTrack, TrackSlot, UnmatchedReason,
};

// ============================================================================
// Matcher Seam
// ============================================================================

/// Finds the best local file for a remote track within one snapshot.
pub trait TrackMatcher: Send + Sync {
    fn best_match(
        &self,
        track: &RemoteTrack,
        files: &[Arc<LocalFile>],
    ) -> Result<Option<MatchResult>>;
}

impl TrackMatcher for MatchEngine {
    fn best_match(
        &self,
        track: &RemoteTrack,
        files: &[Arc<LocalFile>],
    ) -> Result<Option<MatchResult>> {
        self.find_best_match(track, files)
    }
}

// ============================================================================
// Track Entries
// ============================================================================

struct TrackEntry {
    track: RemoteTrack,
    slot: Mutex<TrackSlot>,
    scoring: Mutex<()>,
}

impl TrackEntry {
    fn new(track: RemoteTrack) -> Self {
        Self {
            track,
            slot: Mutex::new(TrackSlot::default()),
            scoring: Mutex::new(()),
        }
    }

    fn read(&self) -> TrackSlot {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Write unless a newer generation already wrote. Returns whether it was stored.
    fn store(&self, next: TrackSlot) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if next.generation < slot.generation {
            return false;
        }
        *slot = next;
        true
    }
}

type TrackSet = Arc<Vec<Arc<TrackEntry>>>;

// ============================================================================
// Batch Handle
// ============================================================================

struct BatchProgress {
    remaining: usize,
    finished: Option<Duration>,
}

struct BatchInner {
    generation: u64,
    total: usize,
    started: Instant,
    latest_generation: Arc<AtomicU64>,
    progress: Mutex<BatchProgress>,
    done: Condvar,
}

/// Completion tracking for one reconciliation batch.
///
/// Completes once every submitted unit has finished, whether it scored,
/// failed or was skipped as superseded.
#[derive(Clone)]
pub struct BatchHandle {
    inner: Arc<BatchInner>,
}

impl BatchHandle {
    fn new(generation: u64, total: usize, latest_generation: Arc<AtomicU64>) -> Self {
        let started = Instant::now();
        Self {
            inner: Arc::new(BatchInner {
                generation,
                total,
                started,
                latest_generation,
                progress: Mutex::new(BatchProgress {
                    remaining: total,
                    finished: (total == 0).then(Duration::default),
                }),
                done: Condvar::new(),
            }),
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn total(&self) -> usize {
        self.inner.total
    }

    pub fn completed(&self) -> usize {
        self.inner.total - self.lock_progress().remaining
    }

    pub fn is_running(&self) -> bool {
        self.lock_progress().remaining > 0
    }

    /// A newer batch has been started.
    pub fn is_superseded(&self) -> bool {
        self.inner.latest_generation.load(Ordering::SeqCst) > self.inner.generation
    }

    /// Wall time from submission to completion, or so far while running.
    pub fn elapsed(&self) -> Duration {
        self.lock_progress()
            .finished
            .unwrap_or_else(|| self.inner.started.elapsed())
    }

    /// Block until every unit of the batch has finished.
    pub fn wait(&self) {
        let mut progress = self.lock_progress();
        while progress.remaining > 0 {
            progress = self
                .inner
                .done
                .wait(progress)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Returns true if the batch completed within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.lock_progress();
        while progress.remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            progress = self
                .inner
                .done
                .wait_timeout(progress, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }

    fn lock_progress(&self) -> std::sync::MutexGuard<'_, BatchProgress> {
        self.inner.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish_unit(&self) {
        let mut progress = self.lock_progress();
        progress.remaining = progress.remaining.saturating_sub(1);
        if progress.remaining == 0 {
            let elapsed = self.inner.started.elapsed();
            progress.finished = Some(elapsed);
            info!(
                "Batch {} complete: {} tracks in {:.2}s{}",
                self.inner.generation,
                self.inner.total,
                elapsed.as_secs_f64(),
                if self.is_superseded() { " (superseded)" } else { "" }
            );
            self.inner.done.notify_all();
        }
    }
}

/// Counts a unit as finished when dropped, including on unwind.
struct UnitGuard(BatchHandle);

impl Drop for UnitGuard {
    fn drop(&mut self) {
        self.0.finish_unit();
    }
}

// ============================================================================
// Reconciler
// ============================================================================

struct ReconcilerInner {
    library: Arc<LibraryCollection>,
    matcher: Arc<dyn TrackMatcher>,
    pool: ThreadPool,
    tracks: RwLock<TrackSet>,
    generation: Arc<AtomicU64>,
    latest_batch: Mutex<Option<BatchHandle>>,
    /// Signalled when a batch is published or a watcher stops
    batch_published: Condvar,
    /// Library revision already covered by a submitted batch (or predating
    /// the watchers)
    covered_revision: AtomicU64,
    watchers: AtomicUsize,
}

/// Matches a playlist against the library on a bounded worker pool and
/// keeps the results current as the library grows.
pub struct ConcurrentReconciler {
    inner: Arc<ReconcilerInner>,
}

impl ConcurrentReconciler {
    pub fn new(
        library: Arc<LibraryCollection>,
        engine: MatchEngine,
        config: ReconcilerConfig,
    ) -> Result<Self> {
        Self::with_matcher(library, Arc::new(engine), config)
    }

    pub fn with_matcher(
        library: Arc<LibraryCollection>,
        matcher: Arc<dyn TrackMatcher>,
        config: ReconcilerConfig,
    ) -> Result<Self> {
        let workers = config.effective_workers();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("reconcile-{i}"))
            .build()?;
        info!("Reconciler: {} workers", workers);

        Ok(Self {
            inner: Arc::new(ReconcilerInner {
                library,
                matcher,
                pool,
                tracks: RwLock::new(Arc::new(Vec::new())),
                generation: Arc::new(AtomicU64::new(0)),
                latest_batch: Mutex::new(None),
                batch_published: Condvar::new(),
                covered_revision: AtomicU64::new(0),
                watchers: AtomicUsize::new(0),
            }),
        })
    }

    pub fn library(&self) -> &Arc<LibraryCollection> {
        &self.inner.library
    }

    /// Replace the track set and score every track. Prior results are discarded.
    pub fn reconcile_playlist(&self, tracks: Vec<RemoteTrack>) -> BatchHandle {
        self.inner.reconcile_playlist(tracks)
    }

    /// Re-score the current track set against the current library.
    pub fn reconcile_incremental(&self) -> BatchHandle {
        self.inner.reconcile_incremental()
    }

    /// Start a background thread that runs an incremental batch after every
    /// library change event not already covered by a newer batch.
    pub fn watch_library(&self) -> LibraryWatcher {
        let events = self.inner.library.subscribe();
        // Changes made before subscribing never produce an event
        self.inner
            .covered_revision
            .fetch_max(self.inner.library.revision(), Ordering::SeqCst);
        self.inner.watchers.fetch_add(1, Ordering::SeqCst);
        LibraryWatcher::spawn(Arc::downgrade(&self.inner), events)
    }

    /// Handle of the most recently started batch, including batches started
    /// by a library watcher.
    pub fn latest_batch(&self) -> Option<BatchHandle> {
        self.inner.lock_latest().clone()
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.inner
            .current_tracks()
            .iter()
            .map(|entry| entry.track.clone())
            .collect()
    }

    /// Current slots, in track order.
    pub fn slots(&self) -> Vec<TrackSlot> {
        self.inner
            .current_tracks()
            .iter()
            .map(|entry| entry.read())
            .collect()
    }

    pub fn slot(&self, track_id: &str) -> Option<TrackSlot> {
        self.inner
            .current_tracks()
            .iter()
            .find(|entry| entry.track.track_id == track_id)
            .map(|entry| entry.read())
    }

    /// Whether the most recently started batch is still in flight, or a
    /// library change is waiting for the watcher to start one.
    pub fn is_running(&self) -> bool {
        let latest = self.inner.lock_latest();
        latest.as_ref().is_some_and(BatchHandle::is_running) || self.inner.rematch_pending()
    }

    /// Block until `is_running()` would return false. Returns false on timeout.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let batch = {
                let mut latest = self.inner.lock_latest();
                while self.inner.rematch_pending() {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    latest = self
                        .inner
                        .batch_published
                        .wait_timeout(latest, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                }
                latest.clone()
            };

            let Some(batch) = batch else {
                return true;
            };
            if !batch.wait_timeout(deadline.saturating_duration_since(Instant::now())) {
                return false;
            }

            // Settled unless another batch or change arrived meanwhile
            let latest = self.inner.lock_latest();
            let still_latest = latest
                .as_ref()
                .is_some_and(|b| b.generation() == batch.generation());
            if still_latest && !self.inner.rematch_pending() {
                return true;
            }
        }
    }

    /// Tally the current slots, stamped with the batch's generation and timing.
    pub fn stats(&self, handle: &BatchHandle) -> ReconcileStats {
        let slots = self.slots();
        let mut stats = ReconcileStats::from_slots(&slots);
        stats.generation = handle.generation();
        stats.library_size = self.inner.library.len();
        stats.elapsed_seconds = handle.elapsed().as_secs_f64();
        stats
    }
}

impl ReconcilerInner {
    fn current_tracks(&self) -> TrackSet {
        Arc::clone(&self.tracks.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn lock_latest(&self) -> std::sync::MutexGuard<'_, Option<BatchHandle>> {
        self.latest_batch.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A watcher will start a batch for a library change no batch covers yet.
    fn rematch_pending(&self) -> bool {
        self.watchers.load(Ordering::SeqCst) > 0
            && self.library.revision() > self.covered_revision.load(Ordering::SeqCst)
    }

    fn watcher_stopped(&self) {
        self.watchers.fetch_sub(1, Ordering::SeqCst);
        let _latest = self.lock_latest();
        self.batch_published.notify_all();
    }

    fn reconcile_playlist(&self, tracks: Vec<RemoteTrack>) -> BatchHandle {
        let entries: TrackSet = Arc::new(
            tracks
                .into_iter()
                .map(|track| Arc::new(TrackEntry::new(track)))
                .collect(),
        );

        // Generation is taken under the write lock so it orders with the track set
        let (generation, entries) = {
            let mut current = self.tracks.write().unwrap_or_else(|e| e.into_inner());
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = Arc::clone(&entries);
            (generation, entries)
        };

        info!(
            "Batch {}: full reconciliation of {} tracks against {} files",
            generation,
            entries.len(),
            self.library.len()
        );
        self.submit(generation, entries)
    }

    fn reconcile_incremental(&self) -> BatchHandle {
        let (generation, entries) = {
            let current = self.tracks.read().unwrap_or_else(|e| e.into_inner());
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, Arc::clone(&current))
        };

        info!(
            "Batch {}: incremental rematch of {} tracks against {} files",
            generation,
            entries.len(),
            self.library.len()
        );
        self.submit(generation, entries)
    }

    fn submit(&self, generation: u64, entries: TrackSet) -> BatchHandle {
        let handle = BatchHandle::new(generation, entries.len(), Arc::clone(&self.generation));
        // Units snapshot the library when they start, so they see at least this
        let revision = self.library.revision();
        {
            let mut latest = self.lock_latest();
            if latest.as_ref().map_or(true, |b| b.generation() < generation) {
                *latest = Some(handle.clone());
            }
            self.covered_revision.fetch_max(revision, Ordering::SeqCst);
            self.batch_published.notify_all();
        }

        for entry in entries.iter() {
            let entry = Arc::clone(entry);
            let library = Arc::clone(&self.library);
            let matcher = Arc::clone(&self.matcher);
            let batch = handle.clone();
            let guard = UnitGuard(handle.clone());
            self.pool.spawn(move || {
                let _guard = guard;
                run_unit(&entry, &library, matcher.as_ref(), &batch);
            });
        }

        handle
    }
}

/// Score one track against a fresh snapshot and publish the outcome.
fn run_unit(
    entry: &TrackEntry,
    library: &LibraryCollection,
    matcher: &dyn TrackMatcher,
    batch: &BatchHandle,
) {
    let generation = batch.generation();
    let track_id = &entry.track.track_id;

    if batch.is_superseded() {
        debug!("Skipping '{}' (batch {} superseded)", track_id, generation);
        return;
    }

    let _scoring = entry.scoring.lock().unwrap_or_else(|e| e.into_inner());
    if batch.is_superseded() {
        debug!("Skipping '{}' (batch {} superseded)", track_id, generation);
        return;
    }

    let snapshot = library.snapshot();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        matcher.best_match(&entry.track, &snapshot)
    }));

    let slot = match outcome {
        Ok(Ok(Some(result))) => {
            debug!(
                "'{}' -> {} ({:.0}%, {})",
                track_id,
                result.local_file.location,
                result.confidence * 100.0,
                result.match_type
            );
            TrackSlot::matched(&result, generation)
        }
        Ok(Ok(None)) => {
            debug!("'{}' -> no candidate among {} files", track_id, snapshot.len());
            TrackSlot::unmatched(UnmatchedReason::NoCandidates, generation)
        }
        Ok(Err(err)) => {
            warn!("Scoring '{}' failed: {}", track_id, err);
            TrackSlot::unmatched(
                UnmatchedReason::ScoringFailed {
                    message: err.to_string(),
                },
                generation,
            )
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Scoring '{}' panicked: {}", track_id, message);
            TrackSlot::unmatched(UnmatchedReason::ScoringFailed { message }, generation)
        }
    };

    if !entry.store(slot) {
        debug!("'{}': newer result already stored, dropping batch {} result", track_id, generation);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Library Watcher
// ============================================================================

/// Background subscription that triggers incremental rematches.
///
/// Stops on `stop()`, on drop, when the reconciler is dropped, or when the
/// library's event channel disconnects.
pub struct LibraryWatcher {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl LibraryWatcher {
    fn spawn(reconciler: Weak<ReconcilerInner>, events: Receiver<LibraryEvent>) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let weak = Weak::clone(&reconciler);
        let thread = std::thread::Builder::new()
            .name("library-watcher".to_string())
            .spawn(move || {
                watch_loop(&reconciler, events, shutdown_rx);
                if let Some(inner) = reconciler.upgrade() {
                    inner.watcher_stopped();
                }
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to start library watcher: {}", e);
                if let Some(inner) = weak.upgrade() {
                    inner.watcher_stopped();
                }
                None
            }
        };

        Self {
            shutdown: Some(shutdown_tx),
            thread,
        }
    }

    pub fn is_active(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        // Disconnecting the channel wakes the select
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn watch_loop(
    reconciler: &Weak<ReconcilerInner>,
    events: Receiver<LibraryEvent>,
    shutdown: Receiver<()>,
) {
    loop {
        select! {
            recv(events) -> event => {
                let Ok(event) = event else {
                    debug!("Library watcher: library dropped");
                    break;
                };
                let Some(inner) = reconciler.upgrade() else {
                    debug!("Library watcher: reconciler dropped");
                    break;
                };
                let revision = inner.library.revision();
                if revision <= inner.covered_revision.load(Ordering::SeqCst) {
                    debug!("Library changed ({:?}), revision {} already covered", event, revision);
                    continue;
                }
                let batch = inner.reconcile_incremental();
                info!(
                    "Library changed ({:?}), started incremental rematch as batch {}",
                    event,
                    batch.generation()
                );
            }
            recv(shutdown) -> _ => break,
        }
    }
}
