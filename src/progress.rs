//! Terminal progress for reconciliation batches.
//!
//! Batches run on the reconciler's own pool, so progress is observed by
//! polling a `BatchHandle`. In log-only mode bars are hidden and periodic
//! `[phase] n/total (pct%)` lines go to stderr instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::reconciler::BatchHandle;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Create a progress bar with consistent styling.
/// In log-only mode, the progress bar is hidden.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb
}

/// Create a spinner for indeterminate progress (file loading).
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::default_spinner()
            .template("{msg} {spinner} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(POLL_INTERVAL);
    }
    pb.set_message(msg.to_string());
    pb
}

/// Whether a log line is due at `current`. Always true for the last item.
pub fn should_log(current: u64, total: u64, interval: u64) -> bool {
    current == total || (interval > 0 && current % interval == 0)
}

/// Log progress periodically for tail-friendly output.
/// Only logs when in log-only mode and at specified intervals.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if is_log_only() && total > 0 && should_log(current, total, interval) {
        let pct = 100.0 * current as f64 / total as f64;
        eprintln!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
    }
}

/// Block until the batch completes, reflecting its progress on a bar (or in
/// log lines). Returns the batch's elapsed time.
pub fn follow_batch(batch: &BatchHandle, phase: &str) -> Duration {
    let total = batch.total() as u64;
    let pb = create_progress_bar(total, phase);
    let interval = (total / 10).max(1);
    let mut last_bucket = None;
    let mut last_logged = None;

    loop {
        let finished = batch.wait_timeout(POLL_INTERVAL);
        let completed = batch.completed() as u64;
        pb.set_position(completed);

        // One line per interval crossed, plus the final count
        let bucket = completed / interval;
        if last_bucket != Some(bucket) || (finished && last_logged != Some(completed)) {
            log_progress(phase, completed, total, 1);
            last_bucket = Some(bucket);
            last_logged = Some(completed);
        }

        if finished {
            break;
        }
    }

    pb.finish_and_clear();
    batch.elapsed()
}
