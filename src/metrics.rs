// Performance metrics module
//
// Lightweight counters for scans, moves and watcher activity

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Engine activity metrics
///
/// Uses atomic operations so the scan worker, the watcher thread and
/// callers of the engine can all record without locking.
#[derive(Debug)]
pub struct Metrics {
    /// Scans that listed the watched folder successfully
    pub scans_completed: AtomicU64,

    /// Scans that could not list the watched folder
    pub scans_failed: AtomicU64,

    /// Files moved into a rule folder
    pub files_moved: AtomicU64,

    /// Files left in place because no rule matched
    pub files_unmatched: AtomicU64,

    /// Matched files whose move failed
    pub move_failures: AtomicU64,

    /// Raw filesystem notifications received
    pub watch_events: AtomicU64,

    /// Number of state updates performed
    pub state_updates: AtomicU64,

    /// Status messages published
    pub status_messages: AtomicU64,

    /// Total time spent scanning in milliseconds
    pub total_scan_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_completed: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
            files_moved: AtomicU64::new(0),
            files_unmatched: AtomicU64::new(0),
            move_failures: AtomicU64::new(0),
            watch_events: AtomicU64::new(0),
            state_updates: AtomicU64::new(0),
            status_messages: AtomicU64::new(0),
            total_scan_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome of one completed scan
    pub fn record_scan(&self, moved: usize, unmatched: usize, failed: usize, duration: Duration) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        self.files_moved.fetch_add(moved as u64, Ordering::Relaxed);
        self.files_unmatched
            .fetch_add(unmatched as u64, Ordering::Relaxed);
        self.move_failures.fetch_add(failed as u64, Ordering::Relaxed);
        self.total_scan_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_scan_failed(&self) {
        self.scans_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watch_event(&self) {
        self.watch_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_update(&self) {
        self.state_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_message(&self) {
        self.status_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average scan duration in milliseconds
    pub fn avg_scan_time_ms(&self) -> f64 {
        let total = self.total_scan_time_ms.load(Ordering::Relaxed);
        let count = self.scans_completed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Organizer Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Scans: {} completed, {} failed (avg: {:.2}ms)",
            self.scans_completed.load(Ordering::Relaxed),
            self.scans_failed.load(Ordering::Relaxed),
            self.avg_scan_time_ms()
        );
        tracing::info!(
            "Files: {} moved, {} unmatched, {} failed",
            self.files_moved.load(Ordering::Relaxed),
            self.files_unmatched.load(Ordering::Relaxed),
            self.move_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Watch events: {}, state updates: {}, status messages: {}",
            self.watch_events.load(Ordering::Relaxed),
            self.state_updates.load(Ordering::Relaxed),
            self.status_messages.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
