use crate::metrics::Metrics;
use camino::{Utf8Path, Utf8PathBuf};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// Errors from opening a watch subscription
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("{0} is not a directory")]
    NotADirectory(Utf8PathBuf),

    #[error("Failed to open {path} for monitoring: {source}")]
    Open {
        path: Utf8PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Result of [`FolderWatcher::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStart {
    Started,
    AlreadyActive,
}

struct ActiveWatch {
    path: Utf8PathBuf,
    // Dropping the watcher releases the OS handle and closes the tick channel
    _watcher: RecommendedWatcher,
    coordinator: JoinHandle<()>,
}

/// Watches one directory (non-recursively) and calls back after bursts settle.
///
/// State machine: Idle → Active → Idle. Every raw notification sends a tick
/// to a single coordinator task which holds the debounce deadline, so at most
/// one delayed callback is ever pending.
pub struct FolderWatcher {
    debounce: Duration,
    runtime: tokio::runtime::Handle,
    metrics: Option<Arc<Metrics>>,
    active: Option<ActiveWatch>,
}

impl FolderWatcher {
    pub fn new(debounce: Duration, runtime: tokio::runtime::Handle) -> Self {
        Self {
            debounce,
            runtime,
            metrics: None,
            active: None,
        }
    }

    /// Count raw notifications in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe to changes in `path`.
    ///
    /// `on_quiet` runs on the runtime once no event has arrived for the
    /// debounce interval. Calling this while already active is a no-op.
    pub fn start<F>(&mut self, path: &Utf8Path, on_quiet: F) -> Result<WatchStart, WatchError>
    where
        F: Fn() + Send + 'static,
    {
        if let Some(active) = &self.active {
            tracing::debug!("Watcher already active on {}", active.path);
            return Ok(WatchStart::AlreadyActive);
        }

        if !path.is_dir() {
            return Err(WatchError::NotADirectory(path.to_path_buf()));
        }

        let (tick_tx, tick_rx) = mpsc::unbounded_channel::<()>();
        let metrics = self.metrics.clone();

        let open_err = |source: notify::Error| WatchError::Open {
            path: path.to_path_buf(),
            source,
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if event.kind.is_access() => {}
            Ok(event) => {
                tracing::trace!(kind = ?event.kind, paths = ?event.paths, "Filesystem event");
                if let Some(metrics) = &metrics {
                    metrics.record_watch_event();
                }
                let _ = tick_tx.send(());
            }
            Err(e) => tracing::warn!("Watch error: {}", e),
        })
        .map_err(open_err)?;

        watcher
            .watch(path.as_std_path(), RecursiveMode::NonRecursive)
            .map_err(open_err)?;

        let coordinator = self
            .runtime
            .spawn(debounce_ticks(tick_rx, self.debounce, on_quiet));

        tracing::info!("Watching {} (debounce {:?})", path, self.debounce);
        self.active = Some(ActiveWatch {
            path: path.to_path_buf(),
            _watcher: watcher,
            coordinator,
        });

        Ok(WatchStart::Started)
    }

    /// Cancel the subscription and release its handle. Safe to call when idle.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.coordinator.abort();
            tracing::info!("Stopped watching {}", active.path);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn watched_path(&self) -> Option<&Utf8Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Coalesce ticks: fire `on_quiet` once per burst, after `debounce` of silence.
///
/// Returns when the sending side is dropped.
pub async fn debounce_ticks<F>(mut ticks: mpsc::UnboundedReceiver<()>, debounce: Duration, on_quiet: F)
where
    F: Fn(),
{
    while ticks.recv().await.is_some() {
        let mut deadline = Instant::now() + debounce;
        loop {
            tokio::select! {
                tick = ticks.recv() => match tick {
                    Some(()) => deadline = Instant::now() + debounce,
                    None => return,
                },
                _ = sleep_until(deadline) => break,
            }
        }
        tracing::debug!("Filesystem quiet for {:?}, requesting scan", debounce);
        on_quiet();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_burst_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&fired);
        let task = tokio::spawn(debounce_ticks(rx, Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..5 {
            tx.send(()).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel_mid_burst_does_not_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&fired);
        let task = tokio::spawn(debounce_ticks(rx, Duration::from_millis(200), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tx.send(()).unwrap();
        drop(tx);
        task.await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_releases() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let mut watcher = FolderWatcher::new(Duration::from_millis(50), tokio::runtime::Handle::current());

        assert_eq!(watcher.start(&root, || {}).unwrap(), WatchStart::Started);
        assert_eq!(watcher.start(&root, || {}).unwrap(), WatchStart::AlreadyActive);
        assert_eq!(watcher.watched_path(), Some(root.as_path()));

        watcher.stop();
        assert!(!watcher.is_active());
        watcher.stop();
        assert!(!watcher.is_active());
    }

    #[tokio::test]
    async fn test_missing_directory_stays_idle() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().join("missing")).unwrap();
        let mut watcher = FolderWatcher::new(Duration::from_millis(50), tokio::runtime::Handle::current());

        assert!(matches!(
            watcher.start(&root, || {}),
            Err(WatchError::NotADirectory(_))
        ));
        assert!(!watcher.is_active());
    }

    #[tokio::test]
    async fn test_new_file_triggers_callback() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let (quiet_tx, mut quiet_rx) = mpsc::unbounded_channel();
        let mut watcher = FolderWatcher::new(Duration::from_millis(50), tokio::runtime::Handle::current());

        watcher
            .start(&root, move || {
                let _ = quiet_tx.send(());
            })
            .unwrap();

        std::fs::write(root.join("new.txt"), b"hello").unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(5), quiet_rx.recv()).await;
        assert!(matches!(fired, Ok(Some(()))));
        watcher.stop();
    }
}
