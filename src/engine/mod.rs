//! Engine module - orchestrates rules, settings, the watcher and the scan worker.
//!
//! [`OrganizerEngine`] is the single entry point for a presentation layer. It is
//! cheap to clone; every clone drives the same engine.
//!
//! # Execution contexts
//!
//! - **Foreground**: engine methods mutate [`EngineState`] through the
//!   [`StateManager`], which broadcasts [`StateChange`] events to subscribers.
//! - **Background serial**: one tokio task drains a queue of scan requests and
//!   runs each scan on the blocking pool, awaiting it before taking the next.
//!   Watcher callbacks, [`OrganizerEngine::scan_now`], rule additions and
//!   monitoring start all queue here, so scans never interleave.

use crate::config::{EngineConfig, SettingsStore};
use crate::metrics::Metrics;
use crate::models::{AppSettings, EngineState, OrganizingRule, RuleError, RuleSet, StatusMessage};
use crate::services::{
    AutostartError, AutostartRegistrar, CollisionSafeMover, FolderWatcher, ScanReport, WatchError,
    WatchStart, scan_directory,
};
use crate::state::{StateChange, StateManager};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Why a scan was queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    /// Monitoring just started
    MonitoringStarted,
    /// The watcher saw a burst of changes settle
    FolderChanged,
    /// A rule was added
    RuleAdded,
    /// Requested through [`OrganizerEngine::scan_now`]
    Manual,
}

struct ScanRequest {
    trigger: ScanTrigger,
    reply: Option<oneshot::Sender<ScanReport>>,
}

struct Inner {
    state: StateManager,
    store: SettingsStore,
    config: EngineConfig,
    runtime: Handle,
    scans: mpsc::UnboundedSender<ScanRequest>,
    // Also serializes every change to `is_monitoring`
    watcher: Mutex<FolderWatcher>,
    pending_start: Mutex<Option<JoinHandle<()>>>,
    autostart: Arc<dyn AutostartRegistrar>,
    metrics: Arc<Metrics>,
    mover: CollisionSafeMover,
    status_generation: AtomicU64,
}

/// The watch, debounce, classify and move engine
#[derive(Clone)]
pub struct OrganizerEngine {
    inner: Arc<Inner>,
}

impl OrganizerEngine {
    /// Load persisted settings and bring the engine up.
    ///
    /// Settings come from the primary file, then its `.backup`, and otherwise
    /// the engine starts in first-run mode watching the user's downloads folder.
    /// Outside first-run, monitoring starts immediately, which also queues the
    /// startup scan.
    pub fn bootstrap(
        store: SettingsStore,
        config: EngineConfig,
        autostart: Arc<dyn AutostartRegistrar>,
        runtime: Handle,
    ) -> Self {
        let config = config.sanitized();
        let mut initial = EngineState::with_history_capacity(config.history_capacity);

        match load_settings(&store) {
            Some(settings) => {
                initial.rules = RuleSet::from_rules(valid_rules(settings.rules));
                initial.watched_folder = settings.watched_folder_path;
                initial.is_first_run = settings.is_first_run;
            }
            None => {
                initial.watched_folder = default_watched_folder();
                initial.is_first_run = true;
            }
        }
        initial.start_on_login = autostart.is_enabled();

        tracing::info!(
            watched_folder = %initial.watched_folder,
            rules = initial.rules.len(),
            first_run = initial.is_first_run,
            "Engine state loaded"
        );

        let engine = Self::with_state(initial, store, config, autostart, runtime);
        engine.show_status(
            format!("Watching folder: {}", engine.watched_folder()),
            false,
        );

        if !engine.is_first_run() {
            // Errors are already surfaced as status
            let _ = engine.start_monitoring();
        }

        engine
    }

    fn with_state(
        initial: EngineState,
        store: SettingsStore,
        config: EngineConfig,
        autostart: Arc<dyn AutostartRegistrar>,
        runtime: Handle,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let state = StateManager::with_state(initial).with_metrics(Arc::clone(&metrics));
        let watcher = FolderWatcher::new(config.debounce(), runtime.clone())
            .with_metrics(Arc::clone(&metrics));
        let (scans, requests) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            state,
            store,
            config,
            runtime: runtime.clone(),
            scans,
            watcher: Mutex::new(watcher),
            pending_start: Mutex::new(None),
            autostart,
            metrics,
            mover: CollisionSafeMover::new(),
            status_generation: AtomicU64::new(0),
        });

        runtime.spawn(scan_worker(Arc::downgrade(&inner), requests));

        Self { inner }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Full copy of the current engine state
    pub fn snapshot(&self) -> EngineState {
        self.inner.state.snapshot()
    }

    /// Receive a [`StateChange`] for every future mutation
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.inner.state.subscribe()
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.state.read(|s| s.is_monitoring)
    }

    pub fn is_first_run(&self) -> bool {
        self.inner.state.read(|s| s.is_first_run)
    }

    pub fn watched_folder(&self) -> Utf8PathBuf {
        self.inner.state.read(|s| s.watched_folder.clone())
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.inner.store
    }

    // ------------------------------------------------------------------
    // Watched folder and rules
    // ------------------------------------------------------------------

    /// Point the engine at a new folder and persist it.
    ///
    /// Monitoring is not restarted; call [`restart_monitoring`](Self::restart_monitoring).
    pub fn set_watched_folder(&self, path: impl Into<Utf8PathBuf>) {
        let path = path.into();
        tracing::info!("Watched folder set to {}", path);
        self.inner
            .state
            .update(|s| s.watched_folder = path.clone());
        self.persist_with_status(format!("Changed watched folder to: {}", path));
    }

    /// Append a rule. Folder names must be unique.
    pub fn add_rule(&self, rule: OrganizingRule) -> Result<(), RuleError> {
        let outcome = rule.validate().and_then(|()| {
            self.inner.state.update_with(|s| {
                if s.rules.contains_folder(&rule.folder_name, None) {
                    Err(RuleError::DuplicateFolder(rule.folder_name.clone()))
                } else {
                    s.rules.push(rule)
                }
            })
        });

        self.report_rule_outcome(outcome, "Rule added")?;
        if self.inner.config.rescan_on_rule_add {
            self.request_scan(ScanTrigger::RuleAdded, None);
        }
        Ok(())
    }

    pub fn remove_rule(&self, index: usize) -> Result<OrganizingRule, RuleError> {
        let removed = match self.inner.state.update_with(|s| s.rules.remove(index)) {
            Ok(rule) => rule,
            Err(e) => return Err(self.reject_rule_change(e)),
        };
        self.persist_with_status("Rule removed");
        Ok(removed)
    }

    /// Replace the rule at `index`. The new folder name must not clash with another rule.
    pub fn update_rule(&self, index: usize, rule: OrganizingRule) -> Result<(), RuleError> {
        let outcome = rule.validate().and_then(|()| {
            self.inner.state.update_with(|s| {
                if s.rules.contains_folder(&rule.folder_name, Some(index)) {
                    Err(RuleError::DuplicateFolder(rule.folder_name.clone()))
                } else {
                    s.rules.replace(index, rule).map(|_| ())
                }
            })
        });
        self.report_rule_outcome(outcome, "Rule updated")
    }

    pub fn set_rule_enabled(&self, index: usize, enabled: bool) -> Result<(), RuleError> {
        let outcome = self
            .inner
            .state
            .update_with(|s| s.rules.set_enabled(index, enabled));
        let message = if enabled { "Rule enabled" } else { "Rule disabled" };
        self.report_rule_outcome(outcome, message)
    }

    /// Change rule priority by moving the rule at `from` to position `to`
    pub fn move_rule(&self, from: usize, to: usize) -> Result<(), RuleError> {
        let outcome = self.inner.state.update_with(|s| s.rules.move_rule(from, to));
        self.report_rule_outcome(outcome, "Rules reordered")
    }

    /// Replace every rule with the built-in set
    pub fn load_default_rules(&self) {
        self.inner.state.update(|s| s.rules = RuleSet::defaults());
        self.persist_with_status("Default rules loaded");
    }

    fn report_rule_outcome(
        &self,
        outcome: Result<(), RuleError>,
        success: &str,
    ) -> Result<(), RuleError> {
        match outcome {
            Ok(()) => {
                self.persist_with_status(success);
                Ok(())
            }
            Err(e) => Err(self.reject_rule_change(e)),
        }
    }

    fn reject_rule_change(&self, error: RuleError) -> RuleError {
        tracing::warn!("Rule change rejected: {}", error);
        self.show_status(format!("Rule not saved: {}", error), true);
        error
    }

    // ------------------------------------------------------------------
    // Monitoring
    // ------------------------------------------------------------------

    /// Subscribe to the watched folder and queue an initial scan.
    ///
    /// A no-op when already monitoring. On failure the engine stays idle and
    /// an error status is shown.
    pub fn start_monitoring(&self) -> Result<WatchStart, WatchError> {
        let mut watcher = self.lock_watcher();
        self.start_locked(&mut watcher)
    }

    fn start_locked(&self, watcher: &mut FolderWatcher) -> Result<WatchStart, WatchError> {
        if watcher.is_active() {
            tracing::debug!("start_monitoring ignored: already monitoring");
            return Ok(WatchStart::AlreadyActive);
        }

        let folder = self.watched_folder();
        let weak = Arc::downgrade(&self.inner);
        let started = watcher.start(&folder, move || {
            if let Some(engine) = OrganizerEngine::from_weak(&weak) {
                engine.show_status("Organizing new files", false);
                engine.request_scan(ScanTrigger::FolderChanged, None);
            }
        });

        match started {
            Ok(outcome) => {
                self.inner.state.set_monitoring(true);
                self.request_scan(ScanTrigger::MonitoringStarted, None);
                self.show_status("Monitoring started - watching for new files", false);
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("Failed to start monitoring: {}", e);
                self.show_status(format!("Failed to open directory for monitoring: {}", e), true);
                Err(e)
            }
        }
    }

    /// Cancel the watch subscription and any start still waiting out the
    /// first-run grace delay. A scan already running is allowed to finish.
    pub fn stop_monitoring(&self) {
        self.cancel_pending_start();
        let mut watcher = self.lock_watcher();
        if self.stop_locked(&mut watcher) {
            self.show_status("Monitoring stopped", false);
        }
    }

    /// Returns whether the engine was monitoring
    fn stop_locked(&self, watcher: &mut FolderWatcher) -> bool {
        watcher.stop();
        self.inner
            .state
            .update_with(|s| std::mem::replace(&mut s.is_monitoring, false))
    }

    /// Stop, then start again on the current watched folder
    pub fn restart_monitoring(&self) -> Result<WatchStart, WatchError> {
        self.stop_monitoring();
        self.start_monitoring()
    }

    fn cancel_pending_start(&self) {
        let pending = self
            .inner
            .pending_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = pending {
            task.abort();
        }
    }

    fn lock_watcher(&self) -> MutexGuard<'_, FolderWatcher> {
        self.inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Queue an out-of-band scan regardless of watcher state.
    ///
    /// The receiver yields the report once the scan has run. It is closed
    /// without a value when the watched folder could not be listed.
    pub fn scan_now(&self) -> oneshot::Receiver<ScanReport> {
        let (tx, rx) = oneshot::channel();
        self.request_scan(ScanTrigger::Manual, Some(tx));
        rx
    }

    /// [`scan_now`](Self::scan_now) and wait for the outcome
    pub async fn scan_now_and_wait(&self) -> Option<ScanReport> {
        self.scan_now().await.ok()
    }

    fn request_scan(&self, trigger: ScanTrigger, reply: Option<oneshot::Sender<ScanReport>>) {
        tracing::debug!(?trigger, "Scan requested");
        if self
            .inner
            .scans
            .send(ScanRequest { trigger, reply })
            .is_err()
        {
            tracing::warn!("Scan worker has stopped, dropping {:?} scan", trigger);
        }
    }

    async fn run_scan(&self, request: ScanRequest) {
        let (root, rules) = self
            .inner
            .state
            .read(|s| (s.watched_folder.clone(), s.rules.clone()));
        let mover = self.inner.mover;
        let started = Instant::now();

        let scan_root = root.clone();
        let outcome =
            tokio::task::spawn_blocking(move || scan_directory(&scan_root, &rules, &mover)).await;

        let report = match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                self.inner.metrics.record_scan_failed();
                tracing::warn!(root = %root, error = %e, "Failed to list watched folder");
                self.show_status(format!("Error scanning directory: {}", e), true);
                return;
            }
            Err(e) => {
                self.inner.metrics.record_scan_failed();
                tracing::error!("Scan task failed: {}", e);
                self.show_status(format!("Scan failed: {}", e), true);
                return;
            }
        };

        self.inner.metrics.record_scan(
            report.moved.len(),
            report.unmatched.len(),
            report.failed.len(),
            started.elapsed(),
        );

        self.inner.state.update(|s| {
            for record in &report.moved {
                s.record_move(record.clone());
            }
            s.scans_completed += 1;
        });

        for (name, error) in &report.failed {
            self.show_status(format!("Error moving {}: {}", name, error), true);
        }

        tracing::info!(
            trigger = ?request.trigger,
            seen = report.files_seen(),
            moved = report.moved.len(),
            unmatched = report.unmatched.len(),
            failed = report.failed.len(),
            "Scan completed"
        );

        // Moves out of the root raise their own events; keep the quiet rescan silent
        if !(report.is_empty() && request.trigger == ScanTrigger::FolderChanged) {
            self.show_status(report.summary(), !report.failed.is_empty());
        }

        if let Some(reply) = request.reply {
            let _ = reply.send(report);
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle and settings
    // ------------------------------------------------------------------

    /// Leave first-run mode and begin monitoring after the configured grace delay.
    ///
    /// The delayed start is dropped if monitoring is stopped or settings are
    /// cleared before it fires.
    pub fn complete_first_run_setup(&self) {
        self.inner.state.update(|s| s.is_first_run = false);
        self.persist_with_status("Setup complete");

        let weak = Arc::downgrade(&self.inner);
        let grace = self.inner.config.first_run_grace();
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(engine) = OrganizerEngine::from_weak(&weak) else {
                return;
            };
            let mut watcher = engine.lock_watcher();
            if engine.is_first_run() {
                tracing::debug!("Setup was undone during the grace delay, not monitoring");
                return;
            }
            let _ = engine.start_locked(&mut watcher);
        });

        let previous = self
            .inner
            .pending_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop monitoring, reset to first-run with no rules and delete the settings file.
    ///
    /// The watched folder and login registration are kept.
    pub fn clear_all_settings(&self) {
        self.cancel_pending_start();
        {
            let mut watcher = self.lock_watcher();
            self.stop_locked(&mut watcher);
            self.inner.state.reset();
        }

        match self.inner.store.clear() {
            Ok(()) => {
                self.show_status("Settings cleared", false);
            }
            Err(e) => {
                tracing::error!("Failed to clear settings: {}", e);
                self.show_status(format!("Failed to clear settings: {}", e), true);
            }
        }
    }

    /// Register or unregister the executable to run at login.
    ///
    /// State mirrors what the registrar reports afterwards.
    pub fn set_start_on_login(&self, enabled: bool) -> Result<(), AutostartError> {
        let outcome = if enabled {
            self.inner.autostart.enable()
        } else {
            self.inner.autostart.disable()
        };

        let registered = self.inner.autostart.is_enabled();
        self.inner.state.update(|s| s.start_on_login = registered);

        match outcome {
            Ok(()) => {
                let message = if enabled { "Auto-start enabled" } else { "Auto-start disabled" };
                self.show_status(message, false);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to update autostart: {}", e);
                self.show_status(format!("Failed to update auto-start: {}", e), true);
                Err(e)
            }
        }
    }

    pub fn clear_recent_moves(&self) {
        self.inner.state.clear_recent_moves();
    }

    /// Write the current rules, folder and first-run flag to disk.
    ///
    /// Failure is shown as an error status and leaves the previous file in place.
    pub fn persist_settings(&self) -> bool {
        let settings = self.inner.state.read(|s| {
            AppSettings::new(s.rules.to_vec(), s.watched_folder.clone(), s.is_first_run)
        });

        match self.inner.store.save(&settings) {
            Ok(()) => {
                tracing::debug!("Settings saved to {}", self.inner.store.settings_path());
                true
            }
            Err(e) => {
                tracing::error!("Failed to save settings: {}", e);
                self.show_status(format!("Failed to save settings: {}", e), true);
                false
            }
        }
    }

    fn persist_with_status(&self, success: impl Into<String>) {
        if self.persist_settings() {
            self.show_status(success, false);
        }
    }

    // ------------------------------------------------------------------
    // Status line
    // ------------------------------------------------------------------

    /// Publish a transient status and schedule its removal.
    ///
    /// The removal only applies while this message is still the current one,
    /// so a newer message is never cleared early. Returns the message generation.
    pub fn show_status(&self, text: impl Into<String>, is_error: bool) -> u64 {
        let text = text.into();
        let generation = self.inner.status_generation.fetch_add(1, Ordering::SeqCst) + 1;

        if is_error {
            tracing::warn!(generation, "Status: {}", text);
        } else {
            tracing::debug!(generation, "Status: {}", text);
        }

        self.inner.state.set_status(StatusMessage {
            text,
            is_error,
            generation,
        });
        self.inner.metrics.record_status_message();

        let weak = Arc::downgrade(&self.inner);
        let duration = self.inner.config.status_duration();
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(inner) = weak.upgrade() {
                inner.state.clear_status_if(generation);
            }
        });

        generation
    }

    /// Remove the current status right away
    pub fn dismiss_status(&self) {
        self.inner.state.update(|s| s.status = None);
    }
}

/// Serial background context: one scan at a time, in request order
async fn scan_worker(inner: Weak<Inner>, mut requests: mpsc::UnboundedReceiver<ScanRequest>) {
    tracing::debug!("Scan worker started");
    while let Some(request) = requests.recv().await {
        let Some(engine) = OrganizerEngine::from_weak(&inner) else {
            break;
        };
        engine.run_scan(request).await;
    }
    tracing::debug!("Scan worker stopped");
}

/// Primary file first, then the backup; `None` means first run
fn load_settings(store: &SettingsStore) -> Option<AppSettings> {
    match store.load() {
        Ok(Some(settings)) => return Some(settings),
        Ok(None) => {
            tracing::info!("No settings at {}, starting first run", store.settings_path());
            return None;
        }
        Err(e) => tracing::warn!("Could not load settings: {}; trying backup", e),
    }

    match store.load_backup() {
        Ok(Some(settings)) => {
            tracing::info!("Recovered settings from {}", store.backup_path());
            Some(settings)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Could not load settings backup: {}; starting first run", e);
            None
        }
    }
}

fn valid_rules(rules: Vec<OrganizingRule>) -> Vec<OrganizingRule> {
    rules
        .into_iter()
        .filter(|rule| match rule.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping invalid saved rule: {}", e);
                false
            }
        })
        .collect()
}

/// The user's downloads folder, or `~/Downloads` when the platform has none
pub fn default_watched_folder() -> Utf8PathBuf {
    let utf8 = |p: std::path::PathBuf| Utf8PathBuf::try_from(p).ok();
    dirs::download_dir()
        .and_then(utf8)
        .or_else(|| dirs::home_dir().and_then(utf8).map(|home| home.join("Downloads")))
        .unwrap_or_else(|| Utf8Path::new("Downloads").to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::autostart::MockAutostartRegistrar;
    use crate::services::DisabledAutostart;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn utf8(temp_dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap()
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            debounce_ms: 50,
            first_run_grace_ms: 20,
            // Tests must never scan the real downloads folder
            rescan_on_rule_add: false,
            ..EngineConfig::default()
        }
    }

    fn engine_in(settings_dir: &Utf8Path, config: EngineConfig) -> OrganizerEngine {
        OrganizerEngine::bootstrap(
            SettingsStore::new(settings_dir),
            config,
            Arc::new(DisabledAutostart),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_bootstrap_without_settings_is_first_run() {
        let settings = TempDir::new().unwrap();
        let engine = engine_in(&utf8(&settings), test_config());

        let state = engine.snapshot();
        assert!(state.is_first_run);
        assert!(!state.is_monitoring);
        assert!(state.rules.is_empty());
        assert!(!state.watched_folder.as_str().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_mirrors_autostart_registration() {
        let settings = TempDir::new().unwrap();
        let mut registrar = MockAutostartRegistrar::new();
        registrar.expect_is_enabled().return_const(true);

        let engine = OrganizerEngine::bootstrap(
            SettingsStore::new(utf8(&settings)),
            test_config(),
            Arc::new(registrar),
            Handle::current(),
        );

        assert!(engine.snapshot().start_on_login);
    }

    #[tokio::test]
    async fn test_set_start_on_login_delegates_to_registrar() {
        let settings = TempDir::new().unwrap();
        let mut registrar = MockAutostartRegistrar::new();
        registrar.expect_enable().times(1).returning(|| Ok(()));
        let mut enabled = false;
        registrar.expect_is_enabled().returning(move || {
            let current = enabled;
            enabled = true;
            current
        });

        let engine = OrganizerEngine::bootstrap(
            SettingsStore::new(utf8(&settings)),
            test_config(),
            Arc::new(registrar),
            Handle::current(),
        );
        assert!(!engine.snapshot().start_on_login);

        engine.set_start_on_login(true).unwrap();
        assert!(engine.snapshot().start_on_login);
        assert_eq!(engine.snapshot().status_text(), Some("Auto-start enabled"));
    }

    #[tokio::test]
    async fn test_set_start_on_login_failure_is_error_status() {
        let settings = TempDir::new().unwrap();
        let mut registrar = MockAutostartRegistrar::new();
        registrar.expect_is_enabled().return_const(false);
        registrar
            .expect_disable()
            .returning(|| Err(AutostartError::NoConfigDirectory));

        let engine = OrganizerEngine::bootstrap(
            SettingsStore::new(utf8(&settings)),
            test_config(),
            Arc::new(registrar),
            Handle::current(),
        );

        assert!(engine.set_start_on_login(false).is_err());
        assert!(engine.snapshot().is_error());
    }

    #[tokio::test]
    async fn test_add_rule_rejects_duplicate_folder() {
        let settings = TempDir::new().unwrap();
        let engine = engine_in(&utf8(&settings), test_config());

        engine
            .add_rule(OrganizingRule::new("Documents", [".pdf"]))
            .unwrap();
        let err = engine
            .add_rule(OrganizingRule::new("Documents", [".txt"]))
            .unwrap_err();

        assert_eq!(err, RuleError::DuplicateFolder("Documents".to_string()));
        assert_eq!(engine.snapshot().rules.len(), 1);
        assert!(engine.snapshot().is_error());
    }

    #[tokio::test]
    async fn test_rule_edits_are_persisted() {
        let settings = TempDir::new().unwrap();
        let dir = utf8(&settings);
        let engine = engine_in(&dir, test_config());

        engine.load_default_rules();
        engine.set_rule_enabled(0, false).unwrap();
        engine.move_rule(0, 1).unwrap();
        let removed = engine.remove_rule(5).unwrap();
        assert_eq!(removed.folder_name, "Code");

        let saved = SettingsStore::new(&dir).load().unwrap().unwrap();
        let names: Vec<&str> = saved.rules.iter().map(|r| r.folder_name.as_str()).collect();
        assert_eq!(names, vec!["Images", "Music", "Documents", "Videos", "Archives"]);
        assert!(!saved.rules[1].enabled);
    }

    #[tokio::test]
    async fn test_update_rule_out_of_bounds() {
        let settings = TempDir::new().unwrap();
        let engine = engine_in(&utf8(&settings), test_config());

        let err = engine
            .update_rule(3, OrganizingRule::new("Docs", [".pdf"]))
            .unwrap_err();
        assert_eq!(err, RuleError::IndexOutOfBounds { index: 3, len: 0 });
    }

    #[tokio::test]
    async fn test_scan_now_moves_matching_files() {
        let settings = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let root = utf8(&watched);
        let engine = engine_in(&utf8(&settings), test_config());
        engine.set_watched_folder(root.clone());
        engine
            .add_rule(OrganizingRule::new("Documents", [".pdf"]))
            .unwrap();

        fs::write(root.join("report.pdf"), b"pdf").unwrap();
        fs::write(root.join("notes.xyz"), b"?").unwrap();

        let report = engine.scan_now_and_wait().await.unwrap();
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.unmatched, vec!["notes.xyz".to_string()]);

        let state = engine.snapshot();
        assert!(root.join("Documents").join("report.pdf").exists());
        assert!(root.join("notes.xyz").exists());
        assert_eq!(state.recent_moves.len(), 1);
        assert_eq!(state.recent_moves.latest().unwrap().file_name, "report.pdf");
        assert_eq!(state.scans_completed, 1);
    }

    #[tokio::test]
    async fn test_scan_of_missing_folder_reports_error() {
        let settings = TempDir::new().unwrap();
        let engine = engine_in(&utf8(&settings), test_config());
        engine.set_watched_folder(utf8(&settings).join("missing"));

        assert!(engine.scan_now_and_wait().await.is_none());
        assert!(engine.snapshot().is_error());
        assert_eq!(engine.metrics().scans_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_start_monitoring_is_idempotent() {
        let settings = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let engine = engine_in(&utf8(&settings), test_config());
        engine.set_watched_folder(utf8(&watched));

        assert_eq!(engine.start_monitoring().unwrap(), WatchStart::Started);
        assert_eq!(engine.start_monitoring().unwrap(), WatchStart::AlreadyActive);
        assert!(engine.is_monitoring());

        engine.stop_monitoring();
        engine.stop_monitoring();
        assert!(!engine.is_monitoring());
    }

    #[tokio::test]
    async fn test_start_monitoring_missing_folder_stays_idle() {
        let settings = TempDir::new().unwrap();
        let engine = engine_in(&utf8(&settings), test_config());
        engine.set_watched_folder(utf8(&settings).join("missing"));

        assert!(engine.start_monitoring().is_err());
        assert!(!engine.is_monitoring());
        assert!(engine.snapshot().is_error());
    }

    #[tokio::test]
    async fn test_stale_status_clear_keeps_newer_message() {
        let settings = TempDir::new().unwrap();
        let config = EngineConfig {
            status_duration_ms: 100,
            ..test_config()
        };
        let engine = engine_in(&utf8(&settings), config);

        engine.show_status("first", false);
        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.show_status("second", true);
        tokio::time::sleep(Duration::from_millis(60)).await;

        // The first message's timer has fired by now
        let state = engine.snapshot();
        assert_eq!(state.status_text(), Some("second"));
        assert!(state.is_error());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.snapshot().status.is_none());
    }

    #[tokio::test]
    async fn test_dismiss_status() {
        let settings = TempDir::new().unwrap();
        let engine = engine_in(&utf8(&settings), test_config());
        engine.show_status("hello", false);
        engine.dismiss_status();
        assert!(engine.snapshot().status.is_none());
    }

    #[tokio::test]
    async fn test_complete_first_run_starts_monitoring_after_grace() {
        let settings = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let dir = utf8(&settings);
        let engine = engine_in(&dir, test_config());
        engine.set_watched_folder(utf8(&watched));

        engine.complete_first_run_setup();
        assert!(!engine.is_first_run());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !engine.is_monitoring() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let saved = SettingsStore::new(&dir).load().unwrap().unwrap();
        assert!(!saved.is_first_run);
        engine.stop_monitoring();
    }

    #[tokio::test]
    async fn test_clear_all_settings_returns_to_first_run() {
        let settings = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let dir = utf8(&settings);
        let engine = engine_in(&dir, test_config());
        engine.set_watched_folder(utf8(&watched));
        engine.load_default_rules();
        engine.start_monitoring().unwrap();

        engine.clear_all_settings();

        let state = engine.snapshot();
        assert!(state.is_first_run);
        assert!(state.rules.is_empty());
        assert!(!state.is_monitoring);
        assert!(!SettingsStore::new(&dir).settings_path().exists());
    }

    #[tokio::test]
    async fn test_clear_during_grace_delay_keeps_engine_idle() {
        let settings = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let config = EngineConfig {
            first_run_grace_ms: 200,
            ..test_config()
        };
        let engine = engine_in(&utf8(&settings), config);
        engine.set_watched_folder(utf8(&watched));
        engine.load_default_rules();

        engine.complete_first_run_setup();
        engine.clear_all_settings();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let state = engine.snapshot();
        assert!(state.is_first_run);
        assert!(state.rules.is_empty());
        assert!(!state.is_monitoring);
        assert!(!engine.lock_watcher().is_active());
    }

    #[tokio::test]
    async fn test_stop_during_grace_delay_cancels_start() {
        let settings = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let config = EngineConfig {
            first_run_grace_ms: 200,
            ..test_config()
        };
        let engine = engine_in(&utf8(&settings), config);
        engine.set_watched_folder(utf8(&watched));

        engine.complete_first_run_setup();
        engine.stop_monitoring();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!engine.is_first_run());
        assert!(!engine.is_monitoring());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_stop_keeps_flag_in_sync_with_watcher() {
        let settings = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let engine = engine_in(&utf8(&settings), test_config());
        engine.set_watched_folder(utf8(&watched));

        let mut tasks = Vec::new();
        for i in 0..40 {
            let engine = engine.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                if i % 2 == 0 {
                    let _ = engine.start_monitoring();
                } else {
                    engine.stop_monitoring();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let active = engine.lock_watcher().is_active();
        assert_eq!(engine.is_monitoring(), active);

        engine.stop_monitoring();
        assert_eq!(engine.start_monitoring().unwrap(), WatchStart::Started);
        assert!(engine.is_monitoring());
        engine.stop_monitoring();
    }

    #[tokio::test]
    async fn test_bootstrap_recovers_from_backup() {
        let settings = TempDir::new().unwrap();
        let watched = TempDir::new().unwrap();
        let dir = utf8(&settings);
        let store = SettingsStore::new(&dir);

        let mut saved = AppSettings::new(RuleSet::defaults().to_vec(), utf8(&watched), false);
        store.save(&saved).unwrap();
        saved.rules.truncate(1);
        store.save(&saved).unwrap();
        fs::write(store.settings_path(), "rules: [not: valid").unwrap();

        let engine = engine_in(&dir, test_config());
        let state = engine.snapshot();
        assert_eq!(state.rules.len(), 6);
        assert!(!state.is_first_run);
        assert!(state.is_monitoring);
        engine.stop_monitoring();
    }
}
