// State management module
//
// This module provides the StateManager which wraps EngineState with thread-safe access
// using Arc<RwLock<T>> and emits change events for observers.

use crate::metrics::Metrics;
use crate::models::{EngineState, FileMoveRecord, StatusMessage};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events notify presentation layers about state changes without
/// requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Monitoring was started or stopped
    MonitoringChanged { is_monitoring: bool },

    /// The watched folder path changed
    WatchedFolderChanged { path: Utf8PathBuf },

    /// Rules were added, removed, edited or reordered
    RulesChanged { count: usize },

    /// A completed move was added to history
    MoveRecorded { record: FileMoveRecord },

    /// History was emptied
    HistoryCleared,

    /// The status line changed; `None` means it was cleared
    StatusChanged { status: Option<StatusMessage> },

    /// First-run flag flipped
    FirstRunChanged { is_first_run: bool },

    /// Login registration toggled
    StartOnLoginChanged { enabled: bool },

    /// A scan pass finished
    ScanCompleted { scans_completed: u64 },

    /// State has been reset to defaults
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the central state container that:
/// - Provides thread-safe access to [`EngineState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Usage
///
/// - [`read()`](Self::read) for reading a few fields
/// - [`snapshot()`](Self::snapshot) for a full clone
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    /// The engine state protected by RwLock for thread-safe access
    state: Arc<RwLock<EngineState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,

    metrics: Option<Arc<Metrics>>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// The broadcast channel buffers 100 events per subscriber.
    pub fn new() -> Self {
        Self::with_state(EngineState::default())
    }

    /// Create a StateManager around an initial state
    pub fn with_state(initial: EngineState) -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(initial)),
            state_tx,
            metrics: None,
        }
    }

    /// Count updates in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> EngineState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let monitoring = state_manager.read(|state| state.is_monitoring);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&EngineState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// This is the only way to modify state. It:
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut EngineState),
    {
        self.apply(update_fn).1
    }

    /// Like [`update()`](Self::update), but hands back the closure's result.
    ///
    /// Used for fallible mutations such as rule edits.
    pub fn update_with<F, R>(&self, update_fn: F) -> R
    where
        F: FnOnce(&mut EngineState) -> R,
    {
        self.apply(update_fn).0
    }

    fn apply<F, R>(&self, update_fn: F) -> (R, Vec<StateChange>)
    where
        F: FnOnce(&mut EngineState) -> R,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        let result = update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_state_update();
        }

        (result, changes)
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &EngineState, new: &EngineState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_monitoring != new.is_monitoring {
            changes.push(StateChange::MonitoringChanged {
                is_monitoring: new.is_monitoring,
            });
        }

        if old.watched_folder != new.watched_folder {
            changes.push(StateChange::WatchedFolderChanged {
                path: new.watched_folder.clone(),
            });
        }

        if old.rules != new.rules {
            changes.push(StateChange::RulesChanged {
                count: new.rules.len(),
            });
        }

        if old.recent_moves != new.recent_moves {
            if new.recent_moves.is_empty() {
                changes.push(StateChange::HistoryCleared);
            } else {
                // Newest first; emit the fresh records oldest first
                let previous_latest = old.recent_moves.latest().map(|r| r.id);
                let mut fresh: Vec<&FileMoveRecord> = new
                    .recent_moves
                    .iter()
                    .take_while(|r| Some(r.id) != previous_latest)
                    .collect();
                fresh.reverse();
                changes.extend(fresh.into_iter().map(|record| StateChange::MoveRecorded {
                    record: record.clone(),
                }));
            }
        }

        if old.status != new.status {
            changes.push(StateChange::StatusChanged {
                status: new.status.clone(),
            });
        }

        if old.is_first_run != new.is_first_run {
            changes.push(StateChange::FirstRunChanged {
                is_first_run: new.is_first_run,
            });
        }

        if old.start_on_login != new.start_on_login {
            changes.push(StateChange::StartOnLoginChanged {
                enabled: new.start_on_login,
            });
        }

        if old.scans_completed != new.scans_completed {
            changes.push(StateChange::ScanCompleted {
                scans_completed: new.scans_completed,
            });
        }

        changes
    }

    // Convenience methods for common state updates

    pub fn set_monitoring(&self, is_monitoring: bool) -> Vec<StateChange> {
        self.update(|state| state.is_monitoring = is_monitoring)
    }

    pub fn set_watched_folder(&self, path: Utf8PathBuf) -> Vec<StateChange> {
        self.update(|state| state.watched_folder = path)
    }

    pub fn record_move(&self, record: FileMoveRecord) -> Vec<StateChange> {
        self.update(|state| state.record_move(record))
    }

    pub fn clear_recent_moves(&self) -> Vec<StateChange> {
        self.update(|state| state.recent_moves.clear())
    }

    pub fn set_status(&self, status: StatusMessage) -> Vec<StateChange> {
        self.update(|state| state.status = Some(status))
    }

    /// Clear the status line only if it still shows the message from `generation`
    pub fn clear_status_if(&self, generation: u64) -> Vec<StateChange> {
        self.update(|state| {
            state.clear_status_if(generation);
        })
    }

    /// Reset to a fresh state, keeping the watched folder and login flag
    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            let capacity = state.recent_moves.capacity();
            let watched_folder = std::mem::take(&mut state.watched_folder);
            let start_on_login = state.start_on_login;
            *state = EngineState {
                watched_folder,
                start_on_login,
                ..EngineState::with_history_capacity(capacity)
            };
        });

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
            metrics: self.metrics.clone(),
        }
    }
}
