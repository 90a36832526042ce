use crate::models::history::{FileMoveRecord, MoveHistory};
use crate::models::rule::RuleSet;
use camino::Utf8PathBuf;

/// A transient status line shown to the user.
///
/// `generation` increases with every published message, so a delayed
/// auto-clear can tell whether the message it was scheduled for is still
/// the one on screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
    pub generation: u64,
}

/// Single source of truth for observable engine state.
///
/// # Thread Safety
///
/// `EngineState` is wrapped in `Arc<RwLock<EngineState>>` by [`crate::state::StateManager`].
/// Never mutate it directly; go through [`StateManager::update`](crate::state::StateManager::update)
/// so observers receive [`StateChange`](crate::state::StateChange) events.
#[derive(Clone, Debug)]
pub struct EngineState {
    // Monitoring
    pub is_monitoring: bool,
    pub watched_folder: Utf8PathBuf,

    // Rules and results
    pub rules: RuleSet,
    pub recent_moves: MoveHistory,
    pub scans_completed: u64,

    // Status line
    pub status: Option<StatusMessage>,

    // Lifecycle flags
    pub is_first_run: bool,
    pub start_on_login: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            is_monitoring: false,
            watched_folder: Utf8PathBuf::new(),

            rules: RuleSet::new(),
            recent_moves: MoveHistory::new(),
            scans_completed: 0,

            status: None,

            is_first_run: true,
            start_on_login: false,
        }
    }
}

impl EngineState {
    /// Fresh state whose history keeps `history_capacity` moves
    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            recent_moves: MoveHistory::with_capacity(history_capacity),
            ..Self::default()
        }
    }

    pub fn record_move(&mut self, record: FileMoveRecord) {
        self.recent_moves.record(record);
    }

    /// Text of the current status, if any
    pub fn status_text(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.text.as_str())
    }

    pub fn is_error(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.is_error)
    }

    /// Drop the current status only if it is still the one from `generation`
    pub fn clear_status_if(&mut self, generation: u64) -> bool {
        if self
            .status
            .as_ref()
            .is_some_and(|s| s.generation == generation)
        {
            self.status = None;
            true
        } else {
            false
        }
    }

    /// Summary line for the header, e.g. "6 rules configured"
    pub fn rules_summary(&self) -> String {
        match self.rules.len() {
            1 => "1 rule configured".to_string(),
            n => format!("{} rules configured", n),
        }
    }
}
