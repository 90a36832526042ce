//! Data models for the CleanSweep engine.
//!
//! - [`OrganizingRule`] / [`RuleSet`]: folder + extension rules, first enabled match wins
//! - [`FileMoveRecord`] / [`MoveHistory`]: bounded, most-recent-first record of completed moves
//! - [`AppSettings`]: the snapshot persisted by [`SettingsStore`](crate::config::SettingsStore)
//! - [`EngineState`]: observable in-memory state held by [`StateManager`](crate::state::StateManager)

pub mod app_state;
pub mod history;
pub mod rule;
pub mod settings;

pub use app_state::{EngineState, StatusMessage};
pub use history::{FileMoveRecord, MAX_RECENT_MOVES, MoveHistory};
pub use rule::{OrganizingRule, RuleError, RuleSet, normalize_extension, validate_folder_name};
pub use settings::AppSettings;
