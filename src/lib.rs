// CleanSweep - sorts new files in a watched folder into per-type subfolders
//
// This is the library crate containing the organizing engine and its data structures.
// The binary crate (main.rs) hosts the engine as a background process.

pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{EngineConfig, SettingsStore};
pub use engine::{OrganizerEngine, ScanTrigger};
pub use models::{AppSettings, EngineState, FileMoveRecord, OrganizingRule, RuleSet};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
