//! Persisted settings and engine tunables.
//!
//! - [`SettingsStore`]: durable load/save/validate/backup of [`AppSettings`](crate::models::AppSettings)
//! - [`EngineConfig`]: debounce, status and history tunables layered with the `config` crate

pub mod engine_config;
pub mod settings_store;

pub use engine_config::{ENGINE_CONFIG_FILE_NAME, EngineConfig, EngineConfigError};
pub use settings_store::{SETTINGS_FILE_NAME, SettingsError, SettingsStore};
