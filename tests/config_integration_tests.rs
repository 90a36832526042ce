//! Integration tests for SettingsStore and EngineConfig
//!
//! These tests verify:
//! - Settings save/load round-trips
//! - Backup-then-write persistence
//! - Validation leaves the previous file untouched
//! - Engine tunables from `engine.yaml`

use cleansweep::config::{ENGINE_CONFIG_FILE_NAME, SettingsError};
use cleansweep::{AppSettings, EngineConfig, OrganizingRule, RuleSet, SettingsStore};
use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;

fn create_test_settings_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let settings_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, settings_path)
}

#[test]
fn test_missing_settings_is_first_launch() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let store = SettingsStore::new(&dir);

    assert!(store.load().unwrap().is_none());
    assert!(store.load_backup().unwrap().is_none());
}

#[test]
fn test_save_and_load_round_trip() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let store = SettingsStore::new(&dir);

    let rules = RuleSet::defaults().to_vec();
    let settings = AppSettings::new(rules.clone(), "/home/user/Downloads", false);
    store.save(&settings).unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.rules, rules);
    assert_eq!(loaded.watched_folder_path, Utf8PathBuf::from("/home/user/Downloads"));
    assert!(!loaded.is_first_run);
}

#[test]
fn test_second_save_keeps_backup_of_first() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let store = SettingsStore::new(&dir);

    let first = AppSettings::new(vec![OrganizingRule::new("Docs", [".pdf"])], "/a", false);
    let second = AppSettings::new(vec![OrganizingRule::new("Music", [".mp3"])], "/b", false);

    store.save(&first).unwrap();
    assert!(!store.backup_path().exists());

    store.save(&second).unwrap();
    let backup = store.load_backup().unwrap().unwrap();
    assert_eq!(backup.rules[0].folder_name, "Docs");
    assert_eq!(store.load().unwrap().unwrap().rules[0].folder_name, "Music");
}

#[test]
fn test_invalid_rules_leave_previous_file_unchanged() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let store = SettingsStore::new(&dir);

    let good = AppSettings::new(vec![OrganizingRule::new("Docs", [".pdf"])], "/a", false);
    store.save(&good).unwrap();
    let before = fs::read_to_string(store.settings_path()).unwrap();

    let mut empty_name = good.clone();
    empty_name.rules[0].folder_name = String::new();
    assert!(matches!(
        store.save(&empty_name),
        Err(SettingsError::InvalidSettings(_))
    ));

    let mut bad_extension = good.clone();
    bad_extension.rules[0].extensions.insert("pdf".to_string());
    assert!(matches!(
        store.save(&bad_extension),
        Err(SettingsError::InvalidSettings(_))
    ));

    assert_eq!(fs::read_to_string(store.settings_path()).unwrap(), before);
    assert!(!store.backup_path().exists());
}

#[test]
fn test_corrupt_settings_is_decode_error() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let store = SettingsStore::new(&dir);
    fs::write(store.settings_path(), "rules: {{{").unwrap();

    assert!(matches!(store.load(), Err(SettingsError::InvalidData { .. })));
}

#[test]
fn test_clear_removes_primary_only() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let store = SettingsStore::new(&dir);
    let settings = AppSettings::new(Vec::new(), "/a", true);

    store.save(&settings).unwrap();
    store.save(&settings).unwrap();
    store.clear().unwrap();

    assert!(!store.settings_path().exists());
    assert!(store.backup_path().exists());
    // Clearing again is fine
    store.clear().unwrap();
}

#[test]
fn test_settings_directory_created_on_save() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let nested = dir.join("CleanSweep");
    let store = SettingsStore::new(&nested);

    store.save(&AppSettings::new(Vec::new(), "/a", true)).unwrap();
    assert!(nested.is_dir());
    assert!(store.settings_path().exists());
}

#[test]
fn test_engine_config_defaults_without_file() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let config = EngineConfig::load(Some(dir.as_path())).unwrap();

    assert_eq!(config.debounce_ms, 500);
    assert_eq!(config.status_duration_ms, 5000);
    assert_eq!(config.first_run_grace_ms, 1000);
    assert!(config.rescan_on_rule_add);
    assert_eq!(config.history_capacity, 10);
}

#[test]
fn test_engine_config_rejects_bad_values() {
    let (_temp_dir, dir) = create_test_settings_dir();
    fs::write(dir.join(ENGINE_CONFIG_FILE_NAME), "debounce_ms: soon\n").unwrap();

    assert!(EngineConfig::load(Some(dir.as_path())).is_err());
}

#[test]
fn test_engine_config_lives_beside_settings() {
    let (_temp_dir, dir) = create_test_settings_dir();
    let store = SettingsStore::new(&dir);
    fs::write(
        store.settings_dir().join(ENGINE_CONFIG_FILE_NAME),
        "status_duration_ms: 1500\n",
    )
    .unwrap();

    let config = EngineConfig::load(Some(store.settings_dir())).unwrap();
    assert_eq!(config.status_duration_ms, 1500);
    assert_eq!(config.debounce_ms, 500);
}
