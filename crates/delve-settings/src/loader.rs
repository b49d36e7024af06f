//! Settings loading: defaults → file deep-merge → env overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::DelveSettings;

/// Default settings file location: `~/.delve/settings.json`.
pub fn settings_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or(SettingsError::NoHomeDir)?;
    Ok(PathBuf::from(home).join(".delve").join("settings.json"))
}

/// Recursively merge `overlay` into `base`. Objects merge key-by-key;
/// any other value in the overlay replaces the base value.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load settings from the default path with env overrides applied.
pub fn load_settings() -> Result<DelveSettings> {
    load_settings_from_path(&settings_path()?)
}

/// Load settings from a specific file with env overrides applied.
///
/// A missing file is not an error: defaults (plus env overrides) apply.
pub fn load_settings_from_path(path: &Path) -> Result<DelveSettings> {
    let defaults = serde_json::to_value(DelveSettings::default())?;

    let merged = if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let file_value: Value = serde_json::from_str(&raw)?;
        deep_merge(defaults, file_value)
    } else {
        defaults
    };

    let mut settings: DelveSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Apply `DELVE_*` environment variable overrides (highest priority).
fn apply_env_overrides(settings: &mut DelveSettings) {
    if let Ok(base_url) = std::env::var("DELVE_BASE_URL") {
        settings.endpoints.base_url = base_url;
    }
    if let Ok(db_path) = std::env::var("DELVE_DB_PATH") {
        settings.storage.db_path = Some(PathBuf::from(db_path));
    }
    if let Ok(model) = std::env::var("DELVE_MODEL") {
        settings.client.model = Some(model);
    }
    if let Ok(level) = std::env::var("DELVE_LOG") {
        settings.logging.level = level;
    }
    if let Ok(cadence) = std::env::var("DELVE_APPROVAL_CADENCE") {
        match cadence.parse::<u32>() {
            Ok(n) => settings.approval.cadence = Some(n),
            Err(_) => tracing::warn!(value = %cadence, "ignoring non-numeric DELVE_APPROVAL_CADENCE"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
