//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`NavigatorSettings::default()`]
//! 2. If `~/.trek/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TREK_*` environment variable overrides (highest priority)
//! 4. [`NavigatorSettings::validate`]

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LegAdvancePolicy, NavigatorSettings};

/// Resolve the path to the settings file (`~/.trek/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".trek").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<NavigatorSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<NavigatorSettings> {
    let defaults = serde_json::to_value(NavigatorSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: NavigatorSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`, and
/// `null` in `source` keeps the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut NavigatorSettings) {
    if let Some(v) = read_env_string("TREK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("TREK_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = read_env_string("TREK_LEG_ADVANCE") {
        match v.parse::<LegAdvancePolicy>() {
            Ok(policy) => settings.tracker.leg_advance = policy,
            Err(e) => tracing::warn!(error = %e, "invalid TREK_LEG_ADVANCE, ignoring"),
        }
    }
    if let Some(v) = read_env_usize("TREK_EVENT_CAPACITY", 1, 65_536) {
        settings.channels.event_capacity = v;
    }
    if let Some(v) = read_env_bool("TREK_REROUTE_ENABLED") {
        settings.reroute.enabled = v;
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_nested_objects() {
        let merged = deep_merge(
            json!({"tracker": {"legAdvance": "automatic", "arrivalStepThreshold": 2}}),
            json!({"tracker": {"legAdvance": "manual"}}),
        );
        assert_eq!(merged["tracker"]["legAdvance"], "manual");
        assert_eq!(merged["tracker"]["arrivalStepThreshold"], 2);
    }

    #[test]
    fn deep_merge_null_keeps_target() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null, "b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let merged = deep_merge(json!({"a": [1, 2]}), json!({"a": [3]}));
        assert_eq!(merged["a"], json!([3]));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let s = load_settings_from_path(Path::new("/nonexistent/trek.json")).unwrap();
        assert_eq!(s.channels.event_capacity, 256);
    }

    #[test]
    fn file_values_are_merged_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"tracker": {"legAdvance": "manual"}, "channels": {"eventCapacity": 0}}"#,
        )
        .unwrap();

        let s = load_settings_from_path(&path).unwrap();
        assert_eq!(s.tracker.leg_advance, LegAdvancePolicy::Manual);
        assert_eq!(s.tracker.arrival_step_threshold, 2);
        assert_eq!(s.channels.event_capacity, 1, "validate corrected 0");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_usize_range_bounds() {
        assert_eq!(parse_usize_range("10", 1, 10), Some(10));
        assert_eq!(parse_usize_range("0", 1, 10), None);
        assert_eq!(parse_usize_range("x", 1, 10), None);
    }
}
