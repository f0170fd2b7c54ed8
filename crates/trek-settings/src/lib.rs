//! # trek-settings
//!
//! Configuration with layered sources for the trek navigator.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`NavigatorSettings::default()`]
//! 2. **User file**: `~/.trek/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TREK_*` overrides (highest priority)
//!
//! The global cache is reloadable: [`reload_settings_from_path`] swaps the
//! cached value so later [`get_settings`] calls see the new data. Callers
//! holding an earlier `Arc` keep a consistent snapshot.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

static SETTINGS: RwLock<Option<Arc<NavigatorSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// The first call loads from `~/.trek/settings.json` with env overrides,
/// falling back to compiled defaults if loading fails.
pub fn get_settings() -> Arc<NavigatorSettings> {
    if let Some(s) = SETTINGS.read().as_ref() {
        return Arc::clone(s);
    }

    let mut guard = SETTINGS.write();
    if let Some(s) = guard.as_ref() {
        return Arc::clone(s);
    }

    let settings = Arc::new(load_settings().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load settings, using defaults");
        NavigatorSettings::default()
    }));
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Replace the global settings with a specific value.
pub fn init_settings(settings: NavigatorSettings) {
    *SETTINGS.write() = Some(Arc::new(settings));
}

/// Reload settings from a file and swap the global cache.
///
/// On failure the cache is reset to compiled defaults.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(load_settings_from_path(path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
        NavigatorSettings::default()
    }));
    *SETTINGS.write() = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

/// Install the global `tracing` subscriber from the current logging settings.
///
/// Hosts call this once at startup, after any [`init_settings`]. Embedders
/// that already own a subscriber skip it.
pub fn init_logging() {
    get_settings().logging.init_subscriber();
}

#[cfg(test)]
pub(crate) fn reset_settings() {
    *SETTINGS.write() = None;
}
