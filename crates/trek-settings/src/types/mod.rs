//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the fields it changes.

mod billing;
mod horizon;
mod tracking;

pub use billing::*;
pub use horizon::*;
pub use tracking::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the navigator.
///
/// ```json
/// {
///   "tracker": { "legAdvance": "manual" },
///   "billing": { "restartMinDistanceMeters": 100000 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigatorSettings {
    /// Settings schema version.
    pub version: String,
    /// Progress tracker settings.
    pub tracker: TrackerSettings,
    /// Billing restart thresholds.
    pub billing: BillingSettings,
    /// Event channel sizing.
    pub channels: ChannelSettings,
    /// Electronic horizon defaults.
    pub electronic_horizon: ElectronicHorizonSettings,
    /// Reroute pipeline settings.
    pub reroute: RerouteSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            tracker: TrackerSettings::default(),
            billing: BillingSettings::default(),
            channels: ChannelSettings::default(),
            electronic_horizon: ElectronicHorizonSettings::default(),
            reroute: RerouteSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl NavigatorSettings {
    /// Correct out-of-range values.
    ///
    /// Called automatically during loading. Invalid values are replaced with
    /// a warning rather than rejected.
    pub fn validate(&mut self) {
        if self.channels.event_capacity == 0 {
            tracing::warn!("channels.eventCapacity is 0, using 1");
            self.channels.event_capacity = 1;
        }
        if self.electronic_horizon.length_meters <= 0.0 {
            let fallback = ElectronicHorizonSettings::default().length_meters;
            tracing::warn!(
                length = self.electronic_horizon.length_meters,
                fallback,
                "electronicHorizon.lengthMeters must be positive"
            );
            self.electronic_horizon.length_meters = fallback;
        }
        if let Some(distance) = self.billing.restart_min_distance_meters {
            if distance < 0.0 {
                tracing::warn!(distance, "billing.restartMinDistanceMeters is negative, ignoring");
                self.billing.restart_min_distance_meters = None;
            }
        }
    }
}

/// Broadcast channel sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Capacity of each event channel before slow subscribers lag.
    pub event_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            event_capacity: 256,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl LoggingSettings {
    /// Install the global `tracing` subscriber these settings describe.
    ///
    /// `RUST_LOG` still wins over `level`. Only the first call has an effect.
    pub fn init_subscriber(&self) {
        if self.json {
            trek_core::logging::init_json_subscriber(&self.level);
        } else {
            trek_core::logging::init_subscriber(&self.level);
        }
    }
}
