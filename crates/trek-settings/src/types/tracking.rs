//! Progress tracking and rerouting settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// What happens after arriving at an intermediate waypoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegAdvancePolicy {
    /// Move on to the next leg immediately.
    #[default]
    Automatic,
    /// Ask the host for approval before moving on.
    Manual,
}

impl FromStr for LegAdvancePolicy {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "automatic" | "auto" => Ok(Self::Automatic),
            "manual" => Ok(Self::Manual),
            other => Err(SettingsError::InvalidValue(format!("legAdvance: {other}"))),
        }
    }
}

impl fmt::Display for LegAdvancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Progress tracker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    /// Leg advance policy after waypoint arrival.
    pub leg_advance: LegAdvancePolicy,
    /// Arrival is only detected once this many steps (or fewer) remain in the leg.
    pub arrival_step_threshold: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            leg_advance: LegAdvancePolicy::Automatic,
            arrival_step_threshold: 2,
        }
    }
}

/// Reroute pipeline settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RerouteSettings {
    /// Whether rerouting is enabled for routes fetched from the directions service.
    pub enabled: bool,
}

impl Default for RerouteSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}
