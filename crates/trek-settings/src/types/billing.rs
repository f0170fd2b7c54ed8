//! Billing session settings.

use serde::{Deserialize, Serialize};

/// Thresholds for the configurable billing restart policy.
///
/// Both thresholds are unset by default, in which case continuing active
/// guidance never starts a new billing session. When set, a new session is
/// started if the route is at least `restart_min_distance_meters` long or
/// has at least `restart_min_remaining_waypoints` stops ahead.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingSettings {
    /// Minimum route distance that warrants a new session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_min_distance_meters: Option<f64>,
    /// Minimum remaining waypoint count that warrants a new session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_min_remaining_waypoints: Option<usize>,
}

impl BillingSettings {
    /// Whether any restart threshold is configured.
    pub fn has_thresholds(&self) -> bool {
        self.restart_min_distance_meters.is_some() || self.restart_min_remaining_waypoints.is_some()
    }
}
