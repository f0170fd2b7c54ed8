//! Status snapshots pushed by the navigation engine.

use serde::{Deserialize, Serialize};

use crate::geo::Location;

/// Engine's view of how the vehicle relates to the active route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// No usable route state.
    #[default]
    Invalid,
    /// Route set, no position matched yet.
    Initialized,
    /// Following the route.
    Tracking,
    /// Destination of the current leg reached.
    Complete,
    /// Deviated from the route.
    OffRoute,
    /// Matching is unreliable (e.g. right after a route change).
    Uncertain,
}

/// A voice instruction attached to a step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpokenInstruction {
    /// Plain text announcement.
    pub text: String,
    /// SSML variant, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssml: Option<String>,
    /// Meters before the maneuver at which to announce.
    pub distance_along_step: f64,
}

/// A banner instruction attached to a step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualInstruction {
    /// Primary banner text.
    pub primary_text: String,
    /// Secondary banner text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_text: Option<String>,
    /// Meters before the maneuver at which to show the banner.
    pub distance_along_step: f64,
}

/// One status update from the engine.
///
/// Leg/step indices and remaining values are computed by the engine; the
/// navigator takes them as given.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStatus {
    /// Route-following state.
    pub route_state: RouteState,
    /// Active leg.
    pub leg_index: usize,
    /// Active step within the leg.
    pub step_index: usize,
    /// Meters left on the route.
    pub distance_remaining: f64,
    /// Seconds left on the route.
    pub duration_remaining: f64,
    /// Meters travelled on the route.
    pub distance_traveled: f64,
    /// Raw location the status was computed from.
    pub location: Location,
    /// Location snapped to the road network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_matched_location: Option<Location>,
    /// Current road name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_name: Option<String>,
    /// Posted speed limit in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_limit_kph: Option<f64>,
    /// Voice instruction currently due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoken_instruction: Option<SpokenInstruction>,
    /// Banner instruction currently due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_instruction: Option<VisualInstruction>,
    /// Whether the engine is running on fallback (offline) data.
    #[serde(default)]
    pub is_fallback: bool,
}

/// Map-matching snapshot republished from every drained status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMatchingState {
    /// Raw location.
    pub location: Location,
    /// Road-snapped location, falling back to the raw one.
    pub map_matched_location: Location,
    /// Current road name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_name: Option<String>,
    /// Posted speed limit in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_limit_kph: Option<f64>,
    /// Whether the engine is on fallback data.
    pub is_fallback: bool,
}

impl MapMatchingState {
    /// Extract the map-matching view of a status.
    pub fn from_status(status: &NavigationStatus) -> Self {
        Self {
            location: status.location.clone(),
            map_matched_location: status
                .map_matched_location
                .clone()
                .unwrap_or_else(|| status.location.clone()),
            road_name: status.road_name.clone(),
            speed_limit_kph: status.speed_limit_kph,
            is_fallback: status.is_fallback,
        }
    }
}
