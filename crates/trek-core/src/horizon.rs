//! Electronic horizon types.
//!
//! The horizon graph itself is built by the engine. The navigator only
//! forwards its configuration and republishes the position/road-object
//! notifications it produces.

use serde::{Deserialize, Serialize};

/// Options for electronic horizon generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectronicHorizonConfig {
    /// Minimum length of the most probable path ahead, in meters.
    pub length_meters: f64,
    /// Number of branch levels to expand beyond the most probable path.
    pub expansion: u8,
    /// Length of each expanded branch, in meters.
    pub branch_length_meters: f64,
    /// Minimum time between horizon updates, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_time_delta_between_updates: Option<f64>,
}

/// Current position on the electronic horizon graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizonPosition {
    /// Edge the vehicle is currently on.
    pub edge_id: u64,
    /// Fraction of the edge already traversed, 0.0 to 1.0.
    pub fraction_along_edge: f64,
    /// Whether the horizon tree was rebuilt for this update.
    pub tree_rebuilt: bool,
}
