//! Electronic horizon settings.

use serde::{Deserialize, Serialize};
use trek_core::horizon::ElectronicHorizonConfig;

/// Defaults used when the host starts the electronic horizon without options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElectronicHorizonSettings {
    /// Most probable path length in meters.
    pub length_meters: f64,
    /// Branch expansion depth.
    pub expansion: u8,
    /// Branch length in meters.
    pub branch_length_meters: f64,
    /// Minimum seconds between updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_time_delta_between_updates: Option<f64>,
}

impl Default for ElectronicHorizonSettings {
    fn default() -> Self {
        Self {
            length_meters: 500.0,
            expansion: 0,
            branch_length_meters: 50.0,
            min_time_delta_between_updates: None,
        }
    }
}

impl ElectronicHorizonSettings {
    /// Engine-facing configuration.
    pub fn to_config(&self) -> ElectronicHorizonConfig {
        ElectronicHorizonConfig {
            length_meters: self.length_meters,
            expansion: self.expansion,
            branch_length_meters: self.branch_length_meters,
            min_time_delta_between_updates: self.min_time_delta_between_updates,
        }
    }
}
