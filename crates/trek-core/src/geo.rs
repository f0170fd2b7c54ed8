//! Positions and headings as reported by the platform location source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// WGS84 coordinate in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A raw or map-matched position fix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Position.
    pub coordinate: Coordinate,
    /// Course over ground in degrees, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Speed in meters per second, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Horizontal accuracy radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_accuracy: Option<f64>,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// A fix at `coordinate` stamped with the current time.
    #[must_use]
    pub fn now(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            course: None,
            speed: None,
            horizontal_accuracy: None,
            timestamp: Utc::now(),
        }
    }
}

/// Compass heading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heading {
    /// Heading relative to true north, in degrees.
    pub true_heading: f64,
    /// Maximum deviation in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
}
