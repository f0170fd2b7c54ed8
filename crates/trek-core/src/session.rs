//! Trip session state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::RouteState;

/// Sub-state of free drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeDriveState {
    /// Tracking the user's position.
    Active,
    /// Tracking suspended.
    Paused,
}

/// The one trip state the navigator is in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum Session {
    /// Nothing is tracked.
    #[default]
    Idle,
    /// Tracking without a committed route.
    FreeDrive(FreeDriveState),
    /// Turn-by-turn guidance along a committed route.
    ActiveGuidance(RouteState),
}

impl Session {
    /// Whether the navigator is idle.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether guidance along a route is active.
    pub fn is_active_guidance(&self) -> bool {
        matches!(self, Self::ActiveGuidance(_))
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::FreeDrive(FreeDriveState::Active) => write!(f, "free_drive(active)"),
            Self::FreeDrive(FreeDriveState::Paused) => write!(f, "free_drive(paused)"),
            Self::ActiveGuidance(state) => write!(f, "active_guidance({state:?})"),
        }
    }
}
