//! Caller-visible navigator errors.
//!
//! Every variant is delivered on the error channel and returned from the
//! command that produced it. None of them leaves the navigator unusable;
//! the last good snapshots stay published.

use serde::{Deserialize, Serialize};

/// Errors surfaced by navigator commands and notifications.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "reason", rename_all = "snake_case")]
pub enum NavigatorError {
    /// `pause_free_drive` outside of an active, billed free drive.
    #[error("Failed to pause free drive")]
    FailedToPause,

    /// `set_to_idle` while already idle.
    #[error("Failed to set navigator to idle")]
    FailedToSetToIdle,

    /// The engine rejected the routes, or no billing session was available.
    #[error("Failed to set route{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    FailedToSetRoute(Option<String>),

    /// The engine refused to advance to the requested leg.
    #[error("Failed to select route leg")]
    FailedToSelectRouteLeg,

    /// Alternative index/id out of range, or not in active guidance.
    #[error("Failed to select alternative route")]
    FailedToSelectAlternativeRoute,

    /// The engine failed to compute alternatives.
    #[error("Failed to update alternative routes: {0}")]
    FailedToUpdateAlternativeRoutes(String),

    /// A status arrived while the navigator was idle.
    #[error("Unexpected navigation status while idle")]
    UnexpectedNavigationStatus,

    /// A reroute was cancelled or failed.
    #[error("Reroute interrupted{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    InterruptedReroute(Option<String>),
}

impl NavigatorError {
    /// Error category string for logs and analytics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::FailedToPause | Self::FailedToSetToIdle => "invalid_mode",
            Self::FailedToSetRoute(_)
            | Self::FailedToSelectRouteLeg
            | Self::FailedToUpdateAlternativeRoutes(_) => "engine",
            Self::FailedToSelectAlternativeRoute => "validation",
            Self::UnexpectedNavigationStatus | Self::InterruptedReroute(_) => "notification",
        }
    }
}
