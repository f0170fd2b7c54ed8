//! Runtime error types.

use thiserror::Error;

/// Failure reported by the [`NavigationEngine`](crate::engine::NavigationEngine).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine refused the request.
    #[error("engine rejected request: {0}")]
    Rejected(String),

    /// The engine went away before answering.
    #[error("engine unavailable")]
    Unavailable,
}

impl EngineError {
    /// Short machine-readable category for logs and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::Unavailable => "unavailable",
        }
    }
}
