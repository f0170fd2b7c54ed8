//! # trek-runtime
//!
//! Navigation session orchestration on top of an external engine.
//!
//! - **Navigator**: trip state machine, command entry point and publishers
//! - **Coordinator**: route mutations with stale-result discarding
//! - **Dispatcher**: one drain loop over the status slot and notification queue
//! - **Tasks**: keyed cancellable background work with epoch barriers
//! - **Billing**: free-drive and guidance billing sessions
//! - **Progress**: per-status progress, instruction dedup and arrival detection
//! - **Engine**: the [`NavigationEngine`] seam the host implements
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: trek-core, trek-settings.

#![deny(unsafe_code)]

pub mod billing;
pub mod coordinator;
mod dispatcher;
pub mod engine;
pub mod errors;
pub mod navigator;
pub mod notifications;
pub mod progress;
pub mod publishers;
pub mod slot;
mod state;
pub mod tasks;

#[cfg(test)]
mod testutil;

pub use billing::{BillingRestartPolicy, BillingSession, ThresholdRestartPolicy};
pub use engine::{NativeAlternative, NavigationEngine, SetRoutesOutcome, SetRoutesRequest};
pub use errors::EngineError;
pub use navigator::{Navigator, NavigatorBuilder};
pub use notifications::{Notification, NotificationKind, NotificationSink};
pub use progress::LegAdvanceApproval;
