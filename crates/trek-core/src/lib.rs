//! # trek-core
//!
//! Domain vocabulary for the trek navigation-session orchestrator.
//!
//! - **Branded IDs**: [`ids::BillingSessionId`], [`ids::RouteId`] as newtypes
//! - **Geo**: [`geo::Coordinate`], [`geo::Location`], [`geo::Heading`]
//! - **Routes**: immutable [`routes::NavigationRoutes`] snapshots and their parts
//! - **Progress**: [`progress::RouteProgress`] derived from a snapshot plus indices
//! - **Session**: the [`session::Session`] trip state machine value
//! - **Status**: [`status::NavigationStatus`] pushed by the engine
//! - **Events**: one closed enum per event family in [`events`]
//! - **Errors**: [`errors::NavigatorError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Foundation crate. No async, no IO. Depended on by trek-settings and
//! trek-runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod geo;
pub mod horizon;
pub mod ids;
pub mod logging;
pub mod progress;
pub mod routes;
pub mod session;
pub mod status;

pub use errors::NavigatorError;
pub use ids::{BillingSessionId, RouteId};
pub use progress::RouteProgress;
pub use routes::{AlternativeRoute, AlternativeSelector, NavigationRoutes, Route, SetRouteReason};
pub use session::{FreeDriveState, Session};
pub use status::{NavigationStatus, RouteState};
