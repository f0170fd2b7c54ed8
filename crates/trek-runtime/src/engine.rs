//! The external route-computation and positioning engine.
//!
//! The navigator never computes geometry itself. Everything it knows about
//! the vehicle's position comes back from the engine as statuses and
//! notifications pushed into the [`NotificationSink`] handed over by
//! [`NavigationEngine::subscribe`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trek_core::geo::{Heading, Location};
use trek_core::horizon::ElectronicHorizonConfig;
use trek_core::routes::Route;
use trek_core::{BillingSessionId, NavigationRoutes, SetRouteReason};

use crate::errors::EngineError;
use crate::notifications::NotificationSink;

/// Engine-level reason code sent with every set-routes call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteChangeCode {
    /// Fresh route.
    NewRoute,
    /// Reroute after deviation.
    Reroute,
    /// Alternative promoted.
    Alternative,
    /// Faster route applied.
    FasterRoute,
    /// Switched to an offline route.
    FallbackToOffline,
    /// Switched back to an online route.
    RestoreToOnline,
}

impl From<SetRouteReason> for RouteChangeCode {
    fn from(reason: SetRouteReason) -> Self {
        match reason {
            SetRouteReason::NewRoute => Self::NewRoute,
            SetRouteReason::Reroute => Self::Reroute,
            SetRouteReason::Alternatives => Self::Alternative,
            SetRouteReason::FasterRoute => Self::FasterRoute,
            SetRouteReason::FallbackToOffline => Self::FallbackToOffline,
            SetRouteReason::RestoreToOnline => Self::RestoreToOnline,
        }
    }
}

/// Arguments of [`NavigationEngine::set_routes`].
#[derive(Clone, Debug)]
pub struct SetRoutesRequest {
    /// Snapshot to navigate.
    pub routes: Arc<NavigationRoutes>,
    /// Billing session the routes are charged to.
    pub session_id: BillingSessionId,
    /// Leg to start on.
    pub leg_index: usize,
    /// Why the routes changed.
    pub reason: RouteChangeCode,
}

/// An alternative as the engine reports it, before deltas are computed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeAlternative {
    /// Engine-assigned alternative id.
    pub id: u32,
    /// The alternative route.
    pub route: Route,
}

/// Successful result of [`NavigationEngine::set_routes`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetRoutesOutcome {
    /// Alternatives the engine accepted alongside the main route.
    pub alternatives: Vec<NativeAlternative>,
}

/// Positioning and route-following engine.
///
/// `set_routes` and `unset_routes` are the only calls the navigator awaits;
/// everything else is fire-and-forget.
#[async_trait]
pub trait NavigationEngine: Send + Sync {
    /// Replace the routes being followed.
    async fn set_routes(&self, request: SetRoutesRequest) -> Result<SetRoutesOutcome, EngineError>;

    /// Drop all routes charged to `session_id`.
    async fn unset_routes(&self, session_id: &BillingSessionId) -> Result<(), EngineError>;

    /// Move guidance to `leg_index`. Returns whether the engine accepted it.
    async fn update_route_leg(&self, leg_index: usize) -> bool;

    /// Stop producing statuses.
    fn pause(&self);

    /// Resume producing statuses.
    fn resume(&self);

    /// Feed a raw location fix.
    fn update_location(&self, location: Location);

    /// Feed a compass heading.
    fn update_heading(&self, heading: Heading);

    /// Enable or disable the engine's own reroute detection.
    fn set_rerouting_enabled(&self, enabled: bool);

    /// Start producing electronic horizon notifications.
    fn start_updating_electronic_horizon(&self, config: ElectronicHorizonConfig);

    /// Stop producing electronic horizon notifications.
    fn stop_updating_electronic_horizon(&self);

    /// Register the single notification sink. Called once at construction.
    fn subscribe(&self, sink: NotificationSink);
}
