//! Inbound engine notifications.
//!
//! The engine pushes into a [`NotificationSink`] it receives once at
//! construction. Statuses go through a latest-value slot; everything else is
//! a [`Notification`] on an unbounded FIFO. Neither path blocks the engine.

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use trek_core::routes::Route;
use trek_core::{NavigationRoutes, NavigationStatus, RouteId};

use crate::coordinator::convert_alternatives;
use crate::engine::NativeAlternative;
use crate::slot::SlotSender;

/// Every notification kind besides status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Engine switched to an offline route. Payload: [`RoutesPayload`].
    FallbackToOffline,
    /// Engine switched back to online data. Payload: [`RoutesPayload`].
    RestoreToOnline,
    /// Engine proposes the online version of an offline route. Payload: [`RoutesPayload`].
    SwitchToOnlineRoute,
    /// Alternatives list changed. Payload: [`AlternativesPayload`].
    AlternativeRoutesChanged,
    /// Alternatives could not be computed. Payload: [`FailurePayload`].
    AlternativeRoutesFailed,
    /// Main route annotations were refreshed. Payload: [`RouteRefreshPayload`].
    RouteRefreshed,
    /// Route refresh failed. Payload: [`FailurePayload`].
    RouteRefreshFailed,
    /// Deviation detected, reroute requested. No payload.
    RerouteDetected,
    /// Reroute produced new routes. Payload: [`RoutesPayload`].
    RerouteFetched,
    /// Reroute was cancelled. Payload: [`FailurePayload`].
    RerouteCancelled,
    /// Reroute failed. Payload: [`FailurePayload`].
    RerouteFailed,
    /// A faster route is available. Payload: [`RoutesPayload`].
    FasterRouteDetected,
    /// Horizon position changed. Payload: [`trek_core::horizon::HorizonPosition`].
    HorizonPositionUpdated,
    /// Road object entered. Payload: [`RoadObjectPayload`].
    HorizonRoadObjectEntered,
    /// Road object exited. Payload: [`RoadObjectPayload`].
    HorizonRoadObjectExited,
    /// Road object passed. Payload: [`RoadObjectPayload`].
    HorizonRoadObjectPassed,
}

impl NotificationKind {
    /// Snake-case name, used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FallbackToOffline => "fallback_to_offline",
            Self::RestoreToOnline => "restore_to_online",
            Self::SwitchToOnlineRoute => "switch_to_online_route",
            Self::AlternativeRoutesChanged => "alternative_routes_changed",
            Self::AlternativeRoutesFailed => "alternative_routes_failed",
            Self::RouteRefreshed => "route_refreshed",
            Self::RouteRefreshFailed => "route_refresh_failed",
            Self::RerouteDetected => "reroute_detected",
            Self::RerouteFetched => "reroute_fetched",
            Self::RerouteCancelled => "reroute_cancelled",
            Self::RerouteFailed => "reroute_failed",
            Self::FasterRouteDetected => "faster_route_detected",
            Self::HorizonPositionUpdated => "horizon_position_updated",
            Self::HorizonRoadObjectEntered => "horizon_road_object_entered",
            Self::HorizonRoadObjectExited => "horizon_road_object_exited",
            Self::HorizonRoadObjectPassed => "horizon_road_object_passed",
        }
    }
}

/// A non-status notification with its raw payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened.
    pub kind: NotificationKind,
    /// Kind-specific payload, decoded by the dispatcher.
    #[serde(default)]
    pub payload: Value,
}

impl Notification {
    /// Notification with a payload.
    pub fn new(kind: NotificationKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Notification without a payload.
    pub fn bare(kind: NotificationKind) -> Self {
        Self::new(kind, Value::Null)
    }
}

/// Routes proposed or applied by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesPayload {
    /// New main route.
    pub main_route: Route,
    /// Alternatives alongside it.
    #[serde(default)]
    pub alternatives: Vec<NativeAlternative>,
    /// Leg to continue on.
    #[serde(default)]
    pub leg_index: usize,
}

impl RoutesPayload {
    /// Snapshot with alternatives measured against the main route.
    pub fn into_routes(self) -> (NavigationRoutes, usize) {
        let alternatives = convert_alternatives(&self.main_route, self.alternatives);
        (NavigationRoutes::new(self.main_route, alternatives), self.leg_index)
    }
}

/// Replacement alternatives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativesPayload {
    /// Alternatives in engine order.
    pub alternatives: Vec<NativeAlternative>,
}

/// Refreshed main route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRefreshPayload {
    /// The refreshed route; its id must match the current main route.
    pub route: Route,
}

/// Failure details shared by the failure/cancel notifications.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePayload {
    /// Route concerned, if any.
    #[serde(default)]
    pub route_id: Option<RouteId>,
    /// Engine-supplied message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Road object identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadObjectPayload {
    /// Road object identifier.
    pub object_id: String,
}

/// Where the engine pushes statuses and notifications.
#[derive(Clone)]
pub struct NotificationSink {
    status: SlotSender<NavigationStatus>,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl NotificationSink {
    pub(crate) fn new(
        status: SlotSender<NavigationStatus>,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self {
            status,
            notifications,
        }
    }

    /// Push a status. Replaces any status the drain loop has not picked up.
    pub fn push_status(&self, status: NavigationStatus) {
        if self.status.send(status).is_some() {
            counter!("navigator_statuses_dropped").increment(1);
            trace!("status replaced before it was drained");
        }
    }

    /// Push a notification.
    pub fn push(&self, notification: Notification) {
        if let Err(err) = self.notifications.send(notification) {
            debug!(kind = err.0.kind.as_str(), "dispatcher stopped, dropping notification");
        }
    }

    /// Push a notification built from `kind` and `payload`.
    pub fn notify(&self, kind: NotificationKind, payload: Value) {
        self.push(Notification::new(kind, payload));
    }

    /// Whether the status drain loop is parked waiting.
    pub fn is_status_loop_waiting(&self) -> bool {
        self.status.is_receiver_waiting()
    }

    /// Statuses replaced before the drain loop saw them.
    pub fn dropped_status_count(&self) -> u64 {
        self.status.overwritten_count()
    }
}
