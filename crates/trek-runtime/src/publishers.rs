//! Outbound channels.
//!
//! Two flavours:
//! - [`SnapshotChannel`]: replay-latest state over `tokio::sync::watch`.
//!   Late subscribers see the current value immediately.
//! - [`EventChannel`]: one-shot events over `tokio::sync::broadcast`.
//!   Non-blocking; slow receivers lag rather than stall the navigator.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use trek_core::events::{
    AlternativesStatus, ElectronicHorizonEvent, FallbackToTilesState, FasterRoutesStatus,
    RefreshingStatus, ReroutingStatus, SpokenInstructionState, VisualInstructionState,
    WaypointArrivalStatus,
};
use trek_core::status::MapMatchingState;
use trek_core::{NavigationRoutes, NavigatorError, RouteProgress, Session};

/// Replay-latest state channel.
pub struct SnapshotChannel<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> SnapshotChannel<T> {
    /// Channel holding `initial`.
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the current value and notify subscribers.
    ///
    /// Works with no subscribers; the value is kept for later ones.
    pub fn publish(&self, value: T) {
        let _ = self.tx.send_replace(value);
    }

    /// Clone of the current value.
    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Receiver that starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// One-shot multicast event channel.
pub struct EventChannel<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> EventChannel<T> {
    /// Channel buffering up to `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit to all current subscribers. Returns how many received it.
    pub fn emit(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Receiver for events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }
}

/// Every channel the navigator publishes on.
pub struct Publishers {
    /// Current trip state.
    pub session: SnapshotChannel<Session>,
    /// Current routes, `None` outside active guidance.
    pub routes: SnapshotChannel<Option<Arc<NavigationRoutes>>>,
    /// Current progress, `None` without routes.
    pub route_progress: SnapshotChannel<Option<RouteProgress>>,
    /// Latest map-matching result.
    pub map_matching: SnapshotChannel<Option<MapMatchingState>>,
    /// Voice instructions.
    pub spoken_instructions: EventChannel<SpokenInstructionState>,
    /// Banner instructions.
    pub visual_instructions: EventChannel<VisualInstructionState>,
    /// Arrival and leg changes.
    pub waypoint_arrival: EventChannel<WaypointArrivalStatus>,
    /// Reroute lifecycle.
    pub rerouting: EventChannel<ReroutingStatus>,
    /// Alternatives updates.
    pub alternatives: EventChannel<AlternativesStatus>,
    /// Faster route lifecycle.
    pub faster_routes: EventChannel<FasterRoutesStatus>,
    /// Route refresh outcomes.
    pub refreshing: EventChannel<RefreshingStatus>,
    /// Online/offline tile switches.
    pub fallback_to_tiles: EventChannel<FallbackToTilesState>,
    /// Electronic horizon updates.
    pub electronic_horizon: EventChannel<ElectronicHorizonEvent>,
    /// Non-fatal errors.
    pub errors: EventChannel<NavigatorError>,
}

impl Publishers {
    /// All channels at their initial values, events sized to `event_capacity`.
    pub fn new(event_capacity: usize) -> Self {
        Self {
            session: SnapshotChannel::new(Session::Idle),
            routes: SnapshotChannel::new(None),
            route_progress: SnapshotChannel::new(None),
            map_matching: SnapshotChannel::new(None),
            spoken_instructions: EventChannel::with_capacity(event_capacity),
            visual_instructions: EventChannel::with_capacity(event_capacity),
            waypoint_arrival: EventChannel::with_capacity(event_capacity),
            rerouting: EventChannel::with_capacity(event_capacity),
            alternatives: EventChannel::with_capacity(event_capacity),
            faster_routes: EventChannel::with_capacity(event_capacity),
            refreshing: EventChannel::with_capacity(event_capacity),
            fallback_to_tiles: EventChannel::with_capacity(event_capacity),
            electronic_horizon: EventChannel::with_capacity(event_capacity),
            errors: EventChannel::with_capacity(event_capacity),
        }
    }
}
