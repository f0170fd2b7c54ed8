//! Event families published by the navigator.
//!
//! Each family is a closed type delivered on its own one-shot multicast
//! channel. None of them are replayed to late subscribers; the replayable
//! state lives in the snapshot channels (session, routes, progress, map
//! matching).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::horizon::HorizonPosition;
use crate::ids::RouteId;
use crate::routes::{AlternativeRoute, NavigationRoutes, Waypoint};
use crate::status::{SpokenInstruction, VisualInstruction};

/// A voice instruction became due.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpokenInstructionState {
    /// The instruction to announce.
    pub spoken_instruction: SpokenInstruction,
}

/// A banner instruction became due.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualInstructionState {
    /// The instruction to display.
    pub visual_instruction: VisualInstruction,
}

/// Arrival and leg-change events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaypointArrivalStatus {
    /// The last leg's destination was reached.
    ToFinalDestination {
        /// The final destination.
        destination: Waypoint,
    },
    /// An intermediate waypoint was reached.
    ToWaypoint {
        /// The waypoint reached.
        waypoint: Waypoint,
        /// Leg that ended at this waypoint.
        leg_index: usize,
    },
    /// Guidance moved on to a new leg.
    NextLegStarted {
        /// The leg now being travelled.
        new_leg_index: usize,
    },
}

/// Reroute lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReroutingStatus {
    /// Deviation detected, a new route is being requested.
    Started,
    /// A new route was fetched and applied.
    Fetched {
        /// The applied snapshot.
        routes: Arc<NavigationRoutes>,
    },
    /// The reroute was cancelled or failed.
    Interrupted {
        /// Engine-supplied reason, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Alternative-route updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlternativesStatus {
    /// The alternatives list was replaced.
    Updated {
        /// The new alternatives.
        alternatives: Vec<AlternativeRoute>,
    },
}

/// Faster-route lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FasterRoutesStatus {
    /// A faster route was proposed by the engine.
    Detected {
        /// The proposed snapshot.
        routes: Arc<NavigationRoutes>,
    },
    /// The faster route was applied.
    Applied {
        /// The applied snapshot.
        routes: Arc<NavigationRoutes>,
    },
}

/// Route refresh outcomes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefreshingStatus {
    /// Traffic/annotations of the main route were refreshed.
    Refreshed {
        /// The refreshed route.
        route_id: RouteId,
    },
    /// The refresh failed. Routes are unchanged.
    Failed {
        /// Route the refresh was for, if reported.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        route_id: Option<RouteId>,
        /// Engine-supplied reason.
        reason: String,
    },
}

/// Which tile set the engine is routing on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackToTilesState {
    /// `false` after falling back to offline data, `true` once online again.
    pub using_latest_tiles: bool,
}

/// Electronic horizon notifications.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElectronicHorizonEvent {
    /// Position on the horizon graph changed.
    PositionUpdated {
        /// New position.
        position: HorizonPosition,
    },
    /// Entered a road object (tunnel, toll zone, ...).
    RoadObjectEntered {
        /// Road object identifier.
        object_id: String,
    },
    /// Left a road object.
    RoadObjectExited {
        /// Road object identifier.
        object_id: String,
    },
    /// Passed a point-like road object.
    RoadObjectPassed {
        /// Road object identifier.
        object_id: String,
    },
}
