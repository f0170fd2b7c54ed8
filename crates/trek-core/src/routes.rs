//! Route snapshots.
//!
//! [`NavigationRoutes`] is the unit of publication: a main route plus its
//! ordered alternatives. It is never mutated in place. Every change (new
//! alternatives, a refreshed main route, promoting an alternative) builds a
//! new snapshot, which the runtime then shares as `Arc<NavigationRoutes>`.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::ids::RouteId;

/// Where a route came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOrigin {
    /// Fetched from the online directions service.
    #[default]
    Online,
    /// Computed on-device from offline tiles.
    Offline,
    /// Supplied by the host application. Rerouting is disabled for these.
    Custom,
}

/// A stop along the route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Display name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Location of the stop.
    pub coordinate: Coordinate,
}

/// One maneuver-to-maneuver segment of a leg.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStep {
    /// Maneuver instruction text.
    pub instruction: String,
    /// Length in meters.
    pub distance: f64,
    /// Expected travel time in seconds.
    pub expected_travel_time: f64,
}

/// Portion of a route between two consecutive waypoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    /// Leg start.
    pub source: Waypoint,
    /// Leg end.
    pub destination: Waypoint,
    /// Steps in travel order.
    pub steps: Vec<RouteStep>,
    /// Length in meters.
    pub distance: f64,
    /// Expected travel time in seconds.
    pub expected_travel_time: f64,
}

/// A complete route made of one or more legs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Route identifier.
    pub id: RouteId,
    /// Provenance of the route.
    #[serde(default)]
    pub origin: RouteOrigin,
    /// Legs in travel order.
    pub legs: Vec<RouteLeg>,
    /// Length in meters.
    pub distance: f64,
    /// Expected travel time in seconds.
    pub expected_travel_time: f64,
}

impl Route {
    /// Whether the host application supplied this route.
    pub fn is_custom(&self) -> bool {
        self.origin == RouteOrigin::Custom
    }

    /// Final destination of the route.
    pub fn destination(&self) -> Option<&Waypoint> {
        self.legs.last().map(|leg| &leg.destination)
    }
}

/// An alternative to the main route, with deltas relative to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeRoute {
    /// Engine-assigned alternative identifier.
    pub id: u32,
    /// The alternative route.
    pub route: Route,
    /// `route.distance - main.distance`, in meters.
    pub distance_delta: f64,
    /// `route.expected_travel_time - main.expected_travel_time`, in seconds.
    pub duration_delta: f64,
}

impl AlternativeRoute {
    /// Build an alternative whose deltas are measured against `main`.
    pub fn relative_to(main: &Route, id: u32, route: Route) -> Self {
        Self {
            id,
            distance_delta: route.distance - main.distance,
            duration_delta: route.expected_travel_time - main.expected_travel_time,
            route,
        }
    }
}

/// Why a route mutation was requested.
///
/// Selects the event published after the mutation is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetRouteReason {
    /// Guidance started on a fresh route.
    NewRoute,
    /// Replacement after deviation.
    Reroute,
    /// An alternative was promoted to main.
    Alternatives,
    /// A faster route replaced the main route.
    FasterRoute,
    /// The engine switched to an offline-computed route.
    FallbackToOffline,
    /// The engine switched back to an online route.
    RestoreToOnline,
}

/// How a caller picks an alternative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeSelector {
    /// Position in the ordered alternatives list.
    Index(usize),
    /// Engine-assigned alternative id.
    Id(u32),
}

/// Immutable snapshot of the main route and its alternatives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationRoutes {
    main_route: Route,
    alternatives: Vec<AlternativeRoute>,
}

impl NavigationRoutes {
    /// Snapshot with the given main route and alternatives.
    pub fn new(main_route: Route, alternatives: Vec<AlternativeRoute>) -> Self {
        Self {
            main_route,
            alternatives,
        }
    }

    /// Snapshot without alternatives.
    pub fn single(main_route: Route) -> Self {
        Self::new(main_route, Vec::new())
    }

    /// The route being navigated.
    pub fn main_route(&self) -> &Route {
        &self.main_route
    }

    /// Alternatives in engine order.
    pub fn alternatives(&self) -> &[AlternativeRoute] {
        &self.alternatives
    }

    /// Resolve a selector to a position in [`alternatives`](Self::alternatives).
    pub fn alternative_position(&self, selector: AlternativeSelector) -> Option<usize> {
        match selector {
            AlternativeSelector::Index(index) => {
                (index < self.alternatives.len()).then_some(index)
            }
            AlternativeSelector::Id(id) => self.alternatives.iter().position(|alt| alt.id == id),
        }
    }

    /// New snapshot with the selected alternative promoted to main.
    ///
    /// The former main route takes the promoted alternative's id and joins
    /// the remaining alternatives. All deltas are re-measured against the
    /// new main route. Returns `None` for an unknown selector.
    pub fn selecting_alternative(&self, selector: AlternativeSelector) -> Option<Self> {
        let position = self.alternative_position(selector)?;
        let chosen = &self.alternatives[position];
        let new_main = chosen.route.clone();

        let mut alternatives = Vec::with_capacity(self.alternatives.len());
        alternatives.push(AlternativeRoute::relative_to(
            &new_main,
            chosen.id,
            self.main_route.clone(),
        ));
        alternatives.extend(
            self.alternatives
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != position)
                .map(|(_, alt)| AlternativeRoute::relative_to(&new_main, alt.id, alt.route.clone())),
        );

        Some(Self::new(new_main, alternatives))
    }

    /// New snapshot with the same main route and a replaced alternatives list.
    #[must_use]
    pub fn with_alternatives(&self, alternatives: Vec<AlternativeRoute>) -> Self {
        Self::new(self.main_route.clone(), alternatives)
    }

    /// New snapshot with `route` replacing the main route, if the ids match.
    pub fn with_refreshed_main(&self, route: Route) -> Option<Self> {
        (route.id == self.main_route.id).then(|| Self::new(route, self.alternatives.clone()))
    }

    /// Number of waypoints still ahead when travelling `leg_index`.
    pub fn remaining_waypoints(&self, leg_index: usize) -> usize {
        self.main_route.legs.len().saturating_sub(leg_index)
    }
}
