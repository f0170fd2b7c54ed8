//! Trip progress derived from a route snapshot plus engine-reported indices.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::routes::{NavigationRoutes, RouteLeg};

/// Progress along the main route of a [`NavigationRoutes`] snapshot.
///
/// Built whole from each status update and published as a replacement,
/// never patched field by field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteProgress {
    /// Snapshot this progress refers to.
    pub routes: Arc<NavigationRoutes>,
    /// Index of the leg being travelled.
    pub leg_index: usize,
    /// Index of the step within the current leg.
    pub step_index: usize,
    /// Meters left on the whole route.
    pub distance_remaining: f64,
    /// Seconds left on the whole route.
    pub duration_remaining: f64,
    /// Meters travelled since the route was set.
    pub distance_traveled: f64,
}

impl RouteProgress {
    /// Progress at the start of `leg_index`, before any status arrived.
    pub fn initial(routes: Arc<NavigationRoutes>, leg_index: usize) -> Self {
        let legs = &routes.main_route().legs;
        let (distance_remaining, duration_remaining) = legs
            .iter()
            .skip(leg_index)
            .fold((0.0, 0.0), |(d, t), leg| {
                (d + leg.distance, t + leg.expected_travel_time)
            });
        Self {
            routes,
            leg_index,
            step_index: 0,
            distance_remaining,
            duration_remaining,
            distance_traveled: 0.0,
        }
    }

    /// Same indices and remaining values re-pointed at another snapshot.
    #[must_use]
    pub fn with_routes(&self, routes: Arc<NavigationRoutes>) -> Self {
        Self {
            routes,
            ..self.clone()
        }
    }

    /// The leg being travelled.
    pub fn current_leg(&self) -> Option<&RouteLeg> {
        self.routes.main_route().legs.get(self.leg_index)
    }

    /// Whether the current leg is the last one.
    pub fn is_final_leg(&self) -> bool {
        self.leg_index + 1 >= self.routes.main_route().legs.len()
    }

    /// Steps left in the current leg, counting the current step.
    pub fn remaining_steps(&self) -> usize {
        self.current_leg()
            .map_or(0, |leg| leg.steps.len().saturating_sub(self.step_index))
    }

    /// Waypoints still ahead, counting the current leg's destination.
    pub fn remaining_waypoints(&self) -> usize {
        self.routes.remaining_waypoints(self.leg_index)
    }
}
