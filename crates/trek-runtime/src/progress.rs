//! Progress tracker.
//!
//! Turns each engine status into a fresh [`RouteProgress`] plus the one-shot
//! events it implies: new voice/banner instructions, waypoint arrival, and a
//! request to move on to the next leg.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use trek_core::events::{SpokenInstructionState, VisualInstructionState, WaypointArrivalStatus};
use trek_core::routes::Waypoint;
use trek_core::status::{SpokenInstruction, VisualInstruction};
use trek_core::{NavigationRoutes, NavigationStatus, RouteProgress, RouteState};
use trek_settings::{LegAdvancePolicy, TrackerSettings};

/// Host-supplied approval for advancing past an intermediate waypoint.
///
/// Consulted only under [`LegAdvancePolicy::Manual`].
#[async_trait]
pub trait LegAdvanceApproval: Send + Sync {
    /// Whether guidance may leave the leg at `arrived_leg_index`.
    async fn should_advance(&self, arrived_leg_index: usize) -> bool;
}

/// What the caller should do about the leg after an arrival.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegAdvance {
    /// Switch to `next_leg_index` now.
    Advance {
        /// Leg to switch to.
        next_leg_index: usize,
    },
    /// Ask [`LegAdvanceApproval`] first, then switch if it agrees.
    AwaitApproval {
        /// Leg that just ended.
        arrived_leg_index: usize,
        /// Leg to switch to on approval.
        next_leg_index: usize,
    },
}

/// Everything derived from one status.
#[derive(Clone, Debug)]
pub struct ProgressUpdate {
    /// Replacement progress.
    pub progress: RouteProgress,
    /// Voice instruction to announce, if new.
    pub spoken: Option<SpokenInstructionState>,
    /// Banner instruction to show, if new.
    pub visual: Option<VisualInstructionState>,
    /// Arrival event, if a new waypoint was reached.
    pub arrival: Option<WaypointArrivalStatus>,
    /// Leg change to perform after the arrival.
    pub leg_advance: Option<LegAdvance>,
}

/// Per-route memory of what was already emitted.
pub struct ProgressTracker {
    policy: LegAdvancePolicy,
    arrival_step_threshold: usize,
    last_spoken: Option<SpokenInstruction>,
    last_visual: Option<VisualInstruction>,
    last_arrived: Option<Waypoint>,
}

impl ProgressTracker {
    /// Tracker configured from settings.
    pub fn new(settings: &TrackerSettings) -> Self {
        Self {
            policy: settings.leg_advance,
            arrival_step_threshold: settings.arrival_step_threshold,
            last_spoken: None,
            last_visual: None,
            last_arrived: None,
        }
    }

    /// Forget emitted instructions and the arrival marker.
    pub fn reset(&mut self) {
        self.last_spoken = None;
        self.last_visual = None;
        self.last_arrived = None;
    }

    /// Destination of the last arrival event.
    pub fn last_arrived(&self) -> Option<&Waypoint> {
        self.last_arrived.as_ref()
    }

    /// Derive progress and events for `status` against `routes`.
    pub fn update(&mut self, routes: &Arc<NavigationRoutes>, status: &NavigationStatus) -> ProgressUpdate {
        let progress = RouteProgress {
            routes: Arc::clone(routes),
            leg_index: status.leg_index,
            step_index: status.step_index,
            distance_remaining: status.distance_remaining,
            duration_remaining: status.duration_remaining,
            distance_traveled: status.distance_traveled,
        };

        let spoken = status
            .spoken_instruction
            .as_ref()
            .filter(|i| self.last_spoken.as_ref() != Some(*i))
            .cloned()
            .map(|instruction| {
                self.last_spoken = Some(instruction.clone());
                SpokenInstructionState {
                    spoken_instruction: instruction,
                }
            });

        let visual = status
            .visual_instruction
            .as_ref()
            .filter(|i| self.last_visual.as_ref() != Some(*i))
            .cloned()
            .map(|instruction| {
                self.last_visual = Some(instruction.clone());
                VisualInstructionState {
                    visual_instruction: instruction,
                }
            });

        let (arrival, leg_advance) = self.detect_arrival(&progress, status.route_state);

        ProgressUpdate {
            progress,
            spoken,
            visual,
            arrival,
            leg_advance,
        }
    }

    fn detect_arrival(
        &mut self,
        progress: &RouteProgress,
        route_state: RouteState,
    ) -> (Option<WaypointArrivalStatus>, Option<LegAdvance>) {
        if route_state != RouteState::Complete
            || progress.remaining_steps() > self.arrival_step_threshold
        {
            return (None, None);
        }
        let Some(leg) = progress.current_leg() else {
            return (None, None);
        };
        if self.last_arrived.as_ref() == Some(&leg.destination) {
            return (None, None);
        }

        let destination = leg.destination.clone();
        self.last_arrived = Some(destination.clone());
        let leg_index = progress.leg_index;

        if progress.is_final_leg() {
            debug!(leg_index, "arrived at final destination");
            return (
                Some(WaypointArrivalStatus::ToFinalDestination { destination }),
                None,
            );
        }

        debug!(leg_index, policy = %self.policy, "arrived at intermediate waypoint");
        let next_leg_index = leg_index + 1;
        let advance = match self.policy {
            LegAdvancePolicy::Automatic => LegAdvance::Advance { next_leg_index },
            LegAdvancePolicy::Manual => LegAdvance::AwaitApproval {
                arrived_leg_index: leg_index,
                next_leg_index,
            },
        };
        (
            Some(WaypointArrivalStatus::ToWaypoint {
                waypoint: destination,
                leg_index,
            }),
            Some(advance),
        )
    }
}
