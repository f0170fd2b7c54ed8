//! The navigator facade.
//!
//! [`Navigator`] owns the trip state machine (idle → free drive → active
//! guidance) and is the only entry point for commands. Mode transitions run
//! as barrier operations on the task manager, so no background work started
//! under the previous mode can commit after the transition.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, trace, warn};
use trek_core::events::{
    AlternativesStatus, ElectronicHorizonEvent, FallbackToTilesState, FasterRoutesStatus,
    RefreshingStatus, ReroutingStatus, SpokenInstructionState, VisualInstructionState,
    WaypointArrivalStatus,
};
use trek_core::geo::{Heading, Location};
use trek_core::horizon::ElectronicHorizonConfig;
use trek_core::status::MapMatchingState;
use trek_core::{
    AlternativeSelector, FreeDriveState, NavigationRoutes, NavigatorError, RouteProgress,
    SetRouteReason, Session,
};
use trek_settings::NavigatorSettings;

use crate::billing::{BillingMode, BillingRestartPolicy, BillingSession, ThresholdRestartPolicy};
use crate::coordinator::RouteCoordinator;
use crate::dispatcher::{DispatcherHandle, EventDispatcher};
use crate::engine::NavigationEngine;
use crate::progress::LegAdvanceApproval;
use crate::state::Shared;

/// Configures and starts a [`Navigator`].
pub struct NavigatorBuilder {
    engine: Arc<dyn NavigationEngine>,
    settings: Option<Arc<NavigatorSettings>>,
    restart_policy: Option<Arc<dyn BillingRestartPolicy>>,
    approval: Option<Arc<dyn LegAdvanceApproval>>,
}

impl NavigatorBuilder {
    /// Builder for a navigator driving `engine`.
    pub fn new(engine: Arc<dyn NavigationEngine>) -> Self {
        Self {
            engine,
            settings: None,
            restart_policy: None,
            approval: None,
        }
    }

    /// Use `settings` instead of the global settings.
    #[must_use]
    pub fn settings(mut self, settings: Arc<NavigatorSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Override the billing restart policy built from settings.
    #[must_use]
    pub fn restart_policy(mut self, policy: Arc<dyn BillingRestartPolicy>) -> Self {
        self.restart_policy = Some(policy);
        self
    }

    /// Approval hook for manual leg advance.
    #[must_use]
    pub fn leg_advance_approval(mut self, approval: Arc<dyn LegAdvanceApproval>) -> Self {
        self.approval = Some(approval);
        self
    }

    /// Start the navigator. Must be called inside a Tokio runtime.
    pub fn build(self) -> Navigator {
        let settings = self.settings.unwrap_or_else(trek_settings::get_settings);
        let policy = self.restart_policy.unwrap_or_else(|| {
            Arc::new(ThresholdRestartPolicy::from_settings(&settings.billing))
        });
        let shared = Arc::new(Shared::new(self.engine, settings, policy, self.approval));
        let coordinator = RouteCoordinator::new(Arc::clone(&shared));
        let (sink, dispatcher) = EventDispatcher::start(Arc::clone(&shared), coordinator.clone());
        shared.engine.subscribe(sink);
        info!(
            leg_advance = %shared.settings.tracker.leg_advance,
            event_capacity = shared.settings.channels.event_capacity,
            "navigator started"
        );

        Navigator {
            shared,
            coordinator,
            dispatcher,
        }
    }
}

/// Navigation session orchestrator.
pub struct Navigator {
    shared: Arc<Shared>,
    coordinator: RouteCoordinator,
    dispatcher: DispatcherHandle,
}

impl Navigator {
    /// Shorthand for `NavigatorBuilder::new(engine).build()`.
    pub fn new(engine: Arc<dyn NavigationEngine>) -> Self {
        NavigatorBuilder::new(engine).build()
    }

    // ── Commands ──

    /// Enter free drive, or resume it if paused.
    #[instrument(skip(self))]
    pub async fn start_free_drive(&self) {
        let shared = Arc::clone(&self.shared);
        self.shared
            .tasks
            .barrier(|| async move {
                let billing = shared.billing.begin_free_drive();
                if let Some(old) = billing.replaced_guidance_session {
                    let engine = Arc::clone(&shared.engine);
                    drop(tokio::spawn(async move {
                        if let Err(err) = engine.unset_routes(&old).await {
                            warn!(session_id = %old, error = %err, "failed to unset routes of replaced session");
                        }
                    }));
                }
                shared.set_ingestion(true);
                shared.engine.resume();

                let mut state = shared.state.lock();
                shared.clear_routes(&mut state);
                shared.set_session(&mut state, Session::FreeDrive(FreeDriveState::Active));
            })
            .await;
    }

    /// Pause an active free drive.
    #[instrument(skip(self))]
    pub async fn pause_free_drive(&self) -> Result<(), NavigatorError> {
        let shared = Arc::clone(&self.shared);
        self.shared
            .tasks
            .barrier(|| async move {
                let mut state = shared.state.lock();
                let valid = state.session == Session::FreeDrive(FreeDriveState::Active)
                    && shared.billing.is_running(BillingMode::FreeDrive);
                if !valid {
                    drop(state);
                    return Err(shared.report(NavigatorError::FailedToPause));
                }
                shared.set_ingestion(false);
                shared.engine.pause();
                let _ = shared.billing.pause();
                shared.set_session(&mut state, Session::FreeDrive(FreeDriveState::Paused));
                Ok(())
            })
            .await
    }

    /// Start guidance along `routes` from `start_leg_index`.
    ///
    /// The routes and initial progress are published immediately; the
    /// session turns to active guidance once the engine has accepted them.
    #[instrument(skip(self, routes), fields(route_id = %routes.main_route().id))]
    pub async fn start_active_guidance(
        &self,
        routes: NavigationRoutes,
        start_leg_index: usize,
    ) -> Result<(), NavigatorError> {
        let shared = Arc::clone(&self.shared);
        let coordinator = self.coordinator.clone();
        let routes = Arc::new(routes);
        self.shared
            .tasks
            .barrier(|| async move {
                {
                    let mut state = shared.state.lock();
                    let progress = RouteProgress::initial(Arc::clone(&routes), start_leg_index);
                    shared.publish_routes(&mut state, Arc::clone(&routes), progress);
                }
                coordinator.set_routes(routes, start_leg_index, SetRouteReason::NewRoute)
            })
            .await
    }

    /// Stop tracking and return to idle.
    #[instrument(skip(self))]
    pub async fn set_to_idle(&self) -> Result<(), NavigatorError> {
        let shared = Arc::clone(&self.shared);
        self.shared
            .tasks
            .barrier(|| async move {
                let unset = {
                    let mut state = shared.state.lock();
                    if state.session.is_idle() {
                        drop(state);
                        return Err(shared.report(NavigatorError::FailedToSetToIdle));
                    }
                    let was_guidance = state.session.is_active_guidance();
                    let _ = shared.billing.pause();
                    let stopped = shared.billing.stop();
                    shared.clear_routes(&mut state);
                    stopped.filter(|_| was_guidance)
                };
                shared.set_ingestion(false);
                shared.engine.pause();

                if let Some(session_id) = unset {
                    if let Err(err) = shared.engine.unset_routes(&session_id).await {
                        warn!(%session_id, error = %err, "failed to unset routes");
                    }
                }

                let mut state = shared.state.lock();
                shared.set_session(&mut state, Session::Idle);
                Ok(())
            })
            .await
    }

    /// Promote an alternative route to main.
    pub fn select_alternative_route(&self, selector: AlternativeSelector) -> Result<(), NavigatorError> {
        self.coordinator.select_alternative_route(selector)
    }

    /// Move guidance to another leg.
    #[instrument(skip(self))]
    pub async fn switch_leg(&self, new_leg_index: usize) -> Result<(), NavigatorError> {
        self.coordinator.switch_leg(new_leg_index).await
    }

    /// Start electronic horizon updates, with settings defaults when `config` is `None`.
    pub fn start_updating_electronic_horizon(&self, config: Option<ElectronicHorizonConfig>) {
        let config = config.unwrap_or_else(|| self.shared.settings.electronic_horizon.to_config());
        self.shared.engine.start_updating_electronic_horizon(config);
    }

    /// Stop electronic horizon updates.
    pub fn stop_updating_electronic_horizon(&self) {
        self.shared.engine.stop_updating_electronic_horizon();
    }

    /// Feed a location fix. Ignored while ingestion is stopped.
    pub fn update_location(&self, location: Location) {
        if self.shared.ingestion_enabled() {
            self.shared.engine.update_location(location);
        } else {
            trace!("location ignored, ingestion stopped");
        }
    }

    /// Feed a heading. Ignored while ingestion is stopped.
    pub fn update_heading(&self, heading: Heading) {
        if self.shared.ingestion_enabled() {
            self.shared.engine.update_heading(heading);
        } else {
            trace!("heading ignored, ingestion stopped");
        }
    }

    /// Stop the dispatcher and cancel background work.
    pub fn shutdown(&self) {
        self.shared.set_ingestion(false);
        self.shared.tasks.cancel_all();
        self.dispatcher.shutdown();
        info!("navigator shut down");
    }

    // ── Snapshots ──

    /// Current trip state.
    pub fn session(&self) -> Session {
        self.shared.publishers.session.current()
    }

    /// Current routes.
    pub fn routes(&self) -> Option<Arc<NavigationRoutes>> {
        self.shared.publishers.routes.current()
    }

    /// Current progress.
    pub fn route_progress(&self) -> Option<RouteProgress> {
        self.shared.publishers.route_progress.current()
    }

    /// Latest map-matching result.
    pub fn map_matching(&self) -> Option<MapMatchingState> {
        self.shared.publishers.map_matching.current()
    }

    /// Current billing session.
    pub fn billing_session(&self) -> Option<BillingSession> {
        self.shared.billing.current()
    }

    /// Whether location and heading updates reach the engine.
    pub fn is_ingesting(&self) -> bool {
        self.shared.ingestion_enabled()
    }

    /// Settings this navigator was built with.
    pub fn settings(&self) -> &Arc<NavigatorSettings> {
        &self.shared.settings
    }

    // ── Subscriptions ──

    /// Replay-latest session updates.
    pub fn subscribe_session(&self) -> watch::Receiver<Session> {
        self.shared.publishers.session.subscribe()
    }

    /// Replay-latest routes updates.
    pub fn subscribe_routes(&self) -> watch::Receiver<Option<Arc<NavigationRoutes>>> {
        self.shared.publishers.routes.subscribe()
    }

    /// Replay-latest progress updates.
    pub fn subscribe_route_progress(&self) -> watch::Receiver<Option<RouteProgress>> {
        self.shared.publishers.route_progress.subscribe()
    }

    /// Replay-latest map-matching updates.
    pub fn subscribe_map_matching(&self) -> watch::Receiver<Option<MapMatchingState>> {
        self.shared.publishers.map_matching.subscribe()
    }

    /// Voice instructions.
    pub fn subscribe_spoken_instructions(&self) -> broadcast::Receiver<SpokenInstructionState> {
        self.shared.publishers.spoken_instructions.subscribe()
    }

    /// Banner instructions.
    pub fn subscribe_visual_instructions(&self) -> broadcast::Receiver<VisualInstructionState> {
        self.shared.publishers.visual_instructions.subscribe()
    }

    /// Arrivals and leg changes.
    pub fn subscribe_waypoint_arrival(&self) -> broadcast::Receiver<WaypointArrivalStatus> {
        self.shared.publishers.waypoint_arrival.subscribe()
    }

    /// Reroute lifecycle.
    pub fn subscribe_rerouting(&self) -> broadcast::Receiver<ReroutingStatus> {
        self.shared.publishers.rerouting.subscribe()
    }

    /// Alternatives updates.
    pub fn subscribe_alternatives(&self) -> broadcast::Receiver<AlternativesStatus> {
        self.shared.publishers.alternatives.subscribe()
    }

    /// Faster route lifecycle.
    pub fn subscribe_faster_routes(&self) -> broadcast::Receiver<FasterRoutesStatus> {
        self.shared.publishers.faster_routes.subscribe()
    }

    /// Route refresh outcomes.
    pub fn subscribe_refreshing(&self) -> broadcast::Receiver<RefreshingStatus> {
        self.shared.publishers.refreshing.subscribe()
    }

    /// Online/offline tile switches.
    pub fn subscribe_fallback_to_tiles(&self) -> broadcast::Receiver<FallbackToTilesState> {
        self.shared.publishers.fallback_to_tiles.subscribe()
    }

    /// Electronic horizon updates.
    pub fn subscribe_electronic_horizon(&self) -> broadcast::Receiver<ElectronicHorizonEvent> {
        self.shared.publishers.electronic_horizon.subscribe()
    }

    /// Non-fatal errors.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<NavigatorError> {
        self.shared.publishers.errors.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn coordinator(&self) -> &RouteCoordinator {
        &self.coordinator
    }

    #[cfg(test)]
    pub(crate) fn dispatcher_finished(&self) -> bool {
        self.dispatcher.is_finished()
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        self.shared.tasks.cancel_all();
        self.dispatcher.shutdown();
    }
}
