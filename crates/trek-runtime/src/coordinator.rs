//! Route mutation coordinator.
//!
//! Every change to the routes the engine follows goes through
//! [`RouteCoordinator::set_routes`]. The engine call runs on its own task;
//! its result is applied as the single "apply-routes" cancellable unit, so a
//! newer mutation always cancels an older one that has not committed yet.
//!
//! A result is discarded without applying when
//! - a newer `set_routes` was issued after it (generation check), or
//! - a barrier ran after it was issued (epoch check).

use std::sync::Arc;
use std::sync::atomic::Ordering;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use trek_core::events::{
    AlternativesStatus, FallbackToTilesState, FasterRoutesStatus, RefreshingStatus,
    ReroutingStatus, WaypointArrivalStatus,
};
use trek_core::routes::Route;
use trek_core::{
    AlternativeRoute, AlternativeSelector, NavigationRoutes, NavigatorError, RouteState,
    SetRouteReason, Session,
};

use crate::billing::BillingMode;
use crate::engine::{NativeAlternative, SetRoutesOutcome, SetRoutesRequest};
use crate::errors::EngineError;
use crate::state::Shared;
use crate::tasks::TaskKey;

const APPLY_ROUTES: TaskKey = TaskKey::named("apply-routes");
const UPDATE_ALTERNATIVES: TaskKey = TaskKey::named("update-alternatives");
const REFRESH_ROUTE: TaskKey = TaskKey::named("refresh-route");

/// Build alternatives measured against `main`, skipping copies of `main` itself.
pub fn convert_alternatives(main: &Route, natives: Vec<NativeAlternative>) -> Vec<AlternativeRoute> {
    natives
        .into_iter()
        .filter(|native| native.route.id != main.id)
        .map(|native| AlternativeRoute::relative_to(main, native.id, native.route))
        .collect()
}

fn reason_label(reason: SetRouteReason) -> &'static str {
    match reason {
        SetRouteReason::NewRoute => "new_route",
        SetRouteReason::Reroute => "reroute",
        SetRouteReason::Alternatives => "alternatives",
        SetRouteReason::FasterRoute => "faster_route",
        SetRouteReason::FallbackToOffline => "fallback_to_offline",
        SetRouteReason::RestoreToOnline => "restore_to_online",
    }
}

/// A `set_routes` call waiting to be applied.
struct PendingMutation {
    generation: u64,
    routes: Arc<NavigationRoutes>,
    leg_index: usize,
    reason: SetRouteReason,
}

/// Serializes route mutations against the engine.
#[derive(Clone)]
pub struct RouteCoordinator {
    shared: Arc<Shared>,
}

impl RouteCoordinator {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Ask the engine to follow `routes` starting at `leg_index`.
    ///
    /// Returns once the request is issued; the outcome arrives as published
    /// routes or a [`NavigatorError::FailedToSetRoute`] on the error channel.
    #[instrument(skip(self, routes), fields(route_id = %routes.main_route().id))]
    pub fn set_routes(
        &self,
        routes: Arc<NavigationRoutes>,
        leg_index: usize,
        reason: SetRouteReason,
    ) -> Result<(), NavigatorError> {
        let shared = &self.shared;
        let remaining = routes.remaining_waypoints(leg_index);
        let session_id = match reason {
            SetRouteReason::NewRoute => Some(
                shared
                    .billing
                    .begin_active_guidance(routes.main_route().distance, remaining),
            ),
            // Engine-driven changes only apply to guidance already under way.
            _ => {
                let guidance = shared.state.lock().session.is_active_guidance();
                if guidance && shared.billing.is_running(BillingMode::ActiveGuidance) {
                    shared.billing.running_session_id()
                } else {
                    debug!(?reason, "route change outside billed active guidance");
                    None
                }
            }
        };
        let Some(session_id) = session_id else {
            return Err(shared.report(NavigatorError::FailedToSetRoute(None)));
        };
        shared.state.lock().billing_key = Some((routes.main_route().id.clone(), remaining));

        shared.set_ingestion(true);
        shared.engine.resume();

        let generation = shared.mutation_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = shared.tasks.epoch();
        let request = SetRoutesRequest {
            routes: Arc::clone(&routes),
            session_id,
            leg_index,
            reason: reason.into(),
        };
        debug!(generation, epoch, ?reason, "issuing set_routes");

        let pending = PendingMutation {
            generation,
            routes,
            leg_index,
            reason,
        };
        let this = self.clone();
        drop(tokio::spawn(async move {
            let result = this.shared.engine.set_routes(request).await;
            this.on_set_routes_result(pending, epoch, result).await;
        }));
        Ok(())
    }

    async fn on_set_routes_result(
        &self,
        pending: PendingMutation,
        epoch: u64,
        result: Result<SetRoutesOutcome, EngineError>,
    ) {
        if pending.generation != self.shared.mutation_generation() {
            debug!(generation = pending.generation, "discarding superseded set_routes result");
            counter!("route_mutations_discarded", "cause" => "superseded").increment(1);
            return;
        }

        // Results for a call issued inside a barrier wait for that barrier to end.
        self.shared.tasks.wait_for_barrier().await;

        let generation = pending.generation;
        let this = self.clone();
        let started = self
            .shared
            .tasks
            .spawn_in_epoch(APPLY_ROUTES, epoch, move |cancel| async move {
                this.apply_set_routes(&cancel, pending, result);
            });
        if !started {
            debug!(generation, epoch, "discarding set_routes result from before a barrier");
            counter!("route_mutations_discarded", "cause" => "barrier").increment(1);
        }
    }

    fn apply_set_routes(
        &self,
        cancel: &CancellationToken,
        pending: PendingMutation,
        result: Result<SetRoutesOutcome, EngineError>,
    ) {
        let shared = &self.shared;
        let PendingMutation {
            generation,
            routes,
            leg_index,
            reason,
        } = pending;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                if !cancel.is_cancelled() {
                    error!(error = %err, category = err.category(), ?reason, "engine failed to set routes");
                    let _ = shared.report(NavigatorError::FailedToSetRoute(Some(err.to_string())));
                }
                return;
            }
        };

        let alternatives = convert_alternatives(routes.main_route(), outcome.alternatives);
        let applied = Arc::new(routes.with_alternatives(alternatives));
        let rerouting = !applied.main_route().is_custom() && shared.settings.reroute.enabled;

        {
            let mut state = shared.state.lock();
            if cancel.is_cancelled() || generation != shared.mutation_generation() {
                debug!(generation, "route mutation cancelled before commit");
                return;
            }
            let progress = state.carried_progress(&applied, leg_index);
            shared.publish_routes(&mut state, Arc::clone(&applied), progress);
            self.emit_reason_event(reason, &applied);
            shared.set_session(&mut state, Session::ActiveGuidance(RouteState::Uncertain));
            // Toggled inside the commit so a barrier cannot slip in between.
            shared.engine.set_rerouting_enabled(rerouting);
        }

        counter!("route_mutations_applied", "reason" => reason_label(reason)).increment(1);
        info!(
            route_id = %applied.main_route().id,
            alternatives = applied.alternatives().len(),
            reason = reason_label(reason),
            rerouting,
            "routes applied"
        );
    }

    fn emit_reason_event(&self, reason: SetRouteReason, applied: &Arc<NavigationRoutes>) {
        let publishers = &self.shared.publishers;
        let _ = match reason {
            SetRouteReason::NewRoute => 0,
            SetRouteReason::Reroute => publishers.rerouting.emit(ReroutingStatus::Fetched {
                routes: Arc::clone(applied),
            }),
            SetRouteReason::Alternatives => publishers.alternatives.emit(AlternativesStatus::Updated {
                alternatives: applied.alternatives().to_vec(),
            }),
            SetRouteReason::FasterRoute => publishers.faster_routes.emit(FasterRoutesStatus::Applied {
                routes: Arc::clone(applied),
            }),
            SetRouteReason::FallbackToOffline => publishers
                .fallback_to_tiles
                .emit(FallbackToTilesState {
                    using_latest_tiles: false,
                }),
            SetRouteReason::RestoreToOnline => publishers
                .fallback_to_tiles
                .emit(FallbackToTilesState {
                    using_latest_tiles: true,
                }),
        };
    }

    /// Promote an alternative to main route.
    #[instrument(skip(self))]
    pub fn select_alternative_route(&self, selector: AlternativeSelector) -> Result<(), NavigatorError> {
        let selected = {
            let state = self.shared.state.lock();
            if state.session.is_active_guidance() {
                state
                    .routes
                    .as_ref()
                    .and_then(|routes| routes.selecting_alternative(selector))
            } else {
                None
            }
        };
        let Some(selected) = selected else {
            return Err(self
                .shared
                .report(NavigatorError::FailedToSelectAlternativeRoute));
        };
        self.set_routes(Arc::new(selected), 0, SetRouteReason::Alternatives)
    }

    /// Move guidance to `new_leg_index`.
    ///
    /// A no-op outside active guidance or without a running billing session.
    pub async fn switch_leg(&self, new_leg_index: usize) -> Result<(), NavigatorError> {
        self.switch_leg_checked(new_leg_index, None).await
    }

    pub(crate) async fn switch_leg_checked(
        &self,
        new_leg_index: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), NavigatorError> {
        let shared = &self.shared;
        let guidance = shared.state.lock().session.is_active_guidance();
        if !guidance || shared.billing.running_session_id().is_none() {
            warn!(new_leg_index, "switch_leg ignored outside billed active guidance");
            return Ok(());
        }

        let accepted = shared.engine.update_route_leg(new_leg_index).await;
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            debug!(new_leg_index, "leg switch cancelled");
            return Ok(());
        }
        if !accepted {
            return Err(shared.report(NavigatorError::FailedToSelectRouteLeg));
        }

        let mut state = shared.state.lock();
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Ok(());
        }
        if let Some(routes) = state.routes.clone() {
            let remaining = routes.remaining_waypoints(new_leg_index);
            let _ = shared
                .billing
                .begin_active_guidance(routes.main_route().distance, remaining);
            state.billing_key = Some((routes.main_route().id.clone(), remaining));
        }
        info!(new_leg_index, "next leg started");
        let _ = shared
            .publishers
            .waypoint_arrival
            .emit(WaypointArrivalStatus::NextLegStarted { new_leg_index });
        Ok(())
    }

    /// Replace the alternatives of the current routes.
    pub fn update_alternatives(&self, natives: Vec<NativeAlternative>) {
        let this = self.clone();
        let _ = self
            .shared
            .tasks
            .spawn_keyed(UPDATE_ALTERNATIVES, move |cancel| async move {
                this.apply_alternatives(&cancel, natives);
            });
    }

    fn apply_alternatives(&self, cancel: &CancellationToken, natives: Vec<NativeAlternative>) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if cancel.is_cancelled() {
            return;
        }
        let Some(current) = state.routes.clone() else {
            debug!("alternatives update without routes ignored");
            return;
        };
        let alternatives = convert_alternatives(current.main_route(), natives);
        let updated = Arc::new(current.with_alternatives(alternatives.clone()));
        let progress = state.carried_progress(&updated, 0);
        shared.publish_routes(&mut state, updated, progress);
        debug!(count = alternatives.len(), "alternatives updated");
        let _ = shared
            .publishers
            .alternatives
            .emit(AlternativesStatus::Updated { alternatives });
    }

    /// Swap in a refreshed copy of the main route.
    pub fn apply_refreshed_route(&self, route: Route) {
        let this = self.clone();
        let _ = self
            .shared
            .tasks
            .spawn_keyed(REFRESH_ROUTE, move |cancel| async move {
                this.commit_refreshed_route(&cancel, route);
            });
    }

    fn commit_refreshed_route(&self, cancel: &CancellationToken, route: Route) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if cancel.is_cancelled() {
            return;
        }
        let route_id = route.id.clone();
        let Some(refreshed) = state
            .routes
            .as_ref()
            .and_then(|current| current.with_refreshed_main(route))
        else {
            debug!(%route_id, "refresh for a route that is not the main route dropped");
            return;
        };
        let refreshed = Arc::new(refreshed);
        let progress = state.carried_progress(&refreshed, 0);
        shared.publish_routes(&mut state, refreshed, progress);
        let _ = shared
            .publishers
            .refreshing
            .emit(RefreshingStatus::Refreshed { route_id });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use trek_core::FreeDriveState;

    use super::*;
    use crate::engine::RouteChangeCode;
    use crate::navigator::Navigator;
    use crate::testutil::{
        FakeEngine, EngineCall, eventually, route, routes, routes_with_alternatives, settle,
        test_navigator,
    };

    #[test]
    fn conversion_skips_main_and_measures_deltas() {
        let main = route("main", &[2]);
        let mut longer = route("alt", &[2]);
        longer.distance += 100.0;
        let natives = vec![
            NativeAlternative {
                id: 1,
                route: main.clone(),
            },
            NativeAlternative { id: 2, route: longer },
        ];
        let alts = convert_alternatives(&main, natives);
        assert_eq!(alts.len(), 1);
        assert_eq!(alts[0].id, 2);
        assert!((alts[0].distance_delta - 100.0).abs() < f64::EPSILON);
    }

    async fn guided(engine: &Arc<FakeEngine>) -> Navigator {
        let nav = test_navigator(engine);
        nav.start_free_drive().await;
        nav.start_active_guidance(routes_with_alternatives("main", &[4, 3], &[(1, "alt-1"), (2, "alt-2")]), 0)
            .await
            .unwrap();
        eventually(|| nav.session() == Session::ActiveGuidance(RouteState::Uncertain)).await;
        nav
    }

    #[tokio::test]
    async fn engine_reasons_need_billed_guidance() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;

        for reason in [
            SetRouteReason::Reroute,
            SetRouteReason::FallbackToOffline,
            SetRouteReason::RestoreToOnline,
            SetRouteReason::FasterRoute,
        ] {
            assert_eq!(
                nav.coordinator().set_routes(routes("engine", &[3]), 0, reason),
                Err(NavigatorError::FailedToSetRoute(None))
            );
        }
        settle().await;
        assert_eq!(engine.set_routes_count(), 0);
        assert_eq!(nav.session(), Session::FreeDrive(FreeDriveState::Active));
        assert_eq!(nav.billing_session().unwrap().mode, BillingMode::FreeDrive);
    }

    #[tokio::test]
    async fn applied_routes_publish_snapshot_and_settle_uncertain() {
        let engine = FakeEngine::new();
        let nav = guided(&engine).await;

        let current = nav.routes().unwrap();
        assert_eq!(current.main_route().id.as_str(), "main");
        assert!(nav.route_progress().is_some());
        assert_eq!(engine.last_rerouting_enabled(), Some(true));
        assert_matches!(
            engine.calls().iter().find(|c| matches!(c, EngineCall::SetRoutes { .. })),
            Some(EngineCall::SetRoutes {
                reason: RouteChangeCode::NewRoute,
                leg_index: 0,
                ..
            })
        );
    }

    #[tokio::test]
    async fn engine_alternatives_are_converted_on_apply() {
        let engine = FakeEngine::new();
        let mut alt = route("engine-alt", &[4, 3]);
        alt.distance += 10.0;
        engine.answer_with_alternatives(vec![NativeAlternative { id: 9, route: alt }]);
        let nav = guided(&engine).await;

        let current = nav.routes().unwrap();
        assert_eq!(current.alternatives().len(), 1);
        assert_eq!(current.alternatives()[0].id, 9);
    }

    #[tokio::test]
    async fn custom_route_disables_rerouting() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;
        let mut custom = route("custom", &[3]);
        custom.origin = trek_core::routes::RouteOrigin::Custom;
        nav.start_active_guidance(NavigationRoutes::single(custom), 0)
            .await
            .unwrap();
        eventually(|| engine.last_rerouting_enabled() == Some(false)).await;
    }

    #[tokio::test]
    async fn second_set_routes_wins_and_late_first_is_discarded() {
        let engine = FakeEngine::new();
        engine.hold_set_routes();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;

        nav.start_active_guidance(NavigationRoutes::single(route("first", &[3])), 0)
            .await
            .unwrap();
        nav.start_active_guidance(NavigationRoutes::single(route("second", &[3])), 0)
            .await
            .unwrap();
        eventually(|| engine.held_count() == 2).await;

        engine.release("second", Ok(SetRoutesOutcome::default()));
        eventually(|| nav.session() == Session::ActiveGuidance(RouteState::Uncertain)).await;
        assert_eq!(nav.routes().unwrap().main_route().id.as_str(), "second");

        engine.release("first", Ok(SetRoutesOutcome::default()));
        settle().await;
        assert_eq!(nav.routes().unwrap().main_route().id.as_str(), "second");
    }

    #[tokio::test]
    async fn superseded_without_barrier_is_discarded_by_generation() {
        let engine = FakeEngine::new();
        let nav = guided(&engine).await;
        engine.hold_set_routes();
        let mut alternatives = nav.subscribe_alternatives();

        nav.select_alternative_route(AlternativeSelector::Index(0)).unwrap();
        eventually(|| engine.held_count() == 1).await;
        let reroute = routes("rerouted", &[3]);
        nav.coordinator()
            .set_routes(reroute, 0, SetRouteReason::Reroute)
            .unwrap();
        eventually(|| engine.held_count() == 2).await;

        engine.release("alt-1", Ok(SetRoutesOutcome::default()));
        settle().await;
        assert_eq!(nav.routes().unwrap().main_route().id.as_str(), "main");
        assert!(alternatives.try_recv().is_err());

        engine.release("rerouted", Ok(SetRoutesOutcome::default()));
        eventually(|| nav.routes().unwrap().main_route().id.as_str() == "rerouted").await;
    }

    #[tokio::test]
    async fn engine_failure_reports_and_keeps_state() {
        let engine = FakeEngine::new();
        engine.fail_set_routes(EngineError::Rejected("no tiles".into()));
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;
        let mut errors = nav.subscribe_errors();

        nav.start_active_guidance(NavigationRoutes::single(route("main", &[3])), 0)
            .await
            .unwrap();
        let err = tokio::time::timeout(Duration::from_secs(2), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            err,
            NavigatorError::FailedToSetRoute(Some("engine rejected request: no tiles".into()))
        );
        assert_eq!(nav.session(), Session::FreeDrive(FreeDriveState::Active));
    }

    #[tokio::test]
    async fn select_unknown_alternative_fails_without_change() {
        let engine = FakeEngine::new();
        let nav = guided(&engine).await;
        let before = nav.routes().unwrap();
        let set_routes_calls = engine.set_routes_count();

        let err = nav
            .select_alternative_route(AlternativeSelector::Index(99))
            .unwrap_err();
        assert_eq!(err, NavigatorError::FailedToSelectAlternativeRoute);
        assert!(Arc::ptr_eq(&before, &nav.routes().unwrap()));
        assert_eq!(engine.set_routes_count(), set_routes_calls);
    }

    #[tokio::test]
    async fn select_alternative_outside_guidance_fails() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;
        assert_eq!(
            nav.select_alternative_route(AlternativeSelector::Id(1)),
            Err(NavigatorError::FailedToSelectAlternativeRoute)
        );
    }

    #[tokio::test]
    async fn select_alternative_promotes_and_emits() {
        let engine = FakeEngine::new();
        let nav = guided(&engine).await;
        let mut alternatives = nav.subscribe_alternatives();

        nav.select_alternative_route(AlternativeSelector::Id(2)).unwrap();
        eventually(|| nav.routes().unwrap().main_route().id.as_str() == "alt-2").await;

        let event = alternatives.recv().await.unwrap();
        assert_matches!(event, AlternativesStatus::Updated { alternatives } if alternatives.len() == 2);
        assert_eq!(engine.last_set_routes_reason(), Some(RouteChangeCode::Alternative));
    }

    #[tokio::test]
    async fn set_routes_without_running_billing_fails() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        let err = nav
            .coordinator()
            .set_routes(routes("main", &[3]), 0, SetRouteReason::Reroute)
            .unwrap_err();
        assert_eq!(err, NavigatorError::FailedToSetRoute(None));
        assert_eq!(engine.set_routes_count(), 0);
    }

    #[tokio::test]
    async fn switch_leg_emits_next_leg_started() {
        let engine = FakeEngine::new();
        let nav = guided(&engine).await;
        let mut arrivals = nav.subscribe_waypoint_arrival();

        nav.switch_leg(1).await.unwrap();
        assert_eq!(
            arrivals.recv().await.unwrap(),
            WaypointArrivalStatus::NextLegStarted { new_leg_index: 1 }
        );
        assert!(engine.calls().contains(&EngineCall::UpdateRouteLeg(1)));
    }

    #[tokio::test]
    async fn rejected_leg_switch_reports_error() {
        let engine = FakeEngine::new();
        engine.reject_leg_updates();
        let nav = guided(&engine).await;
        assert_eq!(nav.switch_leg(1).await, Err(NavigatorError::FailedToSelectRouteLeg));
    }

    #[tokio::test]
    async fn switch_leg_outside_guidance_is_noop() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;
        assert_eq!(nav.switch_leg(1).await, Ok(()));
        assert!(!engine.calls().contains(&EngineCall::UpdateRouteLeg(1)));
    }

    #[tokio::test]
    async fn free_drive_to_guidance_changes_billing_session() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;
        let free = nav.billing_session().unwrap();
        assert_eq!(free.mode, BillingMode::FreeDrive);

        nav.start_active_guidance(NavigationRoutes::single(route("main", &[3])), 0)
            .await
            .unwrap();
        let guidance = nav.billing_session().unwrap();
        assert_eq!(guidance.mode, BillingMode::ActiveGuidance);
        assert_ne!(guidance.id, free.id);
    }
}
