//! Continuous event dispatcher.
//!
//! Owns the one drain loop that consumes what the engine pushes into the
//! [`NotificationSink`]: the status slot and the notification queue. It
//! stops when the navigator shuts down.

use std::sync::Arc;

use metrics::counter;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trek_core::events::{ElectronicHorizonEvent, FasterRoutesStatus, RefreshingStatus, ReroutingStatus};
use trek_core::horizon::HorizonPosition;
use trek_core::status::MapMatchingState;
use trek_core::{NavigationStatus, NavigatorError, SetRouteReason, Session};

use crate::coordinator::RouteCoordinator;
use crate::notifications::{
    AlternativesPayload, FailurePayload, Notification, NotificationKind, NotificationSink,
    RoadObjectPayload, RouteRefreshPayload, RoutesPayload,
};
use crate::progress::LegAdvance;
use crate::slot::{SlotReceiver, latest_slot};
use crate::state::Shared;
use crate::tasks::TaskKey;

const LEG_ADVANCE: TaskKey = TaskKey::named("leg-advance");

/// Stops the dispatcher loop.
pub(crate) struct DispatcherHandle {
    shutdown: CancellationToken,
    drain: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.drain.is_finished()
    }
}

#[derive(Clone)]
pub(crate) struct EventDispatcher {
    shared: Arc<Shared>,
    coordinator: RouteCoordinator,
}

impl EventDispatcher {
    /// Spawn the drain loop and return the sink the engine should push into.
    pub fn start(shared: Arc<Shared>, coordinator: RouteCoordinator) -> (NotificationSink, DispatcherHandle) {
        let (status_tx, status_rx) = latest_slot();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let dispatcher = Self {
            shared,
            coordinator,
        };

        let drain = tokio::spawn(dispatcher.run(status_rx, notification_rx, shutdown.clone()));

        (
            NotificationSink::new(status_tx, notification_tx),
            DispatcherHandle { shutdown, drain },
        )
    }

    /// Single drain loop over both sources, so statuses and notifications
    /// are handled one at a time in a defined order.
    async fn run(
        self,
        mut statuses: SlotReceiver<NavigationStatus>,
        mut notifications: mpsc::UnboundedReceiver<Notification>,
        shutdown: CancellationToken,
    ) {
        let mut notifications_open = true;
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                status = statuses.recv() => match status {
                    Some(status) => self.process_status(&status),
                    None => break,
                },
                notification = notifications.recv(), if notifications_open => match notification {
                    Some(notification) => self.handle_notification(notification),
                    None => notifications_open = false,
                },
            }
        }
        debug!("dispatcher stopped");
    }

    fn process_status(&self, status: &NavigationStatus) {
        let shared = &self.shared;
        let leg_advance = {
            let mut state = shared.state.lock();
            if state.session.is_idle() {
                drop(state);
                let _ = shared.report(NavigatorError::UnexpectedNavigationStatus);
                return;
            }
            if shared.billing.running_session_id().is_none() {
                warn!(target: "trek::billing", session = %state.session, "status received without a running billing session");
                return;
            }

            shared
                .publishers
                .map_matching
                .publish(Some(MapMatchingState::from_status(status)));

            if !state.session.is_active_guidance() {
                return;
            }
            let Some(routes) = state.routes.clone() else {
                return;
            };

            let update = state.tracker.update(&routes, status);
            shared.publish_progress(&mut state, update.progress.clone());
            if let Some(spoken) = update.spoken {
                let _ = shared.publishers.spoken_instructions.emit(spoken);
            }
            if let Some(visual) = update.visual {
                let _ = shared.publishers.visual_instructions.emit(visual);
            }
            if let Some(arrival) = update.arrival {
                info!(leg_index = update.progress.leg_index, "waypoint arrival");
                let _ = shared.publishers.waypoint_arrival.emit(arrival);
            }

            let session = Session::ActiveGuidance(status.route_state);
            if state.session != session {
                shared.set_session(&mut state, session);
            }

            let remaining = update.progress.remaining_waypoints();
            let key = (routes.main_route().id.clone(), remaining);
            if state.billing_key.as_ref() != Some(&key) {
                debug!(route_id = %key.0, remaining, "validating billing session");
                let _ = shared
                    .billing
                    .begin_active_guidance(routes.main_route().distance, remaining);
                state.billing_key = Some(key);
            }

            update.leg_advance
        };

        if let Some(advance) = leg_advance {
            self.schedule_leg_advance(advance);
        }
    }

    fn schedule_leg_advance(&self, advance: LegAdvance) {
        let coordinator = self.coordinator.clone();
        let approval = self.shared.approval.clone();
        let _ = self
            .shared
            .tasks
            .spawn_keyed(LEG_ADVANCE, move |cancel| async move {
                let next_leg_index = match advance {
                    LegAdvance::Advance { next_leg_index } => next_leg_index,
                    LegAdvance::AwaitApproval {
                        arrived_leg_index,
                        next_leg_index,
                    } => {
                        let Some(approval) = approval else {
                            debug!(arrived_leg_index, "manual leg advance without an approval hook");
                            return;
                        };
                        let approved = tokio::select! {
                            biased;
                            () = cancel.cancelled() => return,
                            approved = approval.should_advance(arrived_leg_index) => approved,
                        };
                        if !approved {
                            debug!(arrived_leg_index, "leg advance declined");
                            return;
                        }
                        next_leg_index
                    }
                };
                if let Err(err) = coordinator.switch_leg_checked(next_leg_index, Some(&cancel)).await {
                    debug!(error = %err, next_leg_index, "leg advance failed");
                }
            });
    }

    fn handle_notification(&self, notification: Notification) {
        let kind = notification.kind;
        debug!(kind = kind.as_str(), "engine notification");
        let publishers = &self.shared.publishers;

        match kind {
            NotificationKind::FallbackToOffline => {
                self.set_routes_from(&notification, SetRouteReason::FallbackToOffline);
            }
            NotificationKind::RestoreToOnline | NotificationKind::SwitchToOnlineRoute => {
                self.set_routes_from(&notification, SetRouteReason::RestoreToOnline);
            }
            NotificationKind::RerouteFetched => {
                self.set_routes_from(&notification, SetRouteReason::Reroute);
            }
            NotificationKind::FasterRouteDetected => {
                if let Some(payload) = decode::<RoutesPayload>(&notification) {
                    let (routes, leg_index) = payload.into_routes();
                    let routes = Arc::new(routes);
                    let _ = publishers.faster_routes.emit(FasterRoutesStatus::Detected {
                        routes: Arc::clone(&routes),
                    });
                    let _ = self
                        .coordinator
                        .set_routes(routes, leg_index, SetRouteReason::FasterRoute);
                }
            }
            NotificationKind::AlternativeRoutesChanged => {
                if let Some(payload) = decode::<AlternativesPayload>(&notification) {
                    self.coordinator.update_alternatives(payload.alternatives);
                }
            }
            NotificationKind::AlternativeRoutesFailed => {
                let payload = decode::<FailurePayload>(&notification).unwrap_or_default();
                let message = payload.message.unwrap_or_else(|| "unknown".to_string());
                let _ = self
                    .shared
                    .report(NavigatorError::FailedToUpdateAlternativeRoutes(message));
            }
            NotificationKind::RouteRefreshed => {
                if let Some(payload) = decode::<RouteRefreshPayload>(&notification) {
                    self.coordinator.apply_refreshed_route(payload.route);
                }
            }
            NotificationKind::RouteRefreshFailed => {
                let payload = decode::<FailurePayload>(&notification).unwrap_or_default();
                let _ = publishers.refreshing.emit(RefreshingStatus::Failed {
                    route_id: payload.route_id,
                    reason: payload.message.unwrap_or_else(|| "unknown".to_string()),
                });
            }
            NotificationKind::RerouteDetected => {
                let _ = publishers.rerouting.emit(ReroutingStatus::Started);
            }
            NotificationKind::RerouteCancelled | NotificationKind::RerouteFailed => {
                let payload = decode::<FailurePayload>(&notification).unwrap_or_default();
                let _ = publishers.rerouting.emit(ReroutingStatus::Interrupted {
                    reason: payload.message.clone(),
                });
                let _ = self
                    .shared
                    .report(NavigatorError::InterruptedReroute(payload.message));
            }
            NotificationKind::HorizonPositionUpdated => {
                if let Some(position) = decode::<HorizonPosition>(&notification) {
                    let _ = publishers
                        .electronic_horizon
                        .emit(ElectronicHorizonEvent::PositionUpdated { position });
                }
            }
            NotificationKind::HorizonRoadObjectEntered => {
                if let Some(RoadObjectPayload { object_id }) = decode(&notification) {
                    let _ = publishers
                        .electronic_horizon
                        .emit(ElectronicHorizonEvent::RoadObjectEntered { object_id });
                }
            }
            NotificationKind::HorizonRoadObjectExited => {
                if let Some(RoadObjectPayload { object_id }) = decode(&notification) {
                    let _ = publishers
                        .electronic_horizon
                        .emit(ElectronicHorizonEvent::RoadObjectExited { object_id });
                }
            }
            NotificationKind::HorizonRoadObjectPassed => {
                if let Some(RoadObjectPayload { object_id }) = decode(&notification) {
                    let _ = publishers
                        .electronic_horizon
                        .emit(ElectronicHorizonEvent::RoadObjectPassed { object_id });
                }
            }
        }
    }

    fn set_routes_from(&self, notification: &Notification, reason: SetRouteReason) {
        if let Some(payload) = decode::<RoutesPayload>(notification) {
            let (routes, leg_index) = payload.into_routes();
            let _ = self.coordinator.set_routes(Arc::new(routes), leg_index, reason);
        }
    }
}

/// Decode a typed payload; malformed payloads are logged and dropped.
fn decode<T: DeserializeOwned>(notification: &Notification) -> Option<T> {
    match serde_json::from_value(notification.payload.clone()) {
        Ok(payload) => Some(payload),
        Err(err) => {
            debug!(kind = notification.kind.as_str(), error = %err, "dropping malformed notification payload");
            counter!("navigator_notifications_malformed", "kind" => notification.kind.as_str()).increment(1);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use serde_json::json;
    use trek_core::events::{AlternativesStatus, FallbackToTilesState, WaypointArrivalStatus};
    use trek_core::{FreeDriveState, NavigationRoutes, RouteState};
    use trek_settings::LegAdvancePolicy;

    use super::*;
    use crate::billing::BillingMode;
    use crate::navigator::{Navigator, NavigatorBuilder};
    use crate::testutil::{
        CountingPolicy, EngineCall, FakeEngine, StaticApproval, eventually, instruction, route,
        routes_payload, settle, status, test_navigator, test_settings,
    };

    async fn recv<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    async fn guided(nav: Navigator) -> Navigator {
        nav.start_free_drive().await;
        nav.start_active_guidance(NavigationRoutes::single(route("main", &[4, 3])), 0)
            .await
            .unwrap();
        eventually(|| nav.session() == Session::ActiveGuidance(RouteState::Uncertain)).await;
        nav
    }

    #[tokio::test]
    async fn status_while_idle_is_unexpected() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        let mut errors = nav.subscribe_errors();

        engine.push_status(status(RouteState::Tracking, 0, 0));
        assert_eq!(recv(&mut errors).await, NavigatorError::UnexpectedNavigationStatus);
        assert!(nav.map_matching().is_none());
    }

    #[tokio::test]
    async fn status_without_running_billing_is_ignored() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;
        nav.pause_free_drive().await.unwrap();

        engine.push_status(status(RouteState::Tracking, 0, 0));
        settle().await;
        assert!(nav.map_matching().is_none());
    }

    #[tokio::test]
    async fn free_drive_status_publishes_map_matching_only() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;

        let mut s = status(RouteState::Tracking, 0, 0);
        s.road_name = Some("Unter den Linden".into());
        engine.push_status(s);
        eventually(|| nav.map_matching().is_some()).await;

        assert_eq!(
            nav.map_matching().unwrap().road_name.as_deref(),
            Some("Unter den Linden")
        );
        assert!(nav.route_progress().is_none());
        assert_eq!(nav.session(), Session::FreeDrive(FreeDriveState::Active));
    }

    #[tokio::test]
    async fn statuses_sent_while_busy_collapse_to_latest() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut spoken = nav.subscribe_spoken_instructions();
        eventually(|| engine.sink().is_status_loop_waiting()).await;

        for name in ["one", "two", "three"] {
            let mut s = status(RouteState::Tracking, 0, 0);
            s.road_name = Some(name.into());
            s.spoken_instruction = Some(instruction(name));
            engine.push_status(s);
        }

        let first = recv(&mut spoken).await.spoken_instruction.text;
        let second = recv(&mut spoken).await.spoken_instruction.text;
        assert_eq!([first.as_str(), second.as_str()], ["one", "three"]);
        settle().await;
        assert!(spoken.try_recv().is_err(), "no further instruction is announced");
        assert_eq!(
            nav.map_matching().unwrap().road_name.as_deref(),
            Some("three")
        );
        assert_eq!(engine.sink().dropped_status_count(), 1, "only the middle status is dropped");
    }

    #[tokio::test]
    async fn pending_status_is_drained_before_notifications() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut spoken = nav.subscribe_spoken_instructions();
        let mut rerouting = nav.subscribe_rerouting();
        eventually(|| engine.sink().is_status_loop_waiting()).await;

        let mut s = status(RouteState::Tracking, 0, 0);
        s.spoken_instruction = Some(instruction("turn left"));
        engine.push_status(s);
        engine.notify(NotificationKind::RerouteDetected, serde_json::Value::Null);

        assert_eq!(recv(&mut spoken).await.spoken_instruction.text, "turn left");
        assert_eq!(recv(&mut rerouting).await, ReroutingStatus::Started);
        assert_eq!(nav.session(), Session::ActiveGuidance(RouteState::Tracking));
    }

    #[tokio::test]
    async fn route_notifications_in_free_drive_are_rejected() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.start_free_drive().await;
        let mut errors = nav.subscribe_errors();

        engine.notify(NotificationKind::RerouteFetched, routes_payload("rerouted", &[3]));
        engine.notify(NotificationKind::FallbackToOffline, routes_payload("offline", &[3]));
        engine.notify(NotificationKind::RestoreToOnline, routes_payload("online", &[3]));
        engine.notify(NotificationKind::FasterRouteDetected, routes_payload("faster", &[3]));
        for _ in 0..4 {
            assert_eq!(recv(&mut errors).await, NavigatorError::FailedToSetRoute(None));
        }
        settle().await;

        assert_eq!(nav.session(), Session::FreeDrive(FreeDriveState::Active));
        assert!(nav.routes().is_none());
        assert!(nav.route_progress().is_none());
        assert_eq!(engine.set_routes_count(), 0);
        assert_eq!(nav.billing_session().unwrap().mode, BillingMode::FreeDrive);
    }

    #[tokio::test]
    async fn route_notifications_while_idle_are_rejected() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        let mut errors = nav.subscribe_errors();

        engine.notify(NotificationKind::RerouteFetched, routes_payload("rerouted", &[3]));
        assert_eq!(recv(&mut errors).await, NavigatorError::FailedToSetRoute(None));
        settle().await;

        assert_eq!(nav.session(), Session::Idle);
        assert!(nav.routes().is_none());
        assert_eq!(engine.set_routes_count(), 0);
        assert!(nav.billing_session().is_none());
    }

    #[tokio::test]
    async fn guidance_status_updates_progress_and_session() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut spoken = nav.subscribe_spoken_instructions();

        let mut s = status(RouteState::Tracking, 0, 1);
        s.spoken_instruction = Some(instruction("Turn left"));
        engine.push_status(s.clone());
        eventually(|| nav.session() == Session::ActiveGuidance(RouteState::Tracking)).await;

        assert_eq!(nav.route_progress().unwrap().step_index, 1);
        assert_eq!(recv(&mut spoken).await.spoken_instruction.text, "Turn left");

        s.distance_remaining -= 5.0;
        engine.push_status(s);
        settle().await;
        assert!(spoken.try_recv().is_err(), "same instruction is not repeated");
    }

    #[tokio::test]
    async fn repeated_statuses_do_not_restart_billing() {
        let engine = FakeEngine::new();
        let policy = Arc::new(CountingPolicy::always());
        let nav = NavigatorBuilder::new(engine.clone())
            .settings(test_settings())
            .restart_policy(policy.clone())
            .build();
        let nav = guided(nav).await;
        let session = nav.billing_session().unwrap();
        assert_eq!(session.mode, BillingMode::ActiveGuidance);

        for step in 0..3 {
            engine.push_status(status(RouteState::Tracking, 0, step));
            settle().await;
        }
        assert_eq!(nav.billing_session().unwrap().id, session.id);
        assert_eq!(policy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn automatic_arrival_advances_leg() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut arrivals = nav.subscribe_waypoint_arrival();

        engine.push_status(status(RouteState::Complete, 0, 3));
        assert_matches!(
            recv(&mut arrivals).await,
            WaypointArrivalStatus::ToWaypoint { leg_index: 0, .. }
        );
        assert_eq!(
            recv(&mut arrivals).await,
            WaypointArrivalStatus::NextLegStarted { new_leg_index: 1 }
        );
        assert!(engine.calls().contains(&EngineCall::UpdateRouteLeg(1)));
    }

    #[tokio::test]
    async fn manual_advance_denied_stays_on_leg() {
        let engine = FakeEngine::new();
        let mut settings = (*test_settings()).clone();
        settings.tracker.leg_advance = LegAdvancePolicy::Manual;
        let approval = Arc::new(StaticApproval::new(false));
        let nav = NavigatorBuilder::new(engine.clone())
            .settings(Arc::new(settings))
            .leg_advance_approval(approval.clone())
            .build();
        let nav = guided(nav).await;
        let mut arrivals = nav.subscribe_waypoint_arrival();

        let arrived = status(RouteState::Complete, 0, 3);
        engine.push_status(arrived.clone());
        assert_matches!(
            recv(&mut arrivals).await,
            WaypointArrivalStatus::ToWaypoint { leg_index: 0, .. }
        );
        eventually(|| approval.asked() == vec![0]).await;

        engine.push_status(arrived);
        settle().await;
        assert!(arrivals.try_recv().is_err(), "no duplicate arrival");
        assert_eq!(nav.route_progress().unwrap().leg_index, 0);
        assert!(!engine.calls().iter().any(|c| matches!(c, EngineCall::UpdateRouteLeg(_))));
    }

    #[tokio::test]
    async fn manual_advance_approved_switches_leg() {
        let engine = FakeEngine::new();
        let mut settings = (*test_settings()).clone();
        settings.tracker.leg_advance = LegAdvancePolicy::Manual;
        let nav = NavigatorBuilder::new(engine.clone())
            .settings(Arc::new(settings))
            .leg_advance_approval(Arc::new(StaticApproval::new(true)))
            .build();
        let nav = guided(nav).await;

        engine.push_status(status(RouteState::Complete, 0, 3));
        eventually(|| engine.calls().contains(&EngineCall::UpdateRouteLeg(1))).await;
    }

    #[tokio::test]
    async fn reroute_notifications_flow_through_coordinator() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut rerouting = nav.subscribe_rerouting();

        engine.notify(NotificationKind::RerouteDetected, serde_json::Value::Null);
        assert_eq!(recv(&mut rerouting).await, ReroutingStatus::Started);

        engine.notify(NotificationKind::RerouteFetched, routes_payload("rerouted", &[3]));
        assert_matches!(
            recv(&mut rerouting).await,
            ReroutingStatus::Fetched { routes } if routes.main_route().id.as_str() == "rerouted"
        );
        assert_eq!(nav.routes().unwrap().main_route().id.as_str(), "rerouted");
    }

    #[tokio::test]
    async fn reroute_failure_interrupts_and_reports() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut rerouting = nav.subscribe_rerouting();
        let mut errors = nav.subscribe_errors();

        engine.notify(NotificationKind::RerouteFailed, json!({"message": "offline"}));
        assert_eq!(
            recv(&mut rerouting).await,
            ReroutingStatus::Interrupted {
                reason: Some("offline".into())
            }
        );
        assert_eq!(
            recv(&mut errors).await,
            NavigatorError::InterruptedReroute(Some("offline".into()))
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let before = nav.routes().unwrap();
        let calls = engine.set_routes_count();

        engine.notify(NotificationKind::RerouteFetched, json!({"bogus": true}));
        settle().await;
        assert!(Arc::ptr_eq(&before, &nav.routes().unwrap()));
        assert_eq!(engine.set_routes_count(), calls);
    }

    #[tokio::test]
    async fn fallback_and_restore_emit_tile_state() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut tiles = nav.subscribe_fallback_to_tiles();

        engine.notify(NotificationKind::FallbackToOffline, routes_payload("offline", &[3]));
        assert_eq!(
            recv(&mut tiles).await,
            FallbackToTilesState {
                using_latest_tiles: false
            }
        );
        engine.notify(NotificationKind::RestoreToOnline, routes_payload("online", &[3]));
        assert_eq!(
            recv(&mut tiles).await,
            FallbackToTilesState {
                using_latest_tiles: true
            }
        );
    }

    #[tokio::test]
    async fn faster_route_is_detected_then_applied() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut faster = nav.subscribe_faster_routes();

        engine.notify(NotificationKind::FasterRouteDetected, routes_payload("faster", &[3]));
        assert_matches!(recv(&mut faster).await, FasterRoutesStatus::Detected { .. });
        assert_matches!(recv(&mut faster).await, FasterRoutesStatus::Applied { routes } if routes.main_route().id.as_str() == "faster");
    }

    #[tokio::test]
    async fn alternatives_notification_replaces_alternatives() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut alternatives = nav.subscribe_alternatives();

        engine.notify(
            NotificationKind::AlternativeRoutesChanged,
            json!({"alternatives": [{"id": 5, "route": route("alt-5", &[3])}]}),
        );
        assert_matches!(
            recv(&mut alternatives).await,
            AlternativesStatus::Updated { alternatives } if alternatives[0].id == 5
        );
        assert_eq!(nav.routes().unwrap().alternatives().len(), 1);
        assert_eq!(nav.routes().unwrap().main_route().id.as_str(), "main");
    }

    #[tokio::test]
    async fn alternatives_failure_is_reported() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut errors = nav.subscribe_errors();

        engine.notify(NotificationKind::AlternativeRoutesFailed, json!({"message": "timeout"}));
        assert_eq!(
            recv(&mut errors).await,
            NavigatorError::FailedToUpdateAlternativeRoutes("timeout".into())
        );
    }

    #[tokio::test]
    async fn refresh_applies_only_to_main_route() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut refreshing = nav.subscribe_refreshing();

        let mut stale = route("other", &[3]);
        stale.expected_travel_time = 1.0;
        engine.notify(NotificationKind::RouteRefreshed, json!({ "route": stale }));
        settle().await;
        assert!(refreshing.try_recv().is_err());

        let mut refreshed = route("main", &[4, 3]);
        refreshed.expected_travel_time = 42.0;
        engine.notify(NotificationKind::RouteRefreshed, json!({ "route": refreshed }));
        assert_matches!(
            recv(&mut refreshing).await,
            RefreshingStatus::Refreshed { route_id } if route_id.as_str() == "main"
        );
        assert!((nav.routes().unwrap().main_route().expected_travel_time - 42.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn refresh_failure_is_published() {
        let engine = FakeEngine::new();
        let nav = guided(test_navigator(&engine)).await;
        let mut refreshing = nav.subscribe_refreshing();

        engine.notify(NotificationKind::RouteRefreshFailed, json!({"routeId": "main", "message": "503"}));
        assert_matches!(
            recv(&mut refreshing).await,
            RefreshingStatus::Failed { route_id: Some(id), reason } if id.as_str() == "main" && reason == "503"
        );
    }

    #[tokio::test]
    async fn horizon_notifications_are_republished() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        let mut horizon = nav.subscribe_electronic_horizon();

        engine.notify(
            NotificationKind::HorizonPositionUpdated,
            json!({"edgeId": 11, "fractionAlongEdge": 0.5, "treeRebuilt": false}),
        );
        assert_matches!(
            recv(&mut horizon).await,
            ElectronicHorizonEvent::PositionUpdated { position } if position.edge_id == 11
        );

        engine.notify(NotificationKind::HorizonRoadObjectEntered, json!({"objectId": "tunnel-1"}));
        assert_eq!(
            recv(&mut horizon).await,
            ElectronicHorizonEvent::RoadObjectEntered {
                object_id: "tunnel-1".into()
            }
        );
    }

    #[tokio::test]
    async fn shutdown_stops_drain_loop() {
        let engine = FakeEngine::new();
        let nav = test_navigator(&engine);
        nav.shutdown();
        eventually(|| nav.dispatcher_finished()).await;
    }
}
