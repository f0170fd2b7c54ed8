//! Test doubles and fixtures shared by the runtime's unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use trek_core::geo::{Coordinate, Heading, Location};
use trek_core::horizon::ElectronicHorizonConfig;
use trek_core::routes::{Route, RouteLeg, RouteOrigin, RouteStep, Waypoint};
use trek_core::status::SpokenInstruction;
use trek_core::{
    AlternativeRoute, BillingSessionId, NavigationRoutes, NavigationStatus, RouteId, RouteState,
};
use trek_settings::NavigatorSettings;

use crate::billing::BillingRestartPolicy;
use crate::engine::{
    NativeAlternative, NavigationEngine, RouteChangeCode, SetRoutesOutcome, SetRoutesRequest,
};
use crate::errors::EngineError;
use crate::navigator::{Navigator, NavigatorBuilder};
use crate::notifications::{NotificationKind, NotificationSink};
use crate::progress::LegAdvanceApproval;

// ── Fake engine ──

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum EngineCall {
    SetRoutes {
        route_id: RouteId,
        session_id: BillingSessionId,
        leg_index: usize,
        reason: RouteChangeCode,
    },
    UnsetRoutes(BillingSessionId),
    UpdateRouteLeg(usize),
    Pause,
    Resume,
    UpdateLocation,
    UpdateHeading,
    SetReroutingEnabled(bool),
    StartHorizon(ElectronicHorizonConfig),
    StopHorizon,
}

type HeldReply = oneshot::Sender<Result<SetRoutesOutcome, EngineError>>;

/// Scriptable engine. `set_routes` echoes the request's alternatives unless told otherwise.
#[derive(Default)]
pub(crate) struct FakeEngine {
    calls: Mutex<Vec<EngineCall>>,
    hold: AtomicBool,
    held: Mutex<Vec<(RouteId, HeldReply)>>,
    failure: Mutex<Option<EngineError>>,
    alternatives: Mutex<Option<Vec<NativeAlternative>>>,
    reject_legs: AtomicBool,
    sink: Mutex<Option<NotificationSink>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Park every subsequent `set_routes` until [`Self::release`].
    pub fn hold_set_routes(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    /// Answer the parked `set_routes` whose main route is `route_id`.
    pub fn release(&self, route_id: &str, result: Result<SetRoutesOutcome, EngineError>) {
        let reply = {
            let mut held = self.held.lock();
            let pos = held
                .iter()
                .position(|(id, _)| id.as_str() == route_id)
                .unwrap_or_else(|| panic!("no held set_routes for {route_id}"));
            held.remove(pos).1
        };
        let _ = reply.send(result);
    }

    pub fn fail_set_routes(&self, error: EngineError) {
        *self.failure.lock() = Some(error);
    }

    pub fn answer_with_alternatives(&self, alternatives: Vec<NativeAlternative>) {
        *self.alternatives.lock() = Some(alternatives);
    }

    pub fn reject_leg_updates(&self) {
        self.reject_legs.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn set_routes_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, EngineCall::SetRoutes { .. }))
            .count()
    }

    pub fn last_rerouting_enabled(&self) -> Option<bool> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            EngineCall::SetReroutingEnabled(enabled) => Some(*enabled),
            _ => None,
        })
    }

    pub fn last_set_routes_reason(&self) -> Option<RouteChangeCode> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            EngineCall::SetRoutes { reason, .. } => Some(*reason),
            _ => None,
        })
    }

    pub fn is_subscribed(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn sink(&self) -> NotificationSink {
        self.sink.lock().clone().expect("navigator subscribed a sink")
    }

    pub fn push_status(&self, status: NavigationStatus) {
        self.sink().push_status(status);
    }

    pub fn notify(&self, kind: NotificationKind, payload: Value) {
        self.sink().notify(kind, payload);
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl NavigationEngine for FakeEngine {
    async fn set_routes(&self, request: SetRoutesRequest) -> Result<SetRoutesOutcome, EngineError> {
        let route_id = request.routes.main_route().id.clone();
        self.record(EngineCall::SetRoutes {
            route_id: route_id.clone(),
            session_id: request.session_id.clone(),
            leg_index: request.leg_index,
            reason: request.reason,
        });

        if self.hold.load(Ordering::SeqCst) {
            let (tx, rx) = oneshot::channel();
            self.held.lock().push((route_id, tx));
            return rx.await.unwrap_or(Err(EngineError::Unavailable));
        }
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        let alternatives = self.alternatives.lock().clone().unwrap_or_else(|| {
            request
                .routes
                .alternatives()
                .iter()
                .map(|alt| NativeAlternative {
                    id: alt.id,
                    route: alt.route.clone(),
                })
                .collect()
        });
        Ok(SetRoutesOutcome { alternatives })
    }

    async fn unset_routes(&self, session_id: &BillingSessionId) -> Result<(), EngineError> {
        self.record(EngineCall::UnsetRoutes(session_id.clone()));
        Ok(())
    }

    async fn update_route_leg(&self, leg_index: usize) -> bool {
        if self.reject_legs.load(Ordering::SeqCst) {
            return false;
        }
        self.record(EngineCall::UpdateRouteLeg(leg_index));
        true
    }

    fn pause(&self) {
        self.record(EngineCall::Pause);
    }

    fn resume(&self) {
        self.record(EngineCall::Resume);
    }

    fn update_location(&self, _location: Location) {
        self.record(EngineCall::UpdateLocation);
    }

    fn update_heading(&self, _heading: Heading) {
        self.record(EngineCall::UpdateHeading);
    }

    fn set_rerouting_enabled(&self, enabled: bool) {
        self.record(EngineCall::SetReroutingEnabled(enabled));
    }

    fn start_updating_electronic_horizon(&self, config: ElectronicHorizonConfig) {
        self.record(EngineCall::StartHorizon(config));
    }

    fn stop_updating_electronic_horizon(&self) {
        self.record(EngineCall::StopHorizon);
    }

    fn subscribe(&self, sink: NotificationSink) {
        *self.sink.lock() = Some(sink);
    }
}

// ── Policies ──

pub(crate) struct StaticApproval {
    answer: bool,
    asked: Mutex<Vec<usize>>,
}

impl StaticApproval {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<usize> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl LegAdvanceApproval for StaticApproval {
    async fn should_advance(&self, arrived_leg_index: usize) -> bool {
        self.asked.lock().push(arrived_leg_index);
        self.answer
    }
}

/// Always restarts and counts how often it was asked.
pub(crate) struct CountingPolicy {
    pub calls: AtomicUsize,
}

impl CountingPolicy {
    pub fn always() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl BillingRestartPolicy for CountingPolicy {
    fn should_restart(&self, _route_distance: f64, _remaining_waypoints: usize) -> bool {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}

// ── Fixtures ──

pub(crate) fn test_settings() -> Arc<NavigatorSettings> {
    Arc::new(NavigatorSettings::default())
}

pub(crate) fn test_navigator(engine: &Arc<FakeEngine>) -> Navigator {
    NavigatorBuilder::new(engine.clone())
        .settings(test_settings())
        .build()
}

fn waypoint(name: String, lat: f64) -> Waypoint {
    Waypoint {
        name: Some(name),
        coordinate: Coordinate::new(lat, 13.4),
    }
}

/// Route with one leg per entry of `legs`, each with that many 100 m steps.
pub(crate) fn route(id: &str, legs: &[usize]) -> Route {
    let legs: Vec<RouteLeg> = legs
        .iter()
        .enumerate()
        .map(|(i, &steps)| RouteLeg {
            source: waypoint(format!("wp-{i}"), 52.0 + i as f64 * 0.01),
            destination: waypoint(format!("wp-{}", i + 1), 52.0 + (i + 1) as f64 * 0.01),
            steps: (0..steps)
                .map(|s| RouteStep {
                    instruction: format!("step {s}"),
                    distance: 100.0,
                    expected_travel_time: 10.0,
                })
                .collect(),
            distance: 100.0 * steps as f64,
            expected_travel_time: 10.0 * steps as f64,
        })
        .collect();
    let distance = legs.iter().map(|l| l.distance).sum();
    let expected_travel_time = legs.iter().map(|l| l.expected_travel_time).sum();
    Route {
        id: RouteId::from(id),
        origin: RouteOrigin::Online,
        legs,
        distance,
        expected_travel_time,
    }
}

pub(crate) fn routes(id: &str, legs: &[usize]) -> Arc<NavigationRoutes> {
    Arc::new(NavigationRoutes::single(route(id, legs)))
}

pub(crate) fn routes_with_alternatives(
    id: &str,
    legs: &[usize],
    alternatives: &[(u32, &str)],
) -> NavigationRoutes {
    let main = route(id, legs);
    let alternatives = alternatives
        .iter()
        .map(|&(alt_id, alt_name)| AlternativeRoute::relative_to(&main, alt_id, route(alt_name, legs)))
        .collect();
    NavigationRoutes::new(main, alternatives)
}

/// `RoutesPayload` JSON for a single-route snapshot.
pub(crate) fn routes_payload(id: &str, legs: &[usize]) -> Value {
    json!({ "mainRoute": route(id, legs), "alternatives": [], "legIndex": 0 })
}

pub(crate) fn status(route_state: RouteState, leg_index: usize, step_index: usize) -> NavigationStatus {
    let location = Location::now(Coordinate::new(52.0, 13.4));
    NavigationStatus {
        route_state,
        leg_index,
        step_index,
        distance_remaining: 500.0,
        duration_remaining: 50.0,
        distance_traveled: 100.0,
        map_matched_location: Some(location.clone()),
        location,
        road_name: None,
        speed_limit_kph: None,
        spoken_instruction: None,
        visual_instruction: None,
        is_fallback: false,
    }
}

pub(crate) fn instruction(text: &str) -> SpokenInstruction {
    SpokenInstruction {
        text: text.to_owned(),
        ssml: None,
        distance_along_step: 50.0,
    }
}

// ── Timing ──

/// Poll `condition` until it holds, failing after two seconds.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 2s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Give spawned tasks a moment to run.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
