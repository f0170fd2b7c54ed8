//! State shared by the navigator, coordinator and dispatcher.
//!
//! All mutable session, route and progress state lives in one
//! [`NavigatorState`] behind a `parking_lot` mutex that is never held across
//! an await. Snapshots are published while the lock is held, so subscribers
//! observe them in the order they were committed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};
use trek_core::{NavigationRoutes, NavigatorError, RouteId, RouteProgress, Session};
use trek_settings::NavigatorSettings;

use crate::billing::{BillingRestartPolicy, BillingSessionManager};
use crate::engine::NavigationEngine;
use crate::progress::{LegAdvanceApproval, ProgressTracker};
use crate::publishers::Publishers;
use crate::tasks::TaskManager;

pub(crate) struct NavigatorState {
    pub session: Session,
    pub routes: Option<Arc<NavigationRoutes>>,
    pub progress: Option<RouteProgress>,
    pub tracker: ProgressTracker,
    /// Route and remaining waypoints billing was last validated for.
    pub billing_key: Option<(RouteId, usize)>,
}

impl NavigatorState {
    /// Progress re-pointed at `routes`, keeping indices if the main route is unchanged.
    pub fn carried_progress(&self, routes: &Arc<NavigationRoutes>, leg_index: usize) -> RouteProgress {
        match &self.progress {
            Some(progress) if progress.routes.main_route().id == routes.main_route().id => {
                progress.with_routes(Arc::clone(routes))
            }
            _ => RouteProgress::initial(Arc::clone(routes), leg_index),
        }
    }
}

pub(crate) struct Shared {
    pub engine: Arc<dyn NavigationEngine>,
    pub settings: Arc<NavigatorSettings>,
    pub tasks: TaskManager,
    pub billing: BillingSessionManager,
    pub publishers: Publishers,
    pub approval: Option<Arc<dyn LegAdvanceApproval>>,
    pub state: Mutex<NavigatorState>,
    /// Bumped by every `set_routes`; results from older calls are dropped.
    pub mutation_generation: AtomicU64,
    ingestion: AtomicBool,
}

impl Shared {
    pub fn new(
        engine: Arc<dyn NavigationEngine>,
        settings: Arc<NavigatorSettings>,
        policy: Arc<dyn BillingRestartPolicy>,
        approval: Option<Arc<dyn LegAdvanceApproval>>,
    ) -> Self {
        Self {
            tasks: TaskManager::new(),
            billing: BillingSessionManager::new(policy),
            publishers: Publishers::new(settings.channels.event_capacity),
            state: Mutex::new(NavigatorState {
                session: Session::Idle,
                routes: None,
                progress: None,
                tracker: ProgressTracker::new(&settings.tracker),
                billing_key: None,
            }),
            mutation_generation: AtomicU64::new(0),
            ingestion: AtomicBool::new(false),
            engine,
            settings,
            approval,
        }
    }

    pub fn set_session(&self, state: &mut NavigatorState, session: Session) {
        if state.session != session {
            debug!(from = %state.session, to = %session, "session transition");
        }
        state.session = session;
        self.publishers.session.publish(session);
    }

    /// Publish a new snapshot and its progress. A new main route resets the tracker.
    pub fn publish_routes(
        &self,
        state: &mut NavigatorState,
        routes: Arc<NavigationRoutes>,
        progress: RouteProgress,
    ) {
        let main_changed = state
            .routes
            .as_ref()
            .is_none_or(|current| current.main_route().id != routes.main_route().id);
        if main_changed {
            state.tracker.reset();
        }
        state.routes = Some(Arc::clone(&routes));
        state.progress = Some(progress.clone());
        self.publishers.routes.publish(Some(routes));
        self.publishers.route_progress.publish(Some(progress));
    }

    pub fn publish_progress(&self, state: &mut NavigatorState, progress: RouteProgress) {
        state.progress = Some(progress.clone());
        self.publishers.route_progress.publish(Some(progress));
    }

    pub fn clear_routes(&self, state: &mut NavigatorState) {
        state.routes = None;
        state.progress = None;
        state.billing_key = None;
        state.tracker.reset();
        self.publishers.routes.publish(None);
        self.publishers.route_progress.publish(None);
    }

    /// Log and emit `error`, handing it back for the caller's `Err`.
    pub fn report(&self, error: NavigatorError) -> NavigatorError {
        warn!(error = %error, category = error.category(), "navigator error");
        let _ = self.publishers.errors.emit(error.clone());
        error
    }

    pub fn set_ingestion(&self, enabled: bool) {
        self.ingestion.store(enabled, Ordering::SeqCst);
    }

    pub fn ingestion_enabled(&self) -> bool {
        self.ingestion.load(Ordering::SeqCst)
    }

    pub fn mutation_generation(&self) -> u64 {
        self.mutation_generation.load(Ordering::SeqCst)
    }
}
