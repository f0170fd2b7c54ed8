//! Billing session manager.
//!
//! At most one metered session exists at a time. Free drive and active
//! guidance are billed as separate session kinds: switching kinds always
//! stops the old session and starts a new one, while re-entering the same
//! kind resumes in place (active guidance may restart, see
//! [`BillingRestartPolicy`]).

use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trek_core::BillingSessionId;
use trek_settings::BillingSettings;

/// What a billing session is metering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    /// Tracking without a route.
    FreeDrive,
    /// Turn-by-turn guidance.
    ActiveGuidance,
}

impl BillingMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::FreeDrive => "free_drive",
            Self::ActiveGuidance => "active_guidance",
        }
    }
}

/// Whether the session is currently accruing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingRuntimeState {
    /// Accruing.
    Running,
    /// Kept but not accruing.
    Paused,
}

/// The single metered session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSession {
    /// Session id passed to the engine with every route mutation.
    pub id: BillingSessionId,
    /// What is being metered.
    pub mode: BillingMode,
    /// Running or paused.
    pub runtime_state: BillingRuntimeState,
}

impl BillingSession {
    fn start(mode: BillingMode) -> Self {
        let session = Self {
            id: BillingSessionId::generate(),
            mode,
            runtime_state: BillingRuntimeState::Running,
        };
        counter!("billing_sessions_started", "mode" => mode.as_str()).increment(1);
        info!(session_id = %session.id, mode = mode.as_str(), "billing session started");
        session
    }

    /// Whether the session is accruing.
    pub fn is_running(&self) -> bool {
        self.runtime_state == BillingRuntimeState::Running
    }
}

/// Decides whether continuing active guidance warrants a fresh session.
#[cfg_attr(test, mockall::automock)]
pub trait BillingRestartPolicy: Send + Sync {
    /// `true` to stop the current active-guidance session and start a new one.
    fn should_restart(&self, route_distance: f64, remaining_waypoints: usize) -> bool;
}

/// Restart policy driven by the optional thresholds in [`BillingSettings`].
///
/// Restarts when the route is at least `restart_min_distance_meters` long or
/// has at least `restart_min_remaining_waypoints` waypoints ahead. With
/// neither threshold configured it never restarts.
#[derive(Clone, Debug, Default)]
pub struct ThresholdRestartPolicy {
    min_distance: Option<f64>,
    min_remaining_waypoints: Option<usize>,
}

impl ThresholdRestartPolicy {
    /// Policy from settings.
    pub fn from_settings(settings: &BillingSettings) -> Self {
        if !settings.has_thresholds() {
            debug!("no billing restart thresholds configured, guidance sessions are never restarted");
        }
        Self {
            min_distance: settings.restart_min_distance_meters,
            min_remaining_waypoints: settings.restart_min_remaining_waypoints,
        }
    }
}

impl BillingRestartPolicy for ThresholdRestartPolicy {
    fn should_restart(&self, route_distance: f64, remaining_waypoints: usize) -> bool {
        let by_distance = self.min_distance.is_some_and(|min| route_distance >= min);
        let by_waypoints = self
            .min_remaining_waypoints
            .is_some_and(|min| remaining_waypoints >= min);
        by_distance || by_waypoints
    }
}

/// Outcome of [`BillingSessionManager::begin_free_drive`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FreeDriveBilling {
    /// The free-drive session now running.
    pub session_id: BillingSessionId,
    /// Active-guidance session that was stopped to make room, if any.
    pub replaced_guidance_session: Option<BillingSessionId>,
}

/// Owner of the single billing session slot.
pub struct BillingSessionManager {
    session: Mutex<Option<BillingSession>>,
    policy: Arc<dyn BillingRestartPolicy>,
}

impl BillingSessionManager {
    /// Empty slot using `policy` for active-guidance restarts.
    pub fn new(policy: Arc<dyn BillingRestartPolicy>) -> Self {
        Self {
            session: Mutex::new(None),
            policy,
        }
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Option<BillingSession> {
        self.session.lock().clone()
    }

    /// Id of the current session if it is running.
    pub fn running_session_id(&self) -> Option<BillingSessionId> {
        self.session
            .lock()
            .as_ref()
            .filter(|s| s.is_running())
            .map(|s| s.id.clone())
    }

    /// Whether a session of `mode` is running.
    pub fn is_running(&self, mode: BillingMode) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| s.mode == mode && s.is_running())
    }

    /// Ensure a running free-drive session.
    pub fn begin_free_drive(&self) -> FreeDriveBilling {
        let mut slot = self.session.lock();
        match slot.as_mut() {
            Some(session) if session.mode == BillingMode::FreeDrive => {
                if !session.is_running() {
                    debug!(session_id = %session.id, "resuming free-drive billing session");
                    session.runtime_state = BillingRuntimeState::Running;
                }
                FreeDriveBilling {
                    session_id: session.id.clone(),
                    replaced_guidance_session: None,
                }
            }
            Some(session) => {
                let old = session.id.clone();
                info!(session_id = %old, "stopping active-guidance billing session for free drive");
                let next = BillingSession::start(BillingMode::FreeDrive);
                let session_id = next.id.clone();
                *slot = Some(next);
                FreeDriveBilling {
                    session_id,
                    replaced_guidance_session: Some(old),
                }
            }
            None => {
                let next = BillingSession::start(BillingMode::FreeDrive);
                let session_id = next.id.clone();
                *slot = Some(next);
                FreeDriveBilling {
                    session_id,
                    replaced_guidance_session: None,
                }
            }
        }
    }

    /// Ensure a running active-guidance session, returning its id.
    ///
    /// An existing active-guidance session is kept (and resumed if paused)
    /// unless the restart policy asks for a fresh one.
    pub fn begin_active_guidance(
        &self,
        route_distance: f64,
        remaining_waypoints: usize,
    ) -> BillingSessionId {
        let mut slot = self.session.lock();
        if let Some(session) = slot.as_mut() {
            if session.mode == BillingMode::ActiveGuidance
                && !self.policy.should_restart(route_distance, remaining_waypoints)
            {
                if !session.is_running() {
                    debug!(session_id = %session.id, "resuming active-guidance billing session");
                    session.runtime_state = BillingRuntimeState::Running;
                }
                return session.id.clone();
            }
            info!(
                session_id = %session.id,
                mode = session.mode.as_str(),
                route_distance,
                remaining_waypoints,
                "replacing billing session"
            );
        }
        let next = BillingSession::start(BillingMode::ActiveGuidance);
        let id = next.id.clone();
        *slot = Some(next);
        id
    }

    /// Pause the current session. Returns whether a running session was paused.
    pub fn pause(&self) -> bool {
        let mut slot = self.session.lock();
        match slot.as_mut() {
            Some(session) if session.is_running() => {
                session.runtime_state = BillingRuntimeState::Paused;
                debug!(session_id = %session.id, "billing session paused");
                true
            }
            _ => false,
        }
    }

    /// Clear the slot, returning the stopped session's id.
    pub fn stop(&self) -> Option<BillingSessionId> {
        let stopped = self.session.lock().take()?;
        info!(session_id = %stopped.id, "billing session stopped");
        Some(stopped.id)
    }
}
