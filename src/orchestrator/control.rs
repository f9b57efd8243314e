//! Control plane: pause, resume, and cancel for running sessions.
//!
//! Pause is cooperative, not preemptive. Each operation holds the
//! session's registry lock across the status transition, the signal
//! flip, and the timeline event, so two racing control commands can
//! never leave the timeline ordering or the signal out of step with the
//! status. The agent's actual suspension is best-effort and may lag by
//! one action.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span};

use crate::models::session::{Session, SessionStatus};
use crate::models::timeline::EventType;
use crate::{AppError, Result};

use super::registry::SessionRegistry;
use super::timeline::Timeline;

/// Cooperative pause handle polled by an agent task between actions.
///
/// A `CancellationToken` cannot be un-cancelled, so resume swaps in a
/// fresh token behind this handle rather than reusing the old one.
#[derive(Clone)]
pub struct PauseSignal {
    inner: Arc<RwLock<CancellationToken>>,
}

impl PauseSignal {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(CancellationToken::new())),
        }
    }

    fn current(&self) -> CancellationToken {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn trip(&self) {
        self.current().cancel();
    }

    fn reset(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();
    }

    /// Whether a pause is currently requested. Agents check this between
    /// discrete automation actions, never mid-action.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.current().is_cancelled()
    }

    /// Wait until a pause is requested.
    pub async fn paused(&self) {
        self.current().cancelled_owned().await;
    }
}

/// Shared map of per-session pause signals.
///
/// Entries are created on first use and removed when the session reaches
/// a terminal status; removal trips the signal so a waiting agent task
/// wakes and observes the terminal state.
pub struct SignalTable {
    signals: StdMutex<HashMap<String, PauseSignal>>,
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalTable {
    /// Create an empty signal table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signals: StdMutex::new(HashMap::new()),
        }
    }

    /// Fetch (or create) the signal for a session.
    #[must_use]
    pub fn signal_for(&self, session_id: &str) -> PauseSignal {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_owned())
            .or_insert_with(PauseSignal::new)
            .clone()
    }

    /// Drop the entry for a session that reached a terminal status,
    /// tripping it so any waiting agent wakes.
    pub(crate) fn release(&self, session_id: &str) {
        let signal = self
            .signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if let Some(signal) = signal {
            signal.trip();
        }
    }

    /// Number of tracked signals, for diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no signals are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accepts operator control commands and delivers signals to agent tasks.
pub struct ControlPlane {
    registry: Arc<SessionRegistry>,
    timeline: Arc<Timeline>,
    signals: Arc<SignalTable>,
}

impl ControlPlane {
    /// Create the control plane over the shared registry, timeline, and
    /// signal table.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        timeline: Arc<Timeline>,
        signals: Arc<SignalTable>,
    ) -> Self {
        Self {
            registry,
            timeline,
            signals,
        }
    }

    /// Hand out the pause signal for a session, creating it on first use.
    ///
    /// Called once by the agent task at start; operators reach the same
    /// signal through [`pause`](Self::pause) and [`resume`](Self::resume).
    #[must_use]
    pub fn register(&self, session_id: &str) -> PauseSignal {
        self.signals.signal_for(session_id)
    }

    /// Number of sessions with a live pause signal, for diagnostics.
    #[must_use]
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Pause a running session.
    ///
    /// Under the session's registry lock: transitions `running -> paused`,
    /// trips the agent's cancellation signal, and appends a `pause` event.
    /// The signal flips before the append, so a persistence failure cannot
    /// leave a paused session whose agent never got the signal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the session is not `running`,
    /// or `AppError::NotFound` if it is unknown.
    pub async fn pause(&self, session_id: &str, reason: &str) -> Result<Session> {
        let span = info_span!("pause_session", session_id);
        let _span = span.enter();

        let lock = self.registry.lock(session_id);
        let _guard = lock.lock().await;

        let session = self
            .registry
            .transition_from_locked(session_id, SessionStatus::Running, SessionStatus::Paused, None)
            .await?;
        self.signals.signal_for(session_id).trip();
        self.timeline
            .append(
                session_id,
                EventType::Pause,
                reason,
                Some(json!({ "reason": reason })),
                None,
            )
            .await?;

        info!(session_id, reason, "session paused");
        Ok(session)
    }

    /// Resume a paused session.
    ///
    /// Under the session's registry lock: transitions `paused -> running`,
    /// clears the pause signal, and appends a `resume` event. A resume can
    /// therefore never interleave inside an in-flight pause.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the session is not `paused`,
    /// or `AppError::NotFound` if it is unknown.
    pub async fn resume(&self, session_id: &str, message: Option<&str>) -> Result<Session> {
        let span = info_span!("resume_session", session_id);
        let _span = span.enter();

        let lock = self.registry.lock(session_id);
        let _guard = lock.lock().await;

        let session = self
            .registry
            .transition_from_locked(session_id, SessionStatus::Paused, SessionStatus::Running, None)
            .await?;
        self.signals.signal_for(session_id).reset();

        let content = message.unwrap_or("resumed by operator");
        self.timeline
            .append(
                session_id,
                EventType::Resume,
                content,
                Some(json!({ "message": message })),
                None,
            )
            .await?;

        info!(session_id, "session resumed");
        Ok(session)
    }

    /// Abort a session from any pre-terminal state.
    ///
    /// Fails the session with the operator's reason; the terminal
    /// transition releases the pause signal, waking any waiting agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the session is already
    /// terminal, or `AppError::NotFound` if it is unknown.
    pub async fn cancel(&self, session_id: &str, reason: Option<&str>) -> Result<Session> {
        let span = info_span!("cancel_session", session_id);
        let _span = span.enter();

        let detail = reason.unwrap_or("cancelled by operator");
        let session = self
            .fail_with_event(session_id, detail, json!({ "cancelled": true }))
            .await?;

        info!(session_id, detail, "session cancelled");
        Ok(session)
    }

    /// Fail a pre-terminal session, recording the `error` event before the
    /// terminal transition so live subscribers receive it before their
    /// streams close.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the session is already
    /// terminal, `AppError::NotFound` if it is unknown, or `AppError::Db`
    /// on persistence failure.
    pub(crate) async fn fail_with_event(
        &self,
        session_id: &str,
        detail: &str,
        metadata: serde_json::Value,
    ) -> Result<Session> {
        let lock = self.registry.lock(session_id);
        let _guard = lock.lock().await;

        let session = self.registry.get(session_id).await?;
        if !session.can_transition_to(SessionStatus::Failed) {
            return Err(AppError::InvalidTransition(format!(
                "session {session_id}: {} -> failed is not a legal edge",
                session.status.as_str()
            )));
        }

        self.timeline
            .append(session_id, EventType::Error, detail, Some(metadata), None)
            .await?;
        self.registry
            .transition_locked(session_id, SessionStatus::Failed, Some(detail.to_owned()))
            .await
    }
}
