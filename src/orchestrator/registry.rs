//! Session registry: single writer for session records.
//!
//! All status transitions and progress writes go through here, guarded by
//! a per-session exclusive lock so that two concurrent writers (an agent's
//! completion report racing an operator's pause) can never produce an
//! inconsistent record. The control plane borrows the same lock for its
//! multi-step operations. The lock covers only the validate-and-write
//! step, never any subscriber I/O.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::session::{Session, SessionStatus};
use crate::persistence::session_repo::SessionRepo;
use crate::{AppError, Result};

use super::control::SignalTable;
use super::hub::BroadcastHub;
use super::locks::LockTable;

/// Partial overwrite of a session's progress snapshot fields.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProgressUpdate {
    /// Latest human-readable step description.
    #[serde(default)]
    pub current_step: Option<String>,
    /// Latest agent reasoning snippet.
    #[serde(default)]
    pub current_thought: Option<String>,
    /// Location reference for the most recent screenshot.
    #[serde(default)]
    pub screenshot_location: Option<String>,
    /// Browser tab index for remote-viewing focus.
    #[serde(default)]
    pub tab_index: Option<i64>,
}

/// Registry owning all session records and their state machine.
pub struct SessionRegistry {
    repo: SessionRepo,
    locks: LockTable,
    hub: Arc<BroadcastHub>,
    signals: Arc<SignalTable>,
}

impl SessionRegistry {
    /// Create a registry backed by the shared pool.
    ///
    /// The registry holds the hub and signal table so a terminal
    /// transition can release every per-session resource in one place,
    /// regardless of which caller drove the transition.
    #[must_use]
    pub fn new(pool: Arc<SqlitePool>, hub: Arc<BroadcastHub>, signals: Arc<SignalTable>) -> Self {
        Self {
            repo: SessionRepo::new(pool),
            locks: LockTable::new(),
            hub,
            signals,
        }
    }

    /// Exclusive lock handle for a session, shared with the control plane
    /// so its transition + signal + event steps run as one atomic unit.
    #[must_use]
    pub(crate) fn lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks.lock_for(session_id)
    }

    /// Allocate a new session in `queued`.
    ///
    /// When `session_id` is supplied by the caller (so a client can open
    /// its live stream before the agent starts) it must be unused.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateSession` if the supplied id already
    /// exists, or `AppError::Db` on persistence failure.
    pub async fn create(
        &self,
        job_reference: String,
        resume_reference: String,
        session_id: Option<String>,
    ) -> Result<Session> {
        let session = Session::new(job_reference, resume_reference, session_id);
        self.repo.create(&session).await?;
        info!(
            session_id = %session.id,
            job_reference = %session.job_reference,
            "session created"
        );
        Ok(session)
    }

    /// Apply a validated status transition.
    ///
    /// `detail` becomes `error_detail` when the target status is `failed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session or
    /// `AppError::InvalidTransition` when the edge is not legal for the
    /// current status (including any transition out of a terminal state).
    pub async fn transition(
        &self,
        session_id: &str,
        new_status: SessionStatus,
        detail: Option<String>,
    ) -> Result<Session> {
        let lock = self.locks.lock_for(session_id);
        let _guard = lock.lock().await;
        self.transition_locked(session_id, new_status, detail).await
    }

    /// [`transition`](Self::transition) body; the caller holds the
    /// session's lock from [`lock`](Self::lock).
    pub(crate) async fn transition_locked(
        &self,
        session_id: &str,
        new_status: SessionStatus,
        detail: Option<String>,
    ) -> Result<Session> {
        let mut session = self.repo.get_by_id(session_id).await?;
        if !session.can_transition_to(new_status) {
            return Err(AppError::InvalidTransition(format!(
                "session {session_id}: {} -> {} is not a legal edge",
                session.status.as_str(),
                new_status.as_str()
            )));
        }
        self.apply(&mut session, new_status, detail).await?;
        Ok(session)
    }

    /// Apply a transition only when the session is currently in `expected`.
    ///
    /// Used by the control plane so that pausing a session that is not
    /// `running` (or resuming one that is not `paused`) fails loudly
    /// without any state change.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session,
    /// `AppError::InvalidState` when the current status differs from
    /// `expected`, or `AppError::InvalidTransition` for an illegal edge.
    pub async fn transition_from(
        &self,
        session_id: &str,
        expected: SessionStatus,
        new_status: SessionStatus,
        detail: Option<String>,
    ) -> Result<Session> {
        let lock = self.locks.lock_for(session_id);
        let _guard = lock.lock().await;
        self.transition_from_locked(session_id, expected, new_status, detail)
            .await
    }

    /// [`transition_from`](Self::transition_from) body; the caller holds
    /// the session's lock from [`lock`](Self::lock).
    pub(crate) async fn transition_from_locked(
        &self,
        session_id: &str,
        expected: SessionStatus,
        new_status: SessionStatus,
        detail: Option<String>,
    ) -> Result<Session> {
        let mut session = self.repo.get_by_id(session_id).await?;
        if session.status != expected {
            return Err(AppError::InvalidState(format!(
                "session {session_id} is {}, expected {}",
                session.status.as_str(),
                expected.as_str()
            )));
        }
        if !session.can_transition_to(new_status) {
            return Err(AppError::InvalidTransition(format!(
                "session {session_id}: {} -> {} is not a legal edge",
                session.status.as_str(),
                new_status.as_str()
            )));
        }
        self.apply(&mut session, new_status, detail).await?;
        Ok(session)
    }

    /// Overwrite progress snapshot fields without changing status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session or
    /// `AppError::InvalidState` when the session is already terminal.
    pub async fn update_progress(
        &self,
        session_id: &str,
        update: ProgressUpdate,
    ) -> Result<Session> {
        let lock = self.locks.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.repo.get_by_id(session_id).await?;
        if session.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "session {session_id} is {} and immutable",
                session.status.as_str()
            )));
        }

        if let Some(step) = update.current_step {
            session.current_step = Some(step);
        }
        if let Some(thought) = update.current_thought {
            session.current_thought = Some(thought);
        }
        if let Some(location) = update.screenshot_location {
            session.screenshot_location = Some(location);
        }
        if let Some(tab) = update.tab_index {
            session.tab_index = Some(tab);
        }
        session.updated_at = Utc::now();

        self.repo.save(&session).await?;
        Ok(session)
    }

    /// Retrieve a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.repo.get_by_id(session_id).await
    }

    /// List sessions, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<Session>> {
        self.repo.list(status).await
    }

    /// Record ingestion activity by bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub(crate) async fn touch(&self, session_id: &str) -> Result<()> {
        self.repo.touch(session_id).await
    }

    /// Write the validated status change, setting terminal bookkeeping.
    ///
    /// A terminal transition releases every per-session resource: the lock
    /// entry, the fan-out topic (ending live streams once queued events
    /// drain), and the pause signal (tripped so a waiting agent wakes).
    async fn apply(
        &self,
        session: &mut Session,
        new_status: SessionStatus,
        detail: Option<String>,
    ) -> Result<()> {
        let previous = session.status;
        let now = Utc::now();
        session.status = new_status;
        session.updated_at = now;

        if new_status.is_terminal() {
            session.completed_at = Some(now);
        }
        if new_status == SessionStatus::Failed {
            session.error_detail = Some(
                detail
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| "unspecified failure".to_owned()),
            );
        }

        self.repo.save(session).await?;

        if new_status.is_terminal() {
            self.locks.release(&session.id);
            self.hub.prune(&session.id);
            self.signals.release(&session.id);
        }

        info!(
            session_id = %session.id,
            from = previous.as_str(),
            to = new_status.as_str(),
            "session transitioned"
        );
        Ok(())
    }
}
