//! Session model and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for an application session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created but the agent has not started yet.
    Queued,
    /// Agent actively working the application.
    Running,
    /// Suspended by an operator; the agent holds at its next safe point.
    Paused,
    /// Application submitted successfully. Terminal.
    Completed,
    /// Unrecoverable error, operator cancel, or inactivity timeout. Terminal.
    Failed,
}

impl SessionStatus {
    /// Whether this status is terminal (no outgoing edges).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable string form, matching the persisted representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One automated attempt to apply to a single job posting with a single resume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique record identifier; immutable after creation.
    pub id: String,
    /// Target job posting in the external job catalog.
    pub job_reference: String,
    /// Resume variant used for this attempt.
    pub resume_reference: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Latest human-readable step description; overwritten on each update.
    pub current_step: Option<String>,
    /// Latest agent reasoning snippet; overwritten on each update.
    pub current_thought: Option<String>,
    /// Location reference for the agent's most recent screenshot.
    pub screenshot_location: Option<String>,
    /// Browser tab index for remote-viewing focus.
    pub tab_index: Option<i64>,
    /// Failure detail; set only when status is `failed`.
    pub error_detail: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Bumped on every transition or field mutation.
    pub updated_at: DateTime<Utc>,
    /// Set exactly when the session reaches a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Construct a new queued session, generating an identifier when the
    /// caller does not supply one.
    #[must_use]
    pub fn new(job_reference: String, resume_reference: String, id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            job_reference,
            resume_reference,
            status: SessionStatus::Queued,
            current_step: None,
            current_thought: None,
            screenshot_location: None,
            tab_index: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Edges: `queued → {running, failed}`, `running → {paused, completed,
    /// failed}`, `paused → {running, failed}`. Terminal states have no
    /// outgoing edges.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (SessionStatus::Queued, SessionStatus::Running)
                | (
                    SessionStatus::Running,
                    SessionStatus::Paused | SessionStatus::Completed
                )
                | (SessionStatus::Paused, SessionStatus::Running)
                | (
                    SessionStatus::Queued | SessionStatus::Running | SessionStatus::Paused,
                    SessionStatus::Failed
                )
        )
    }
}
