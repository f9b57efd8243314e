//! Session repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::session::{Session, SessionStatus};
use crate::{AppError, Result};

/// Repository wrapper around `SQLite` for session records.
#[derive(Clone)]
pub struct SessionRepo {
    pool: Arc<SqlitePool>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    job_reference: String,
    resume_reference: String,
    status: String,
    current_step: Option<String>,
    current_thought: Option<String>,
    screenshot_location: Option<String>,
    tab_index: Option<i64>,
    error_detail: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl SessionRow {
    /// Convert a database row into the domain model.
    fn into_session(self) -> Result<Session> {
        let status = parse_status(&self.status)?;
        let created_at = parse_timestamp(&self.created_at, "created_at")?;
        let updated_at = parse_timestamp(&self.updated_at, "updated_at")?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|s| parse_timestamp(s, "completed_at"))
            .transpose()?;

        Ok(Session {
            id: self.id,
            job_reference: self.job_reference,
            resume_reference: self.resume_reference,
            status,
            current_step: self.current_step,
            current_thought: self.current_thought,
            screenshot_location: self.screenshot_location,
            tab_index: self.tab_index,
            error_detail: self.error_detail,
            created_at,
            updated_at,
            completed_at,
        })
    }
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AppError::Db(format!("invalid {field}: {err}")))
}

fn parse_status(s: &str) -> Result<SessionStatus> {
    match s {
        "queued" => Ok(SessionStatus::Queued),
        "running" => Ok(SessionStatus::Running),
        "paused" => Ok(SessionStatus::Paused),
        "completed" => Ok(SessionStatus::Completed),
        "failed" => Ok(SessionStatus::Failed),
        other => Err(AppError::Db(format!("invalid session status: {other}"))),
    }
}

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Insert a new session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateSession` if a session with the same id
    /// already exists, or `AppError::Db` on any other insert failure.
    pub async fn create(&self, session: &Session) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO session \
             (id, job_reference, resume_reference, status, current_step, current_thought, \
              screenshot_location, tab_index, error_detail, created_at, updated_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&session.id)
        .bind(&session.job_reference)
        .bind(&session.resume_reference)
        .bind(session.status.as_str())
        .bind(&session.current_step)
        .bind(&session.current_thought)
        .bind(&session.screenshot_location)
        .bind(session.tab_index)
        .bind(&session.error_detail)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(session.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(self.pool.as_ref())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::DuplicateSession(format!("session {} already exists", session.id)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// Retrieve a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<Session> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM session WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.map_or_else(
            || Err(AppError::NotFound(format!("session {id} not found"))),
            SessionRow::into_session,
        )
    }

    /// Persist all mutable fields of a session record.
    ///
    /// Callers are expected to hold the per-session registry lock so that
    /// no two writers save the same record concurrently.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist, or
    /// `AppError::Db` on persistence failure.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let result = sqlx::query(
            "UPDATE session SET \
             status = ?2, current_step = ?3, current_thought = ?4, screenshot_location = ?5, \
             tab_index = ?6, error_detail = ?7, updated_at = ?8, completed_at = ?9 \
             WHERE id = ?1",
        )
        .bind(&session.id)
        .bind(session.status.as_str())
        .bind(&session.current_step)
        .bind(&session.current_thought)
        .bind(&session.screenshot_location)
        .bind(session.tab_index)
        .bind(&session.error_detail)
        .bind(session.updated_at.to_rfc3339())
        .bind(session.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "session {} not found",
                session.id
            )));
        }
        Ok(())
    }

    /// Bump only `updated_at`, marking ingestion activity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn touch(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE session SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now().to_rfc3339())
            .execute(self.pool.as_ref())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("session {id} not found")));
        }
        Ok(())
    }

    /// List sessions, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<Session>> {
        let rows: Vec<SessionRow> = if let Some(status) = status {
            sqlx::query_as("SELECT * FROM session WHERE status = ?1 ORDER BY created_at DESC")
                .bind(status.as_str())
                .fetch_all(self.pool.as_ref())
                .await?
        } else {
            sqlx::query_as("SELECT * FROM session ORDER BY created_at DESC")
                .fetch_all(self.pool.as_ref())
                .await?
        };
        rows.into_iter().map(SessionRow::into_session).collect()
    }
}
