//! Timeline event repository for `SQLite` persistence.
//!
//! The `timeline_event` table is append-only: no code path updates or
//! deletes rows once written. Sequence numbers are dense (1..=N) per
//! session; callers serialize appends for the same session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::timeline::{EventType, TimelineEvent};
use crate::{AppError, Result};

/// Repository wrapper around `SQLite` for timeline event records.
#[derive(Clone)]
pub struct TimelineRepo {
    pool: Arc<SqlitePool>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct EventRow {
    session_id: String,
    seq: i64,
    event_type: String,
    timestamp: String,
    content: String,
    metadata: Option<String>,
    screenshot_location: Option<String>,
}

impl EventRow {
    /// Convert a database row into the domain model.
    fn into_event(self) -> Result<TimelineEvent> {
        let event_type = parse_event_type(&self.event_type)?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| AppError::Db(format!("invalid timestamp: {err}")))?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|err| AppError::Db(format!("invalid metadata json: {err}")))?;

        Ok(TimelineEvent {
            session_id: self.session_id,
            sequence: self.seq,
            event_type,
            timestamp,
            content: self.content,
            metadata,
            screenshot_location: self.screenshot_location,
        })
    }
}

fn parse_event_type(s: &str) -> Result<EventType> {
    match s {
        "thought" => Ok(EventType::Thought),
        "tool_call" => Ok(EventType::ToolCall),
        "screenshot" => Ok(EventType::Screenshot),
        "error" => Ok(EventType::Error),
        "pause" => Ok(EventType::Pause),
        "resume" => Ok(EventType::Resume),
        other => Err(AppError::Db(format!("invalid event type: {other}"))),
    }
}

impl TimelineRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Durably append an event, assigning its timestamp and the next dense
    /// sequence number for the session.
    ///
    /// The sequence subquery and the insert execute as one statement, so
    /// appends for different sessions never contend. Appends for the same
    /// session must be serialized by the caller to keep sequences dense.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails or the metadata cannot be
    /// serialized.
    pub async fn append(
        &self,
        session_id: &str,
        event_type: EventType,
        content: &str,
        metadata: Option<serde_json::Value>,
        screenshot_location: Option<String>,
    ) -> Result<TimelineEvent> {
        let timestamp = Utc::now();
        let metadata_text = metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| AppError::Db(format!("failed to serialize metadata: {err}")))?;

        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO timeline_event \
             (session_id, seq, event_type, timestamp, content, metadata, screenshot_location) \
             VALUES (?1, \
                     (SELECT COALESCE(MAX(seq), 0) + 1 FROM timeline_event WHERE session_id = ?1), \
                     ?2, ?3, ?4, ?5, ?6) \
             RETURNING seq",
        )
        .bind(session_id)
        .bind(event_type.as_str())
        .bind(timestamp.to_rfc3339())
        .bind(content)
        .bind(metadata_text)
        .bind(&screenshot_location)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(TimelineEvent {
            session_id: session_id.to_owned(),
            sequence: seq,
            event_type,
            timestamp,
            content: content.to_owned(),
            metadata,
            screenshot_location,
        })
    }

    /// List events for a session in sequence order, optionally only those
    /// after `since_seq` (exclusive) for reconnect catch-up.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_since(
        &self,
        session_id: &str,
        since_seq: Option<i64>,
    ) -> Result<Vec<TimelineEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT * FROM timeline_event \
             WHERE session_id = ?1 AND seq > ?2 ORDER BY seq ASC",
        )
        .bind(session_id)
        .bind(since_seq.unwrap_or(0))
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.into_iter().map(EventRow::into_event).collect()
    }
}
