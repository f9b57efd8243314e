//! Timeline service: durable append with atomic live fan-out.
//!
//! Composes the append-only store with the broadcast hub so that, from a
//! caller's perspective, append and notify happen as one step: the
//! session's publish lock is held across the durable insert and the
//! fan-out. Fan-out can never fail an append.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::debug;

use crate::models::timeline::{EventType, TimelineEvent};
use crate::persistence::timeline_repo::TimelineRepo;
use crate::{AppError, Result};

use super::hub::{BroadcastHub, EventStream};
use super::registry::SessionRegistry;

/// Snapshot-plus-live-stream handle returned by [`Timeline::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    /// Every event up to the atomically captured tail position.
    pub snapshot: Vec<TimelineEvent>,
    /// Yields every event appended after the snapshot boundary, in order,
    /// with no gap and no duplicate.
    pub stream: EventStream,
}

/// Append-only event log per session, with per-session live fan-out.
pub struct Timeline {
    repo: TimelineRepo,
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
}

impl Timeline {
    /// Create the timeline service over the shared pool, registry, and hub.
    #[must_use]
    pub fn new(pool: Arc<SqlitePool>, registry: Arc<SessionRegistry>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            repo: TimelineRepo::new(pool),
            registry,
            hub,
        }
    }

    /// Durably append an event and fan it out to live subscribers.
    ///
    /// Also bumps the session's `updated_at`, marking ingestion activity
    /// for the stale-session sweep.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is unknown,
    /// `AppError::InvalidState` if it is terminal (the timeline is frozen),
    /// or `AppError::Db` on persistence failure. Subscriber-side failures
    /// never fail the append.
    pub async fn append(
        &self,
        session_id: &str,
        event_type: EventType,
        content: &str,
        metadata: Option<serde_json::Value>,
        screenshot_location: Option<String>,
    ) -> Result<TimelineEvent> {
        // Ingestion against an unknown or terminal session is rejected
        // back to the agent; a frozen timeline must not regain a fan-out
        // topic either.
        let session = self.registry.get(session_id).await?;
        if session.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "session {session_id} is {} and its timeline is frozen",
                session.status.as_str()
            )));
        }

        let topic = self.hub.topic(session_id);
        let _guard = topic.lock().await;

        let event = self
            .repo
            .append(session_id, event_type, content, metadata, screenshot_location)
            .await?;
        self.registry.touch(session_id).await?;
        topic.fanout(&event);

        debug!(
            session_id,
            sequence = event.sequence,
            event_type = event.event_type.as_str(),
            "timeline event appended"
        );
        Ok(event)
    }

    /// Replay events in sequence order, optionally from a catch-up point
    /// (`since_seq` exclusive).
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is unknown, or
    /// `AppError::Db` if the query fails.
    pub async fn list(
        &self,
        session_id: &str,
        since_seq: Option<i64>,
    ) -> Result<Vec<TimelineEvent>> {
        self.registry.get(session_id).await?;
        self.repo.list_since(session_id, since_seq).await
    }

    /// Atomically capture the timeline tail and attach a live stream.
    ///
    /// The publish lock is held across the snapshot read and the sink
    /// registration, so no event appended concurrently can be missed or
    /// delivered twice relative to the snapshot boundary. A terminal
    /// session yields its full snapshot with a stream that ends
    /// immediately, without recreating a fan-out topic.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is unknown, or
    /// `AppError::Db` if the snapshot read fails.
    pub async fn subscribe(
        &self,
        session_id: &str,
        since_seq: Option<i64>,
    ) -> Result<Subscription> {
        let session = self.registry.get(session_id).await?;
        if session.status.is_terminal() {
            let snapshot = self.repo.list_since(session_id, since_seq).await?;
            return Ok(Subscription {
                snapshot,
                stream: EventStream::closed(),
            });
        }

        let topic = self.hub.topic(session_id);
        let _guard = topic.lock().await;

        let snapshot = self.repo.list_since(session_id, since_seq).await?;
        let stream = topic.attach(self.hub.queue_capacity());

        debug!(
            session_id,
            snapshot_len = snapshot.len(),
            "subscriber attached"
        );
        Ok(Subscription { snapshot, stream })
    }
}
