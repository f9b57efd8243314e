//! Gateway route handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::models::session::{Session, SessionStatus};
use crate::models::timeline::{EventType, TimelineEvent};
use crate::orchestrator::registry::ProgressUpdate;
use crate::orchestrator::timeline::Subscription;
use crate::AppError;

use super::AppState;

/// Build the gateway router over shared state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/events", post(ingest_event).get(list_events))
        .route("/sessions/{id}/progress", post(update_progress))
        .route("/sessions/{id}/transition", post(transition_session))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/cancel", post(cancel_session))
        .route("/sessions/{id}/stream", get(stream_session))
        .with_state(state)
}

/// Liveness probe, usable without touching the database.
async fn health() -> &'static str {
    "ok"
}

/// Body for `POST /sessions`.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Target job posting reference.
    pub job_reference: String,
    /// Resume variant reference.
    pub resume_reference: String,
    /// Optional caller-supplied id, letting a client open its live stream
    /// before the agent starts.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Query for `GET /sessions`.
#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    /// Restrict to a single status.
    #[serde(default)]
    pub status: Option<SessionStatus>,
}

/// Body for `POST /sessions/{id}/events`.
#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    /// Kind of fact recorded.
    pub event_type: EventType,
    /// Human-readable description.
    pub content: String,
    /// Open payload, shape depends on `event_type`.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Location reference for `screenshot` events.
    #[serde(default)]
    pub screenshot_location: Option<String>,
}

/// Body for `POST /sessions/{id}/transition`.
///
/// Accepts agent-facing targets only: activation (`running`, from
/// `queued`) and terminal reports. Pause and resume go through the
/// control endpoints so their events and signals cannot be bypassed.
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    /// Target status.
    pub status: SessionStatus,
    /// Failure detail when transitioning to `failed`.
    #[serde(default)]
    pub detail: Option<String>,
}

/// Body for `POST /sessions/{id}/pause`.
#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    /// Why the operator paused (e.g. "needs CAPTCHA").
    pub reason: String,
}

/// Body for `POST /sessions/{id}/resume`.
#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    /// Optional operator note recorded on the `resume` event.
    #[serde(default)]
    pub message: Option<String>,
}

/// Body for `POST /sessions/{id}/cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Optional abort reason recorded as `error_detail`.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query for event replay and live streams.
#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    /// Exclusive catch-up position; events with a higher sequence are
    /// returned.
    #[serde(default)]
    pub since_sequence: Option<i64>,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = state
        .registry
        .create(req.job_reference, req.resume_reference, req.session_id)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<Session>>, AppError> {
    let sessions = state.registry.list(query.status).await?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    let session = state.registry.get(&id).await?;
    Ok(Json(session))
}

async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<IngestEventRequest>,
) -> Result<(StatusCode, Json<TimelineEvent>), AppError> {
    let event = state
        .timeline
        .append(
            &id,
            req.event_type,
            &req.content,
            req.metadata,
            req.screenshot_location,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<Vec<TimelineEvent>>, AppError> {
    let events = state.timeline.list(&id, query.since_sequence).await?;
    Ok(Json(events))
}

async fn update_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<Session>, AppError> {
    let session = state.registry.update_progress(&id, update).await?;
    Ok(Json(session))
}

async fn transition_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<Session>, AppError> {
    let session = match req.status {
        SessionStatus::Paused => {
            return Err(AppError::InvalidState(
                "pause and resume go through the pause/resume endpoints".into(),
            ))
        }
        SessionStatus::Running => {
            state
                .registry
                .transition_from(&id, SessionStatus::Queued, SessionStatus::Running, None)
                .await?
        }
        _ => state.registry.transition(&id, req.status, req.detail).await?,
    };
    Ok(Json(session))
}

async fn pause_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PauseRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state.control.pause(&id, &req.reason).await?;
    Ok(Json(session))
}

async fn resume_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ResumeRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state.control.resume(&id, req.message.as_deref()).await?;
    Ok(Json(session))
}

async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state.control.cancel(&id, req.reason.as_deref()).await?;
    Ok(Json(session))
}

/// Live SSE stream: the atomically captured snapshot first, then every
/// subsequent event, gap-free relative to the snapshot boundary.
///
/// `id:` carries the sequence number so a client can reconnect with
/// `since_sequence` catch-up; an overflowed subscriber receives a final
/// `overflow` event before the stream closes.
async fn stream_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SinceQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Subscription { snapshot, stream } = state
        .timeline
        .subscribe(&id, query.since_sequence)
        .await?;

    let snapshot_stream = stream::iter(snapshot).map(|event| Ok(sse_event(&event)));
    let live_stream = stream::unfold(stream, |mut live| async move {
        match live.recv().await {
            Some(Ok(event)) => Some((Ok(sse_event(&event)), live)),
            Some(Err(err)) => Some((
                Ok(Event::default().event("overflow").data(err.to_string())),
                live,
            )),
            None => None,
        }
    });

    Ok(Sse::new(snapshot_stream.chain(live_stream)).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &TimelineEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_owned());
    Event::default()
        .id(event.sequence.to_string())
        .event(event.event_type.as_str())
        .data(data)
}
