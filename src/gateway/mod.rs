//! Session gateway: the HTTP boundary for agents, dashboards, and CLIs.
//!
//! Exposes session creation, status queries, event ingestion, live SSE
//! subscription, and control commands over an axum router sharing one
//! [`AppState`].

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sqlx::SqlitePool;

use crate::config::GlobalConfig;
use crate::orchestrator::control::{ControlPlane, SignalTable};
use crate::orchestrator::hub::BroadcastHub;
use crate::orchestrator::registry::SessionRegistry;
use crate::orchestrator::timeline::Timeline;
use crate::AppError;

pub mod routes;

pub use routes::router;

/// Shared application state accessible by all gateway handlers.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Session records and state machine.
    pub registry: Arc<SessionRegistry>,
    /// Append-only event log with live fan-out.
    pub timeline: Arc<Timeline>,
    /// Pause/resume/cancel command handling.
    pub control: Arc<ControlPlane>,
    /// Per-session fan-out topics.
    pub hub: Arc<BroadcastHub>,
}

/// Wire the orchestrator services over a connected pool.
#[must_use]
pub fn build_state(config: Arc<GlobalConfig>, pool: SqlitePool) -> Arc<AppState> {
    let pool = Arc::new(pool);
    let hub = Arc::new(BroadcastHub::new(config.subscriber_queue_capacity));
    let signals = Arc::new(SignalTable::new());
    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&pool),
        Arc::clone(&hub),
        Arc::clone(&signals),
    ));
    let timeline = Arc::new(Timeline::new(
        Arc::clone(&pool),
        Arc::clone(&registry),
        Arc::clone(&hub),
    ));
    let control = Arc::new(ControlPlane::new(
        Arc::clone(&registry),
        Arc::clone(&timeline),
        signals,
    ));

    Arc::new(AppState {
        config,
        registry,
        timeline,
        control,
        hub,
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateSession(_) | Self::InvalidTransition(_) | Self::InvalidState(_) => {
                StatusCode::CONFLICT
            }
            Self::SubscriberOverflow(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Config(_) | Self::Db(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
