//! Stale-session sweep for silently dead agents.
//!
//! Runs as a background task. On each tick it fails every `running`
//! session with no ingestion activity past the configured idle threshold,
//! going through the control plane's atomic failure path so a session
//! that completes mid-sweep is left untouched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SweepConfig;
use crate::models::session::SessionStatus;
use crate::Result;

use super::control::ControlPlane;
use super::registry::SessionRegistry;

/// Spawn the stale-session sweep background task.
#[must_use]
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    control: Arc<ControlPlane>,
    config: SweepConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.interval_seconds));
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("stale-session sweep shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match sweep_once(&registry, &control, config.idle_threshold_seconds).await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "stale sessions failed by sweep"),
                        Err(err) => error!(%err, "stale-session sweep failed"),
                    }
                }
            }
        }
    })
}

/// Run one sweep pass; returns how many sessions were timed out.
///
/// A threshold beyond the representable datetime range sweeps nothing
/// rather than failing.
///
/// # Errors
///
/// Returns `AppError::Db` if the running-session listing fails. Per-session
/// transition races are logged and skipped, never propagated.
pub async fn sweep_once(
    registry: &SessionRegistry,
    control: &ControlPlane,
    idle_threshold_seconds: u64,
) -> Result<usize> {
    let seconds = i64::try_from(idle_threshold_seconds).unwrap_or(i64::MAX);
    let Some(cutoff) = chrono::Duration::try_seconds(seconds)
        .and_then(|threshold| Utc::now().checked_sub_signed(threshold))
    else {
        return Ok(0);
    };

    let running = registry.list(Some(SessionStatus::Running)).await?;
    let mut swept = 0usize;

    for session in running {
        if session.updated_at >= cutoff {
            continue;
        }

        let detail = format!(
            "timed out after {idle_threshold_seconds}s without ingestion activity"
        );
        // Same validation path as an operator cancel: a session that
        // changed between the listing and here is skipped.
        match control
            .fail_with_event(
                &session.id,
                &detail,
                json!({ "idle_threshold_seconds": idle_threshold_seconds }),
            )
            .await
        {
            Ok(_) => {
                warn!(session_id = %session.id, "stale session failed by sweep");
                swept += 1;
            }
            Err(err) => {
                debug!(session_id = %session.id, %err, "skipping session changed mid-sweep");
            }
        }
    }

    Ok(swept)
}
