//! Stale-session sweep coverage, driven through `sweep_once` directly.

use std::sync::Arc;

use chrono::{Duration, Utc};

use applyflow::models::session::SessionStatus;
use applyflow::models::timeline::EventType;
use applyflow::orchestrator::sweeper::sweep_once;
use applyflow::persistence::session_repo::SessionRepo;

use super::test_helpers::test_state_with_pool;

#[tokio::test]
async fn idle_running_session_is_failed_with_timeout_detail() {
    let (state, pool) = test_state_with_pool(64).await;
    let session = state
        .registry
        .create("J1".into(), "R1".into(), None)
        .await
        .expect("create");
    let mut running = state
        .registry
        .transition(&session.id, SessionStatus::Running, None)
        .await
        .expect("activate");

    // Backdate the last ingestion activity past the idle threshold.
    running.updated_at = Utc::now() - Duration::seconds(600);
    let repo = SessionRepo::new(Arc::new(pool));
    repo.save(&running).await.expect("backdate");

    let swept = sweep_once(&state.registry, &state.control, 300)
        .await
        .expect("sweep");
    assert_eq!(swept, 1);

    let failed = state.registry.get(&session.id).await.expect("get");
    assert_eq!(failed.status, SessionStatus::Failed);
    assert!(failed.completed_at.is_some());
    assert_eq!(
        failed.error_detail.as_deref(),
        Some("timed out after 300s without ingestion activity")
    );

    let events = state.timeline.list(&session.id, None).await.expect("list");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Error);
}

#[tokio::test]
async fn fresh_running_session_is_left_alone() {
    let (state, _pool) = test_state_with_pool(64).await;
    let session = state
        .registry
        .create("J1".into(), "R1".into(), None)
        .await
        .expect("create");
    state
        .registry
        .transition(&session.id, SessionStatus::Running, None)
        .await
        .expect("activate");

    let swept = sweep_once(&state.registry, &state.control, 300)
        .await
        .expect("sweep");
    assert_eq!(swept, 0);

    let fetched = state.registry.get(&session.id).await.expect("get");
    assert_eq!(fetched.status, SessionStatus::Running);
}

#[tokio::test]
async fn paused_sessions_are_never_swept() {
    let (state, pool) = test_state_with_pool(64).await;
    let session = state
        .registry
        .create("J1".into(), "R1".into(), None)
        .await
        .expect("create");
    state
        .registry
        .transition(&session.id, SessionStatus::Running, None)
        .await
        .expect("activate");
    let mut paused = state
        .control
        .pause(&session.id, "waiting on operator")
        .await
        .expect("pause");

    // Even a long-idle paused session stays paused.
    paused.updated_at = Utc::now() - Duration::hours(2);
    let repo = SessionRepo::new(Arc::new(pool));
    repo.save(&paused).await.expect("backdate");

    let swept = sweep_once(&state.registry, &state.control, 300)
        .await
        .expect("sweep");
    assert_eq!(swept, 0);

    let fetched = state.registry.get(&session.id).await.expect("get");
    assert_eq!(fetched.status, SessionStatus::Paused);
}

#[tokio::test]
async fn ingestion_activity_resets_idleness() {
    let (state, pool) = test_state_with_pool(64).await;
    let session = state
        .registry
        .create("J1".into(), "R1".into(), None)
        .await
        .expect("create");
    let mut running = state
        .registry
        .transition(&session.id, SessionStatus::Running, None)
        .await
        .expect("activate");

    running.updated_at = Utc::now() - Duration::seconds(600);
    let repo = SessionRepo::new(Arc::new(pool));
    repo.save(&running).await.expect("backdate");

    // An event arriving just before the sweep bumps updated_at.
    state
        .timeline
        .append(&session.id, EventType::Thought, "still here", None, None)
        .await
        .expect("append");

    let swept = sweep_once(&state.registry, &state.control, 300)
        .await
        .expect("sweep");
    assert_eq!(swept, 0);

    let fetched = state.registry.get(&session.id).await.expect("get");
    assert_eq!(fetched.status, SessionStatus::Running);
}

#[tokio::test]
async fn oversized_threshold_sweeps_nothing() {
    let (state, pool) = test_state_with_pool(64).await;
    let session = state
        .registry
        .create("J1".into(), "R1".into(), None)
        .await
        .expect("create");
    let mut running = state
        .registry
        .transition(&session.id, SessionStatus::Running, None)
        .await
        .expect("activate");

    running.updated_at = Utc::now() - Duration::hours(1);
    let repo = SessionRepo::new(Arc::new(pool));
    repo.save(&running).await.expect("backdate");

    // A cutoff beyond the representable datetime range means no session
    // can be stale.
    let swept = sweep_once(&state.registry, &state.control, u64::MAX)
        .await
        .expect("sweep");
    assert_eq!(swept, 0);

    let fetched = state.registry.get(&session.id).await.expect("get");
    assert_eq!(fetched.status, SessionStatus::Running);
}

#[tokio::test]
async fn sweep_handles_multiple_stale_sessions() {
    let (state, pool) = test_state_with_pool(64).await;
    let repo = SessionRepo::new(Arc::new(pool));

    for i in 0..3 {
        let session = state
            .registry
            .create(format!("J{i}"), "R1".into(), None)
            .await
            .expect("create");
        let mut running = state
            .registry
            .transition(&session.id, SessionStatus::Running, None)
            .await
            .expect("activate");
        running.updated_at = Utc::now() - Duration::seconds(900);
        repo.save(&running).await.expect("backdate");
    }

    let swept = sweep_once(&state.registry, &state.control, 300)
        .await
        .expect("sweep");
    assert_eq!(swept, 3);

    let remaining = state
        .registry
        .list(Some(SessionStatus::Running))
        .await
        .expect("list");
    assert!(remaining.is_empty());
}
