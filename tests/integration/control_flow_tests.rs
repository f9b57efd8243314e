//! Control-plane coverage: pause/resume/cancel flows and the cooperative
//! pause signal agents poll between actions.

use std::sync::Arc;

use applyflow::models::session::SessionStatus;
use applyflow::models::timeline::EventType;
use applyflow::AppError;

use super::test_helpers::test_state;

async fn running_session(state: &applyflow::gateway::AppState) -> String {
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
    session.id
}

#[tokio::test]
async fn pause_records_event_and_trips_signal() {
    let state = test_state().await;
    let id = running_session(&state).await;
    let signal = state.control.register(&id);
    assert!(!signal.is_paused());

    let paused = state
        .control
        .pause(&id, "needs CAPTCHA")
        .await
        .expect("pause");
    assert_eq!(paused.status, SessionStatus::Paused);
    assert!(signal.is_paused());

    let events = state.timeline.list(&id, None).await.expect("list");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Pause);
    assert_eq!(events[0].content, "needs CAPTCHA");
    assert_eq!(
        events[0]
            .metadata
            .as_ref()
            .and_then(|m| m.get("reason"))
            .and_then(|r| r.as_str()),
        Some("needs CAPTCHA")
    );
}

#[tokio::test]
async fn resume_clears_signal_and_records_event() {
    let state = test_state().await;
    let id = running_session(&state).await;
    let signal = state.control.register(&id);

    state.control.pause(&id, "operator break").await.expect("pause");
    assert!(signal.is_paused());

    let resumed = state
        .control
        .resume(&id, Some("carry on"))
        .await
        .expect("resume");
    assert_eq!(resumed.status, SessionStatus::Running);
    assert!(!signal.is_paused(), "resume clears the pause signal");

    let events = state.timeline.list(&id, None).await.expect("list");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, EventType::Resume);
    assert_eq!(events[1].content, "carry on");
}

#[tokio::test]
async fn pause_again_after_resume_works() {
    let state = test_state().await;
    let id = running_session(&state).await;
    let signal = state.control.register(&id);

    state.control.pause(&id, "first").await.expect("first pause");
    state.control.resume(&id, None).await.expect("resume");
    state.control.pause(&id, "second").await.expect("second pause");
    assert!(signal.is_paused(), "fresh token trips again after resume");
}

#[tokio::test]
async fn paused_wakes_waiting_agent() {
    let state = test_state().await;
    let id = running_session(&state).await;
    let signal = state.control.register(&id);

    let waiter_signal = signal.clone();
    let waiter = tokio::spawn(async move {
        waiter_signal.paused().await;
    });

    state.control.pause(&id, "stop here").await.expect("pause");
    tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
        .await
        .expect("waiter should wake on pause")
        .expect("waiter task");
}

#[tokio::test]
async fn pause_rejected_unless_running() {
    let state = test_state().await;
    let session = state
        .registry
        .create("J1".into(), "R1".into(), None)
        .await
        .expect("create");

    let err = state
        .control
        .pause(&session.id, "too early")
        .await
        .expect_err("queued cannot pause");
    assert!(matches!(err, AppError::InvalidState(_)), "got: {err}");

    // Neither the state nor the timeline changed.
    let fetched = state.registry.get(&session.id).await.expect("get");
    assert_eq!(fetched.status, SessionStatus::Queued);
    let events = state.timeline.list(&session.id, None).await.expect("list");
    assert!(events.is_empty());
}

#[tokio::test]
async fn resume_rejected_unless_paused() {
    let state = test_state().await;
    let id = running_session(&state).await;

    let err = state
        .control
        .resume(&id, None)
        .await
        .expect_err("running cannot resume");
    assert!(matches!(err, AppError::InvalidState(_)));

    let events = state.timeline.list(&id, None).await.expect("list");
    assert!(events.is_empty(), "rejected resume leaves no event");
}

#[tokio::test]
async fn cancel_fails_session_with_reason() {
    let state = test_state().await;
    let id = running_session(&state).await;

    let cancelled = state
        .control
        .cancel(&id, Some("operator abort"))
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, SessionStatus::Failed);
    assert_eq!(cancelled.error_detail.as_deref(), Some("operator abort"));
    assert!(cancelled.completed_at.is_some());

    let events = state.timeline.list(&id, None).await.expect("list");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Error);
    assert_eq!(
        events[0]
            .metadata
            .as_ref()
            .and_then(|m| m.get("cancelled"))
            .and_then(serde_json::Value::as_bool),
        Some(true)
    );
}

#[tokio::test]
async fn cancel_without_reason_uses_default_detail() {
    let state = test_state().await;
    let id = running_session(&state).await;

    let cancelled = state.control.cancel(&id, None).await.expect("cancel");
    assert_eq!(
        cancelled.error_detail.as_deref(),
        Some("cancelled by operator")
    );
}

#[tokio::test]
async fn cancel_works_from_paused_and_queued() {
    let state = test_state().await;

    let queued = state
        .registry
        .create("J1".into(), "R1".into(), None)
        .await
        .expect("create");
    let cancelled = state
        .control
        .cancel(&queued.id, None)
        .await
        .expect("cancel queued");
    assert_eq!(cancelled.status, SessionStatus::Failed);

    let id = running_session(&state).await;
    state.control.pause(&id, "hold").await.expect("pause");
    let cancelled = state
        .control
        .cancel(&id, Some("no longer needed"))
        .await
        .expect("cancel paused");
    assert_eq!(cancelled.status, SessionStatus::Failed);
}

#[tokio::test]
async fn cancel_rejected_on_terminal() {
    let state = test_state().await;
    let id = running_session(&state).await;
    state
        .registry
        .transition(&id, SessionStatus::Completed, None)
        .await
        .expect("complete");

    let err = state
        .control
        .cancel(&id, None)
        .await
        .expect_err("terminal cannot cancel");
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[tokio::test]
async fn interleaved_pause_resume_keeps_timeline_ordered() {
    let state = test_state().await;
    let id = running_session(&state).await;
    let signal = state.control.register(&id);

    // Fire pause and resume commands concurrently; losers of each race
    // fail with InvalidState and must leave no trace.
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let pause_state = Arc::clone(&state);
        let pause_id = id.clone();
        tasks.push(tokio::spawn(async move {
            let _ = pause_state.control.pause(&pause_id, "storm").await;
        }));
        let resume_state = Arc::clone(&state);
        let resume_id = id.clone();
        tasks.push(tokio::spawn(async move {
            let _ = resume_state.control.resume(&resume_id, None).await;
        }));
    }
    for task in tasks {
        task.await.expect("control task");
    }

    // Successful commands strictly alternate, so the recorded events must
    // too: pause, resume, pause, resume, ...
    let events = state.timeline.list(&id, None).await.expect("list");
    for (i, event) in events.iter().enumerate() {
        let expected = if i % 2 == 0 {
            EventType::Pause
        } else {
            EventType::Resume
        };
        assert_eq!(event.event_type, expected, "event {i} out of order");
    }

    let session = state.registry.get(&id).await.expect("get");
    assert_eq!(
        signal.is_paused(),
        session.status == SessionStatus::Paused,
        "signal must match the final status"
    );
}

#[tokio::test]
async fn terminal_transition_releases_signal() {
    let state = test_state().await;
    let id = running_session(&state).await;
    let signal = state.control.register(&id);
    assert_eq!(state.control.signal_count(), 1);

    let waiter_signal = signal.clone();
    let waiter = tokio::spawn(async move {
        waiter_signal.paused().await;
    });

    state
        .registry
        .transition(&id, SessionStatus::Completed, None)
        .await
        .expect("complete");

    // Release trips the signal so the waiting agent wakes and observes
    // the terminal status.
    tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
        .await
        .expect("waiter should wake on terminal transition")
        .expect("waiter task");
    assert_eq!(state.control.signal_count(), 0);
}

#[tokio::test]
async fn register_returns_same_signal_for_session() {
    let state = test_state().await;
    let id = running_session(&state).await;

    let first = state.control.register(&id);
    let second = state.control.register(&id);
    state.control.pause(&id, "hold").await.expect("pause");

    assert!(first.is_paused());
    assert!(second.is_paused(), "both handles observe the same signal");
}
