use applyflow::models::session::{Session, SessionStatus};

fn session_in(status: SessionStatus) -> Session {
    let mut session = Session::new("job-1".into(), "resume-1".into(), None);
    session.status = status;
    session
}

#[test]
fn new_session_starts_queued_with_generated_id() {
    let session = Session::new("job-1".into(), "resume-1".into(), None);
    assert_eq!(session.status, SessionStatus::Queued);
    assert!(!session.id.is_empty());
    assert!(session.completed_at.is_none());
    assert!(session.error_detail.is_none());
    assert_eq!(session.created_at, session.updated_at);
}

#[test]
fn new_session_honors_caller_supplied_id() {
    let session = Session::new("job-1".into(), "resume-1".into(), Some("pre-made".into()));
    assert_eq!(session.id, "pre-made");
}

#[test]
fn legal_edges_accepted() {
    let legal = [
        (SessionStatus::Queued, SessionStatus::Running),
        (SessionStatus::Queued, SessionStatus::Failed),
        (SessionStatus::Running, SessionStatus::Paused),
        (SessionStatus::Running, SessionStatus::Completed),
        (SessionStatus::Running, SessionStatus::Failed),
        (SessionStatus::Paused, SessionStatus::Running),
        (SessionStatus::Paused, SessionStatus::Failed),
    ];
    for (from, to) in legal {
        assert!(
            session_in(from).can_transition_to(to),
            "{} -> {} should be legal",
            from.as_str(),
            to.as_str()
        );
    }
}

#[test]
fn illegal_edges_rejected() {
    let illegal = [
        (SessionStatus::Queued, SessionStatus::Paused),
        (SessionStatus::Queued, SessionStatus::Completed),
        (SessionStatus::Paused, SessionStatus::Completed),
        (SessionStatus::Running, SessionStatus::Queued),
        (SessionStatus::Paused, SessionStatus::Queued),
    ];
    for (from, to) in illegal {
        assert!(
            !session_in(from).can_transition_to(to),
            "{} -> {} should be illegal",
            from.as_str(),
            to.as_str()
        );
    }
}

#[test]
fn terminal_states_have_no_outgoing_edges() {
    let all = [
        SessionStatus::Queued,
        SessionStatus::Running,
        SessionStatus::Paused,
        SessionStatus::Completed,
        SessionStatus::Failed,
    ];
    for terminal in [SessionStatus::Completed, SessionStatus::Failed] {
        assert!(terminal.is_terminal());
        for next in all {
            assert!(
                !session_in(terminal).can_transition_to(next),
                "{} -> {} should be illegal",
                terminal.as_str(),
                next.as_str()
            );
        }
    }
}

#[test]
fn self_transitions_rejected() {
    for status in [
        SessionStatus::Queued,
        SessionStatus::Running,
        SessionStatus::Paused,
    ] {
        assert!(!session_in(status).can_transition_to(status));
    }
}

#[test]
fn status_serializes_snake_case() {
    let json = serde_json::to_string(&SessionStatus::Running).expect("serialize");
    assert_eq!(json, "\"running\"");
    let parsed: SessionStatus = serde_json::from_str("\"paused\"").expect("deserialize");
    assert_eq!(parsed, SessionStatus::Paused);
}
