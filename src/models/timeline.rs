//! Timeline event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of fact recorded on a session timeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Agent reasoning snippet.
    Thought,
    /// Browser/automation tool invocation.
    ToolCall,
    /// Screenshot captured; the event carries a location reference only.
    Screenshot,
    /// Error reported by the agent.
    Error,
    /// Operator paused the session.
    Pause,
    /// Operator resumed the session.
    Resume,
}

impl EventType {
    /// Stable string form, matching the persisted representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::ToolCall => "tool_call",
            Self::Screenshot => "screenshot",
            Self::Error => "error",
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }
}

/// One immutable, ordered fact about a session's progress.
///
/// Events are never mutated or deleted after append; together they form the
/// authoritative replay log for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimelineEvent {
    /// Owning session.
    pub session_id: String,
    /// Dense 1-based append sequence within the session.
    pub sequence: i64,
    /// Kind of fact recorded.
    pub event_type: EventType,
    /// Store-assigned append timestamp.
    pub timestamp: DateTime<Utc>,
    /// Human-readable description.
    pub content: String,
    /// Open key/value payload; shape depends on `event_type`.
    pub metadata: Option<serde_json::Value>,
    /// Populated only for `screenshot` events.
    pub screenshot_location: Option<String>,
}
