// Session stream event types
//
// SessionEvent is the canonical shape every stream frame and backlog record
// is normalized into at the connector boundary. The event kind is decoded
// once, from the SSE event name or the payload's event_type field; names we
// do not recognize are retained as Unknown rather than dropped so the
// transcript can still surface them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// Kind of a session event, dispatched on the wire-level event name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    SessionStarted,
    StepUpdate,
    StepCompleted,
    SessionCompleted,
    SessionFailed,
    UserMessage,
    /// Event name we do not recognize; retained for debugging
    Unknown(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::SessionStarted => "session_started",
            EventType::StepUpdate => "step_update",
            EventType::StepCompleted => "step_completed",
            EventType::SessionCompleted => "session_completed",
            EventType::SessionFailed => "session_failed",
            EventType::UserMessage => "user_message",
            EventType::Unknown(name) => name,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "session_started" => EventType::SessionStarted,
            "step_update" => EventType::StepUpdate,
            "step_completed" => EventType::StepCompleted,
            "session_completed" => EventType::SessionCompleted,
            "session_failed" => EventType::SessionFailed,
            "user_message" => EventType::UserMessage,
            other => EventType::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EventType::from(s.as_str()))
    }
}

/// Immutable, server-originated session event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when sourced from the backlog fetch rather than the live stream
    #[serde(default)]
    pub is_historical: bool,
}

impl SessionEvent {
    fn base(session_id: Uuid, timestamp: DateTime<Utc>, event_type: EventType) -> Self {
        Self {
            session_id,
            timestamp,
            event_type,
            step_id: None,
            step_name: None,
            tool_id: None,
            status: None,
            output: None,
            error: None,
            is_historical: false,
        }
    }

    /// Create a session started event
    pub fn session_started(session_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        let mut event = Self::base(session_id, timestamp, EventType::SessionStarted);
        event.status = Some("running".to_string());
        event
    }

    /// Create a step update event
    pub fn step_update(
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        step_name: impl Into<String>,
    ) -> Self {
        let mut event = Self::base(session_id, timestamp, EventType::StepUpdate);
        event.step_name = Some(step_name.into());
        event.status = Some("running".to_string());
        event
    }

    /// Create a step completed event
    pub fn step_completed(
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        step_name: impl Into<String>,
        output: Value,
    ) -> Self {
        let mut event = Self::base(session_id, timestamp, EventType::StepCompleted);
        event.step_name = Some(step_name.into());
        event.status = Some("completed".to_string());
        event.output = Some(output);
        event
    }

    /// Create a session completed event carrying the final result
    pub fn session_completed(session_id: Uuid, timestamp: DateTime<Utc>, output: Value) -> Self {
        let mut event = Self::base(session_id, timestamp, EventType::SessionCompleted);
        event.status = Some("completed".to_string());
        event.output = Some(output);
        event
    }

    /// Create a session failed event carrying the error message
    pub fn session_failed(
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        let mut event = Self::base(session_id, timestamp, EventType::SessionFailed);
        event.status = Some("failed".to_string());
        event.error = Some(error.into());
        event
    }

    /// Create a user message event; the query travels in `output`
    pub fn user_message(
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        query: impl Into<String>,
    ) -> Self {
        let mut event = Self::base(session_id, timestamp, EventType::UserMessage);
        event.step_name = Some("User".to_string());
        event.status = Some("completed".to_string());
        event.output = Some(Value::String(query.into()));
        event
    }

    /// Wrap a frame whose event name we do not recognize. The raw payload is
    /// kept in `output`; the timestamp is lifted from the payload when present.
    pub fn unknown(session_id: Uuid, kind: impl Into<String>, payload: Value) -> Self {
        let timestamp = payload
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(Utc::now);
        let mut event = Self::base(session_id, timestamp, EventType::Unknown(kind.into()));
        event.output = Some(payload);
        event
    }

    /// Duplicate-equality per the ledger contract: identical
    /// (timestamp, event_type, output)
    pub fn is_duplicate_of(&self, other: &SessionEvent) -> bool {
        self.timestamp == other.timestamp
            && self.event_type == other.event_type
            && self.output == other.output
    }
}
