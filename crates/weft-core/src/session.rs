// Session projection and lifecycle
//
// Session is the mutable projection of one execution session. Its status is
// driven by folding ledger events in timestamp order, so the projection is
// reproducible from the event sequence alone. Step and unknown events never
// change status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::event::{EventType, SessionEvent};

/// Session status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Terminal statuses accept no further transitions within a turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl From<&str> for SessionStatus {
    fn from(s: &str) -> Self {
        match s {
            "running" => SessionStatus::Running,
            "completed" => SessionStatus::Completed,
            "failed" => SessionStatus::Failed,
            _ => SessionStatus::Pending,
        }
    }
}

/// Kind of query the agent executes for a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    Chat,
    Research,
    Docs,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Chat => write!(f, "chat"),
            QueryType::Research => write!(f, "research"),
            QueryType::Docs => write!(f, "docs"),
        }
    }
}

impl From<&str> for QueryType {
    fn from(s: &str) -> Self {
        match s {
            "research" => QueryType::Research,
            "docs" => QueryType::Docs,
            _ => QueryType::Chat,
        }
    }
}

/// Response to session creation / message posting; carries the stream URL
/// the caller should subscribe to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub stream_url: String,
}

/// Mutable projection of one execution session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: Uuid,
    /// Initiating query; known only client-side (the status endpoint does
    /// not echo it back), empty when attaching to a foreign session
    pub query: String,
    pub query_type: QueryType,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    /// Client-side placeholder shown while the create request is in flight.
    /// Carries a temporary local id until the server assigns the real one.
    pub fn placeholder(query: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            session_id: Uuid::now_v7(),
            query: query.into(),
            query_type,
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            execution_time: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold one event into the projection.
    ///
    /// `pending -> running -> {completed, failed}`, with the re-entrant edge
    /// back to running when a later user_message/session_started pair opens
    /// a new turn. Call in ledger (timestamp) order.
    pub fn apply_event(&mut self, event: &SessionEvent) {
        match &event.event_type {
            EventType::SessionStarted => {
                self.status = SessionStatus::Running;
                if self.started_at.is_none() {
                    self.started_at = Some(event.timestamp);
                }
            }
            EventType::SessionCompleted => {
                self.status = SessionStatus::Completed;
                self.completed_at = Some(event.timestamp);
                self.result = event.output.clone();
            }
            EventType::SessionFailed => {
                self.status = SessionStatus::Failed;
                self.completed_at = Some(event.timestamp);
                self.error = event.error.clone();
            }
            EventType::UserMessage => {
                // A user message after a terminal state opens the next turn;
                // the paired session_started then moves it to running.
                if self.status.is_terminal() {
                    self.status = SessionStatus::Pending;
                }
            }
            EventType::StepUpdate | EventType::StepCompleted | EventType::Unknown(_) => {}
        }
    }
}
