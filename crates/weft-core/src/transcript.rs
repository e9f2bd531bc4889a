// Transcript derivation
//
// Pure functions from (session projection, ordered event sequence,
// optimistic buffer) to the ordered display transcript. Turn attribution is
// a single grouping pass building indexed turn records over the sorted
// sequence: user_message events are turn boundaries, and every step or
// completion event is attributed to the turn whose window
// (t_i, t_{i+1}) contains its timestamp, both bounds exclusive. The last
// turn's window is open-ended.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::event::{EventType, SessionEvent};
use crate::optimistic::OptimisticMessage;
use crate::session::{Session, SessionStatus};

/// Placeholder content when a completion carries no payload at all
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response received";

/// Role of a display message
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Error,
}

/// One step executed within a turn
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StepSummary {
    /// 1-based position within the owning turn
    pub id: usize,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

/// Derived, ephemeral transcript entry; recomputed, never persisted
#[derive(Debug, Clone, Serialize)]
pub struct DisplayMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    pub markdown: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepSummary>,
}

/// One user submission plus whatever the window up to the next submission
/// (or now) attributes to it.
struct Turn<'a> {
    user: &'a SessionEvent,
    /// Exclusive upper bound; None for the in-progress last turn
    end: Option<DateTime<Utc>>,
    steps: Vec<&'a SessionEvent>,
    completion: Option<&'a SessionEvent>,
    failure: Option<&'a SessionEvent>,
}

/// Derive the full display transcript.
///
/// `events` must be the ledger's ordered sequence. The function performs no
/// mutation and is idempotent: identical inputs yield identical output.
pub fn derive_transcript(
    session: &Session,
    events: &[SessionEvent],
    optimistic: &[OptimisticMessage],
) -> Vec<DisplayMessage> {
    let mut turns: Vec<Turn> = events
        .iter()
        .filter(|e| e.event_type == EventType::UserMessage)
        .map(|user| Turn {
            user,
            end: None,
            steps: Vec::new(),
            completion: None,
            failure: None,
        })
        .collect();
    for i in 0..turns.len().saturating_sub(1) {
        turns[i].end = Some(turns[i + 1].user.timestamp);
    }

    for event in events {
        let relevant = matches!(
            event.event_type,
            EventType::StepUpdate | EventType::SessionCompleted | EventType::SessionFailed
        );
        if !relevant {
            continue;
        }

        // Last turn whose window opens strictly before the event; both
        // bounds are exclusive, so an event stamped exactly on a boundary
        // belongs to no turn.
        let opened = turns.partition_point(|t| t.user.timestamp < event.timestamp);
        let Some(turn) = opened.checked_sub(1).and_then(|i| turns.get_mut(i)) else {
            continue;
        };
        if turn.end.is_some_and(|end| event.timestamp >= end) {
            continue;
        }

        match event.event_type {
            EventType::StepUpdate => turn.steps.push(event),
            EventType::SessionCompleted => {
                if turn.completion.is_none() {
                    turn.completion = Some(event);
                }
            }
            EventType::SessionFailed => {
                if turn.failure.is_none() {
                    turn.failure = Some(event);
                }
            }
            _ => unreachable!(),
        }
    }

    let mut messages: Vec<DisplayMessage> = Vec::new();
    let last_turn = turns.len().saturating_sub(1);
    for (i, turn) in turns.iter().enumerate() {
        messages.push(DisplayMessage {
            id: format!("user-{}", turn.user.timestamp.timestamp_millis()),
            role: Role::User,
            content: turn
                .user
                .output
                .as_ref()
                .map(value_text)
                .unwrap_or_default(),
            timestamp: turn.user.timestamp,
            execution_time: None,
            markdown: false,
            steps: Vec::new(),
        });

        if let Some(completion) = turn.completion {
            let execution_time = (i == last_turn && session.status == SessionStatus::Completed)
                .then_some(session.execution_time)
                .flatten();
            messages.push(DisplayMessage {
                id: format!("assistant-{}", completion.timestamp.timestamp_millis()),
                role: Role::Assistant,
                content: completion_text(completion.output.as_ref(), true),
                timestamp: completion.timestamp,
                execution_time,
                markdown: true,
                steps: summarize_steps(&turn.steps),
            });
        }

        if let Some(failure) = turn.failure {
            messages.push(DisplayMessage {
                id: format!("error-{}", failure.timestamp.timestamp_millis()),
                role: Role::Error,
                content: failure
                    .error
                    .clone()
                    .unwrap_or_else(|| "Session failed".to_string()),
                timestamp: failure.timestamp,
                execution_time: None,
                markdown: false,
                steps: Vec::new(),
            });
        }
    }

    // A session created without an explicit first message has its query
    // recorded only in the session metadata; synthesize the turn from it.
    // The query is client-known and may be absent when attaching to a
    // foreign session, in which case there is nothing to show for it.
    if turns.is_empty() {
        if !session.query.is_empty() {
            messages.push(DisplayMessage {
                id: "user-query".to_string(),
                role: Role::User,
                content: session.query.clone(),
                timestamp: session.created_at,
                execution_time: None,
                markdown: false,
                steps: Vec::new(),
            });
        }

        if session.status == SessionStatus::Completed {
            let all_steps: Vec<&SessionEvent> = events
                .iter()
                .filter(|e| e.event_type == EventType::StepUpdate)
                .collect();
            messages.push(DisplayMessage {
                id: "assistant-result".to_string(),
                role: Role::Assistant,
                content: completion_text(session.result.as_ref(), true),
                timestamp: session.completed_at.unwrap_or(session.created_at),
                execution_time: session.execution_time,
                markdown: true,
                steps: summarize_steps(&all_steps),
            });
        }
    }

    for provisional in optimistic {
        messages.push(DisplayMessage {
            id: format!("optimistic-{}", provisional.id),
            role: Role::User,
            content: provisional.content.clone(),
            timestamp: provisional.submitted_at,
            execution_time: None,
            markdown: false,
            steps: Vec::new(),
        });
    }

    messages.sort_by_key(|m| m.timestamp);
    messages
}

/// Steps currently executing: step updates after the latest user message,
/// for the live progress indicator. Independent of the full derivation.
pub fn running_steps(events: &[SessionEvent]) -> Vec<StepSummary> {
    let last_user = events
        .iter()
        .filter(|e| e.event_type == EventType::UserMessage)
        .map(|e| e.timestamp)
        .max();

    let steps: Vec<&SessionEvent> = events
        .iter()
        .filter(|e| e.event_type == EventType::StepUpdate)
        .filter(|e| last_user.is_none_or(|t| e.timestamp > t))
        .collect();
    summarize_steps(&steps)
}

fn summarize_steps(steps: &[&SessionEvent]) -> Vec<StepSummary> {
    steps
        .iter()
        .enumerate()
        .map(|(i, event)| StepSummary {
            id: i + 1,
            description: event
                .step_name
                .clone()
                .or_else(|| event.tool_id.clone())
                .unwrap_or_else(|| "Unknown step".to_string()),
            output: event.output.clone(),
        })
        .collect()
}

/// Extract display text from a completion payload.
///
/// Plain strings pass through verbatim. Structured results prefer a
/// `summary` field (with a labeled `value` appended) when summary inclusion
/// is requested, then a bare `value`, and otherwise fall back to a
/// pretty-printed dump in a code block. No payload at all yields a fixed
/// placeholder.
pub fn completion_text(output: Option<&Value>, include_summary: bool) -> String {
    let Some(output) = output else {
        return NO_RESPONSE_PLACEHOLDER.to_string();
    };

    match output {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            let summary = map
                .get("summary")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty());
            let value = map.get("value").filter(|v| !v.is_null());

            if include_summary {
                if let Some(summary) = summary {
                    let mut text = summary.to_string();
                    if let Some(value) = value {
                        let value_text = value_text(value);
                        if value_text.trim() != text.trim() {
                            text.push_str("\n\n**Result:** ");
                            text.push_str(&value_text);
                        }
                    }
                    return text;
                }
            }

            match value {
                Some(Value::String(s)) => s.clone(),
                Some(other) => code_block(other),
                None => code_block(output),
            }
        }
        other => code_block(other),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn code_block(value: &Value) -> String {
    let dump = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{dump}\n```")
}
