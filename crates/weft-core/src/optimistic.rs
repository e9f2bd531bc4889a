// Optimistic message buffer
//
// Short-lived client-originated messages shown the instant a user submits
// input, before the corresponding user_message event is confirmed. Entries
// expire unconditionally after a bounded hold, trusting the ledger to carry
// the authoritative copy by then; no id-based matching against real events
// is attempted.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A provisional user message with a locally-generated id
#[derive(Debug, Clone, Serialize)]
pub struct OptimisticMessage {
    pub id: Uuid,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
}

/// Buffer of provisional messages for the active session
#[derive(Debug)]
pub struct OptimisticBuffer {
    entries: Vec<OptimisticMessage>,
    hold: TimeDelta,
}

impl OptimisticBuffer {
    /// `hold` is how long an entry survives before `expire_stale` removes it
    pub fn new(hold: std::time::Duration) -> Self {
        Self {
            entries: Vec::new(),
            hold: TimeDelta::from_std(hold).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Insert a provisional message immediately on submission
    pub fn push(&mut self, content: impl Into<String>) -> OptimisticMessage {
        let message = OptimisticMessage {
            id: Uuid::now_v7(),
            content: content.into(),
            submitted_at: Utc::now(),
        };
        self.entries.push(message.clone());
        message
    }

    /// Remove one entry, handing its content back for retry after a failed
    /// submission
    pub fn remove(&mut self, id: Uuid) -> Option<String> {
        let idx = self.entries.iter().position(|m| m.id == id)?;
        Some(self.entries.remove(idx).content)
    }

    /// Drop every entry whose hold has elapsed as of `now`
    pub fn expire_stale(&mut self, now: DateTime<Utc>) {
        let hold = self.hold;
        self.entries
            .retain(|m| now.signed_duration_since(m.submitted_at) < hold);
    }

    pub fn messages(&self) -> &[OptimisticMessage] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn push_then_expire() {
        let mut buffer = OptimisticBuffer::new(Duration::from_secs(3));
        let message = buffer.push("hello");
        assert_eq!(buffer.messages().len(), 1);

        // Still held just before the deadline.
        buffer.expire_stale(message.submitted_at + TimeDelta::seconds(2));
        assert_eq!(buffer.messages().len(), 1);

        buffer.expire_stale(message.submitted_at + TimeDelta::seconds(4));
        assert!(buffer.is_empty());
    }

    #[test]
    fn remove_restores_content_for_retry() {
        let mut buffer = OptimisticBuffer::new(Duration::from_secs(3));
        let message = buffer.push("retry me");

        assert_eq!(buffer.remove(message.id).as_deref(), Some("retry me"));
        assert!(buffer.is_empty());
        assert_eq!(buffer.remove(message.id), None);
    }

    #[test]
    fn clear_empties_the_buffer() {
        let mut buffer = OptimisticBuffer::new(Duration::from_secs(3));
        buffer.push("a");
        buffer.push("b");
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
