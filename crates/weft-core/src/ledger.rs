// Event ledger
//
// Append-only, deduplicating store of all events seen for the active
// session, historical and live. The ledger is the single source of truth
// for derivation; it is never mutated by rendering code. Ordering is by
// timestamp with ties broken by arrival order, maintained on insert.

use tokio::sync::watch;

use crate::event::SessionEvent;

/// Deduplicating, timestamp-ordered event store
#[derive(Debug)]
pub struct EventLedger {
    events: Vec<SessionEvent>,
    revision: watch::Sender<u64>,
}

impl EventLedger {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            events: Vec::new(),
            revision,
        }
    }

    /// Insert an event unless an existing entry has identical
    /// (timestamp, event_type, output). Returns whether the ledger changed;
    /// duplicate appends are no-ops. Each successful append bumps the
    /// revision exactly once.
    pub fn append(&mut self, event: SessionEvent) -> bool {
        if self.events.iter().any(|e| e.is_duplicate_of(&event)) {
            return false;
        }

        // Insert after all entries with an equal or earlier timestamp so
        // arrival order breaks ties.
        let idx = self
            .events
            .partition_point(|e| e.timestamp <= event.timestamp);
        self.events.insert(idx, event);
        self.revision.send_modify(|r| *r += 1);
        true
    }

    /// The full event sequence, ordered by timestamp (arrival order on ties)
    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    /// Reset state when the active session changes
    pub fn clear(&mut self) {
        if !self.events.is_empty() {
            self.events.clear();
            self.revision.send_modify(|r| *r += 1);
        }
    }

    /// Subscribe to revision bumps; one bump per successful mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn append_is_idempotent() {
        let id = Uuid::now_v7();
        let mut ledger = EventLedger::new();
        let event = SessionEvent::user_message(id, ts(0), "hello");

        assert!(ledger.append(event.clone()));
        assert!(!ledger.append(event.clone()));
        assert_eq!(ledger.len(), 1);

        // The historical replay of the same event is also absorbed.
        let mut replay = event;
        replay.is_historical = true;
        assert!(!ledger.append(replay));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn orders_by_timestamp_with_arrival_tiebreak() {
        let id = Uuid::now_v7();
        let mut ledger = EventLedger::new();

        ledger.append(SessionEvent::step_update(id, ts(5), "second"));
        ledger.append(SessionEvent::user_message(id, ts(1), "first"));
        ledger.append(SessionEvent::step_update(id, ts(5), "third"));

        let names: Vec<_> = ledger
            .events()
            .iter()
            .map(|e| e.step_name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["User", "second", "third"]);
    }

    #[test]
    fn merge_order_is_insignificant() {
        let id = Uuid::now_v7();
        let backlog = vec![
            SessionEvent::user_message(id, ts(0), "q"),
            SessionEvent::session_started(id, ts(1)),
        ];
        let live = vec![
            SessionEvent::step_update(id, ts(2), "search"),
            SessionEvent::session_completed(id, ts(3), json!("done")),
        ];

        let mut backlog_first = EventLedger::new();
        for e in backlog.iter().chain(live.iter()) {
            backlog_first.append(e.clone());
        }

        let mut live_first = EventLedger::new();
        for e in live.iter().chain(backlog.iter()) {
            live_first.append(e.clone());
        }

        let kinds = |l: &EventLedger| -> Vec<EventType> {
            l.events().iter().map(|e| e.event_type.clone()).collect()
        };
        assert_eq!(kinds(&backlog_first), kinds(&live_first));
    }

    #[test]
    fn revision_bumps_once_per_mutation() {
        let id = Uuid::now_v7();
        let mut ledger = EventLedger::new();
        let rx = ledger.subscribe();

        ledger.append(SessionEvent::user_message(id, ts(0), "a"));
        ledger.append(SessionEvent::user_message(id, ts(0), "a"));
        ledger.append(SessionEvent::user_message(id, ts(1), "b"));
        assert_eq!(*rx.borrow(), 2);

        ledger.clear();
        assert_eq!(*rx.borrow(), 3);
        assert!(ledger.is_empty());

        // Clearing an already-empty ledger is not a mutation.
        ledger.clear();
        assert_eq!(*rx.borrow(), 3);
    }
}
