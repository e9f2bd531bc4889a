// Per-session engine
//
// Owns one session's ledger, optimistic buffer, and projection. Lives for
// exactly one view of one session: switching session ids tears everything
// down before the next snapshot fetch begins, so events can never leak
// across sessions. Event delivery is single-threaded and cooperative - the
// caller feeds stream events in one at a time through `ingest`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::event::SessionEvent;
use crate::ledger::EventLedger;
use crate::optimistic::OptimisticBuffer;
use crate::session::{QueryType, Session};
use crate::traits::SessionApi;
use crate::transcript::{derive_transcript, running_steps, DisplayMessage, StepSummary};

/// Tunables for one engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an optimistic message survives before expiry
    pub optimistic_hold: Duration,
    /// Suggested pause between caller-triggered reconnect attempts
    pub reconnect_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimistic_hold: Duration::from_secs(3),
            reconnect_interval: Duration::from_secs(2),
        }
    }
}

/// Reconciliation engine for a single session view
pub struct SessionEngine {
    api: Arc<dyn SessionApi>,
    config: EngineConfig,
    /// Snapshot base the projection is folded onto
    base: Option<Session>,
    /// Current projection: base + ledger fold
    session: Option<Session>,
    repo_hint: Option<String>,
    ledger: EventLedger,
    buffer: OptimisticBuffer,
}

impl SessionEngine {
    pub fn new(api: Arc<dyn SessionApi>, config: EngineConfig) -> Self {
        let buffer = OptimisticBuffer::new(config.optimistic_hold);
        Self {
            api,
            config,
            base: None,
            session: None,
            repo_hint: None,
            ledger: EventLedger::new(),
            buffer,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a new session from `query` and make it the active one.
    ///
    /// A placeholder projection (temporary local id, pending status) and an
    /// optimistic message are visible immediately; on failure both are
    /// rolled back and the input text travels in the error for retry.
    pub async fn start(
        &mut self,
        query: &str,
        query_type: QueryType,
        repo_name: Option<&str>,
    ) -> Result<Uuid> {
        self.close();
        self.repo_hint = repo_name.map(str::to_string);
        self.base = Some(Session::placeholder(query, query_type));
        self.session = self.base.clone();
        let provisional = self.buffer.push(query);

        match self.api.create_session(query, query_type, repo_name).await {
            Ok(created) => {
                if let Some(base) = self.base.as_mut() {
                    base.session_id = created.session_id;
                    base.created_at = created.created_at;
                }
                self.session = self.base.clone();
                Ok(created.session_id)
            }
            Err(err) => {
                let input = self
                    .buffer
                    .remove(provisional.id)
                    .unwrap_or_else(|| query.to_string());
                self.close();
                Err(EngineError::submission(err.to_string(), input))
            }
        }
    }

    /// Load the snapshot for `session_id` and make it the active session.
    ///
    /// Opening a different session id first tears down all prior state.
    /// Reopening the current id merges the fresh backlog into the ledger,
    /// which the dedup rule makes safe at any time - including while live
    /// events are already flowing in through `ingest`.
    pub async fn open(&mut self, session_id: Uuid) -> Result<()> {
        if self.base.as_ref().map(|b| b.session_id) != Some(session_id) {
            self.close();
        }

        let (mut fetched, events) = tokio::try_join!(
            self.api.fetch_session(session_id),
            self.api.fetch_events(session_id, None)
        )?;

        // The status endpoint does not echo the query back; keep the
        // locally-known one from a placeholder or earlier open.
        if let Some(prev) = self.base.take() {
            if fetched.query.is_empty() {
                fetched.query = prev.query;
                fetched.query_type = prev.query_type;
            }
        }
        self.base = Some(fetched);

        for event in events {
            self.ledger.append(event);
        }
        self.refresh_projection();
        Ok(())
    }

    /// Feed one live event in. Events for any other session id are dropped,
    /// duplicates are absorbed by the ledger. Returns whether the ledger
    /// changed.
    pub fn ingest(&mut self, event: SessionEvent) -> bool {
        let Some(current) = self.base.as_ref().map(|b| b.session_id) else {
            return false;
        };
        if event.session_id != current {
            tracing::debug!(
                event_session = %event.session_id,
                active_session = %current,
                "dropping event for inactive session"
            );
            return false;
        }

        let appended = self.ledger.append(event);
        if appended {
            self.refresh_projection();
        }
        appended
    }

    /// Submit a follow-up message on the active session. `query_type` and
    /// `repo_name` default to what the session was opened with.
    ///
    /// The optimistic message appears in the transcript immediately and
    /// expires on its own once the hold elapses; on submission failure it is
    /// rolled back and its text returned inside the error.
    pub async fn submit(
        &mut self,
        query: &str,
        query_type: Option<QueryType>,
        repo_name: Option<&str>,
    ) -> Result<CreatedTurn> {
        let (session_id, session_query_type) = self
            .base
            .as_ref()
            .map(|b| (b.session_id, b.query_type))
            .ok_or(EngineError::NoActiveSession)?;
        let query_type = query_type.unwrap_or(session_query_type);

        let provisional = self.buffer.push(query);
        let repo_hint = repo_name
            .map(str::to_string)
            .or_else(|| self.repo_hint.clone());
        match self
            .api
            .post_message(session_id, query, query_type, repo_hint.as_deref())
            .await
        {
            Ok(created) => Ok(CreatedTurn {
                session_id: created.session_id,
                stream_url: created.stream_url,
            }),
            Err(err) => {
                let input = self
                    .buffer
                    .remove(provisional.id)
                    .unwrap_or_else(|| query.to_string());
                Err(EngineError::submission(err.to_string(), input))
            }
        }
    }

    /// Derive the display transcript from the current ledger, projection,
    /// and optimistic buffer. Stale optimistic entries are expired first.
    pub fn transcript(&mut self) -> Vec<DisplayMessage> {
        self.buffer.expire_stale(Utc::now());
        match &self.session {
            Some(session) => derive_transcript(session, self.ledger.events(), self.buffer.messages()),
            None => Vec::new(),
        }
    }

    /// Steps of the in-progress turn, for a live progress indicator
    pub fn running_steps(&self) -> Vec<StepSummary> {
        running_steps(self.ledger.events())
    }

    /// Current session projection
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Revision subscription; bumps once per ledger mutation
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.ledger.subscribe()
    }

    // Rendering collaborators get the derived transcript and projection
    // only; the ledger itself stays internal.
    pub(crate) fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    /// Tear down all per-session state. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.ledger.clear();
        self.buffer.clear();
        self.base = None;
        self.session = None;
        self.repo_hint = None;
    }

    fn refresh_projection(&mut self) {
        let Some(base) = &self.base else {
            self.session = None;
            return;
        };
        let mut projection = base.clone();
        for event in self.ledger.events() {
            projection.apply_event(event);
        }
        self.session = Some(projection);
    }
}

/// Outcome of a follow-up submission
#[derive(Debug, Clone)]
pub struct CreatedTurn {
    pub session_id: Uuid,
    pub stream_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CreatedSession, SessionStatus};
    use crate::transcript::Role;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use serde_json::json;
    use std::sync::Mutex;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Scripted SessionApi double
    struct FakeApi {
        session_id: Uuid,
        backlog: Mutex<Vec<SessionEvent>>,
        fail_posts: bool,
    }

    impl FakeApi {
        fn new(session_id: Uuid, backlog: Vec<SessionEvent>) -> Self {
            Self {
                session_id,
                backlog: Mutex::new(backlog),
                fail_posts: false,
            }
        }

        fn failing(session_id: Uuid) -> Self {
            Self {
                session_id,
                backlog: Mutex::new(Vec::new()),
                fail_posts: true,
            }
        }

        fn created(&self) -> CreatedSession {
            CreatedSession {
                session_id: self.session_id,
                status: SessionStatus::Pending,
                created_at: ts(0),
                stream_url: format!("/sessions/{}/stream", self.session_id),
            }
        }
    }

    #[async_trait]
    impl SessionApi for FakeApi {
        async fn create_session(
            &self,
            _query: &str,
            _query_type: QueryType,
            _repo_name: Option<&str>,
        ) -> Result<CreatedSession> {
            if self.fail_posts {
                return Err(EngineError::api(500, "backend down"));
            }
            Ok(self.created())
        }

        async fn post_message(
            &self,
            _session_id: Uuid,
            _query: &str,
            _query_type: QueryType,
            _repo_name: Option<&str>,
        ) -> Result<CreatedSession> {
            if self.fail_posts {
                return Err(EngineError::api(409, "still running"));
            }
            Ok(self.created())
        }

        async fn fetch_session(&self, session_id: Uuid) -> Result<Session> {
            let mut session = Session::placeholder("", QueryType::Chat);
            session.session_id = session_id;
            session.created_at = ts(0);
            Ok(session)
        }

        async fn fetch_events(
            &self,
            _session_id: Uuid,
            _limit: Option<usize>,
        ) -> Result<Vec<SessionEvent>> {
            Ok(self.backlog.lock().unwrap().clone())
        }

        async fn delete_session(&self, _session_id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    fn backlog(id: Uuid) -> Vec<SessionEvent> {
        vec![
            SessionEvent::user_message(id, ts(1), "what now"),
            SessionEvent::session_started(id, ts(2)),
            SessionEvent::step_update(id, ts(3), "plan"),
            SessionEvent::session_completed(id, ts(4), json!("all done")),
        ]
    }

    #[tokio::test]
    async fn open_folds_backlog_into_projection() {
        let id = Uuid::now_v7();
        let api = Arc::new(FakeApi::new(id, backlog(id)));
        let mut engine = SessionEngine::new(api, EngineConfig::default());

        engine.open(id).await.unwrap();

        let session = engine.session().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.result, Some(json!("all done")));
        assert_eq!(engine.ledger().len(), 4);
    }

    #[tokio::test]
    async fn live_before_backlog_converges() {
        let id = Uuid::now_v7();
        // The stream races the snapshot fetch: live events land first, then
        // the backlog (containing the same events, flagged historical) is
        // merged in. The final transcript matches the backlog-first order.
        let api = Arc::new(FakeApi::new(id, Vec::new()));
        let mut engine =
            SessionEngine::new(Arc::clone(&api) as Arc<dyn SessionApi>, EngineConfig::default());

        engine.open(id).await.unwrap();
        for mut event in backlog(id) {
            event.is_historical = false;
            assert!(engine.ingest(event));
        }

        let mut historical = backlog(id);
        for event in &mut historical {
            event.is_historical = true;
        }
        *api.backlog.lock().unwrap() = historical;
        engine.open(id).await.unwrap();

        assert_eq!(engine.ledger().len(), 4);
        let transcript = engine.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(
            engine.session().unwrap().status,
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn ingest_drops_cross_session_events() {
        let id = Uuid::now_v7();
        let other = Uuid::now_v7();
        let api = Arc::new(FakeApi::new(id, Vec::new()));
        let mut engine = SessionEngine::new(api, EngineConfig::default());
        engine.open(id).await.unwrap();

        assert!(!engine.ingest(SessionEvent::user_message(other, ts(1), "not yours")));
        assert!(engine.ledger().is_empty());
    }

    #[tokio::test]
    async fn reconnect_replay_leaves_transcript_unchanged() {
        let id = Uuid::now_v7();
        let api = Arc::new(FakeApi::new(id, backlog(id)));
        let mut engine = SessionEngine::new(api, EngineConfig::default());
        engine.open(id).await.unwrap();
        let before = engine.transcript();

        // A reconnect re-delivers the entire backlog as live frames.
        for mut event in backlog(id) {
            event.is_historical = false;
            engine.ingest(event);
        }

        let after = engine.transcript();
        assert_eq!(before.len(), after.len());
        assert_eq!(
            before.iter().map(|m| &m.id).collect::<Vec<_>>(),
            after.iter().map(|m| &m.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn start_failure_rolls_back_and_restores_input() {
        let api = Arc::new(FakeApi::failing(Uuid::now_v7()));
        let mut engine = SessionEngine::new(api, EngineConfig::default());

        let err = engine
            .start("my question", QueryType::Chat, None)
            .await
            .unwrap_err();
        match err {
            EngineError::Submission { input, .. } => assert_eq!(input, "my question"),
            other => panic!("expected submission error, got {other}"),
        }
        assert!(engine.session().is_none());
        assert!(engine.transcript().is_empty());
    }

    #[tokio::test]
    async fn submit_shows_optimistic_message_immediately() {
        let id = Uuid::now_v7();
        let api = Arc::new(FakeApi::new(id, backlog(id)));
        let mut engine = SessionEngine::new(api, EngineConfig::default());
        engine.open(id).await.unwrap();

        engine.submit("follow up", None, None).await.unwrap();
        let transcript = engine.transcript();
        let last = transcript.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "follow up");

        // Once the real user_message lands and the hold elapses, exactly one
        // copy remains.
        engine.ingest(SessionEvent::user_message(id, ts(10), "follow up"));
        let mut settled = SessionEngine::new(
            Arc::new(FakeApi::new(id, backlog(id))),
            EngineConfig {
                optimistic_hold: Duration::from_millis(0),
                ..EngineConfig::default()
            },
        );
        settled.open(id).await.unwrap();
        settled.submit("follow up", None, None).await.unwrap();
        settled.ingest(SessionEvent::user_message(id, ts(10), "follow up"));
        let transcript = settled.transcript();
        let copies = transcript
            .iter()
            .filter(|m| m.role == Role::User && m.content == "follow up")
            .count();
        assert_eq!(copies, 1);
    }

    #[tokio::test]
    async fn submit_failure_restores_input() {
        let id = Uuid::now_v7();
        let api = Arc::new(FakeApi::failing(id));
        let mut engine = SessionEngine::new(api, EngineConfig::default());
        // Failing api still answers fetches.
        engine.open(id).await.unwrap();

        let err = engine.submit("try again", None, None).await.unwrap_err();
        match err {
            EngineError::Submission { input, .. } => assert_eq!(input, "try again"),
            other => panic!("expected submission error, got {other}"),
        }
        // No partial turn recorded.
        assert!(engine.transcript().is_empty());
    }
}
