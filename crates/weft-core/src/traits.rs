// Collaborator contracts
//
// The engine reaches its HTTP collaborator only through this trait, keeping
// the core free of transport concerns and trivially mockable in tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::event::SessionEvent;
use crate::session::{CreatedSession, QueryType, Session};

/// Session snapshot loader and CRUD surface
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Create a session; execution starts server-side immediately
    async fn create_session(
        &self,
        query: &str,
        query_type: QueryType,
        repo_name: Option<&str>,
    ) -> Result<CreatedSession>;

    /// Post a follow-up message to an existing session, opening a new turn
    async fn post_message(
        &self,
        session_id: Uuid,
        query: &str,
        query_type: QueryType,
        repo_name: Option<&str>,
    ) -> Result<CreatedSession>;

    /// Fetch current session metadata
    async fn fetch_session(&self, session_id: Uuid) -> Result<Session>;

    /// Fetch the historical event backlog, ordered by the server
    async fn fetch_events(
        &self,
        session_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<SessionEvent>>;

    /// Delete a session and its server-side data
    async fn delete_session(&self, session_id: Uuid) -> Result<()>;
}
