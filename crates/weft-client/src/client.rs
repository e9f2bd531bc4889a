// HTTP client for the session API
//
// Thin reqwest wrapper plus the SessionApi implementation. Request bodies
// use the camelCase aliases the backend accepts; responses are snake_case.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use weft_core::{
    CreatedSession, EngineError, QueryType, Session, SessionApi, SessionEvent, SessionStatus,
};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found")]
    NotFound,
}

impl From<ApiError> for EngineError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http(e) => EngineError::transport(e.to_string()),
            ApiError::Api { status, message } => EngineError::api(status, message),
            ApiError::NotFound => EngineError::api(404, "not found"),
        }
    }
}

/// Client for the session HTTP API
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSessionApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.delete(&url).send().await?;

        if response.status() == StatusCode::NO_CONTENT || response.status() == StatusCode::OK {
            return Ok(());
        }

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }

        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Api { status, message })
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json().await?;
        Ok(body)
    }
}

/// Request body for session creation and follow-up messages
#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    query: &'a str,
    #[serde(rename = "queryType")]
    query_type: QueryType,
    #[serde(rename = "repoName", skip_serializing_if = "Option::is_none")]
    repo_name: Option<&'a str>,
}

/// Response to session creation / message posting
#[derive(Debug, Deserialize)]
struct SessionCreatedResponse {
    session_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    stream_url: String,
}

impl From<SessionCreatedResponse> for CreatedSession {
    fn from(r: SessionCreatedResponse) -> Self {
        CreatedSession {
            session_id: r.session_id,
            status: SessionStatus::from(r.status.as_str()),
            created_at: r.created_at,
            stream_url: r.stream_url,
        }
    }
}

/// Session status response
#[derive(Debug, Deserialize)]
struct SessionStatusResponse {
    session_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    execution_time: Option<f64>,
}

impl From<SessionStatusResponse> for Session {
    fn from(r: SessionStatusResponse) -> Self {
        let mut session = Session::placeholder("", QueryType::Chat);
        session.session_id = r.session_id;
        session.status = SessionStatus::from(r.status.as_str());
        session.created_at = r.created_at;
        session.started_at = r.started_at;
        session.completed_at = r.completed_at;
        session.result = r.result;
        session.error = r.error;
        session.execution_time = r.execution_time;
        session
    }
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    events: Vec<SessionEvent>,
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create_session(
        &self,
        query: &str,
        query_type: QueryType,
        repo_name: Option<&str>,
    ) -> weft_core::Result<CreatedSession> {
        let request = SessionRequest {
            query,
            query_type,
            repo_name,
        };
        let response: SessionCreatedResponse = self.post("/sessions", &request).await?;
        Ok(response.into())
    }

    async fn post_message(
        &self,
        session_id: Uuid,
        query: &str,
        query_type: QueryType,
        repo_name: Option<&str>,
    ) -> weft_core::Result<CreatedSession> {
        let request = SessionRequest {
            query,
            query_type,
            repo_name,
        };
        let response: SessionCreatedResponse = self
            .post(&format!("/sessions/{}/messages", session_id), &request)
            .await?;
        Ok(response.into())
    }

    async fn fetch_session(&self, session_id: Uuid) -> weft_core::Result<Session> {
        let response: SessionStatusResponse = self
            .get(&format!("/sessions/{}", session_id))
            .await
            .map_err(|e| match e {
                ApiError::NotFound => EngineError::SessionNotFound(session_id),
                e => e.into(),
            })?;
        Ok(response.into())
    }

    async fn fetch_events(
        &self,
        session_id: Uuid,
        limit: Option<usize>,
    ) -> weft_core::Result<Vec<SessionEvent>> {
        let path = match limit {
            Some(limit) => format!("/sessions/{}/events?limit={}", session_id, limit),
            None => format!("/sessions/{}/events", session_id),
        };
        let response: EventsResponse = self.get(&path).await.map_err(|e| match e {
            ApiError::NotFound => EngineError::SessionNotFound(session_id),
            e => e.into(),
        })?;

        // Backlog records are historical by definition; the REST payload
        // does not carry the flag itself.
        let mut events = response.events;
        for event in &mut events {
            event.is_historical = true;
        }
        Ok(events)
    }

    async fn delete_session(&self, session_id: Uuid) -> weft_core::Result<()> {
        self.delete(&format!("/sessions/{}", session_id))
            .await
            .map_err(|e| match e {
                ApiError::NotFound => EngineError::SessionNotFound(session_id),
                e => e.into(),
            })?;
        Ok(())
    }
}
