// Integration tests for the HTTP session API client against a mock server

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weft_client::HttpSessionApi;
use weft_core::{EngineError, EventType, QueryType, SessionApi, SessionStatus};

#[tokio::test]
async fn create_session_sends_camel_case_aliases() {
    let server = MockServer::start().await;
    let session_id = Uuid::now_v7();

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_partial_json(json!({
            "query": "what is rust",
            "queryType": "research",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "session_id": session_id,
            "status": "pending",
            "created_at": "2025-06-01T12:00:00+00:00",
            "stream_url": format!("/sessions/{session_id}/stream"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpSessionApi::new(&server.uri());
    let created = api
        .create_session("what is rust", QueryType::Research, None)
        .await
        .unwrap();

    assert_eq!(created.session_id, session_id);
    assert_eq!(created.status, SessionStatus::Pending);
    assert_eq!(created.stream_url, format!("/sessions/{session_id}/stream"));
}

#[tokio::test]
async fn post_message_includes_repo_hint() {
    let server = MockServer::start().await;
    let session_id = Uuid::now_v7();

    Mock::given(method("POST"))
        .and(path(format!("/sessions/{session_id}/messages")))
        .and(body_partial_json(json!({
            "query": "and the docs?",
            "queryType": "docs",
            "repoName": "tokio-rs/tokio",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": session_id,
            "status": "pending",
            "created_at": "2025-06-01T12:00:00+00:00",
            "stream_url": format!("/sessions/{session_id}/stream"),
        })))
        .mount(&server)
        .await;

    let api = HttpSessionApi::new(&server.uri());
    let created = api
        .post_message(
            session_id,
            "and the docs?",
            QueryType::Docs,
            Some("tokio-rs/tokio"),
        )
        .await
        .unwrap();
    assert_eq!(created.session_id, session_id);
}

#[tokio::test]
async fn fetch_session_maps_status_fields() {
    let server = MockServer::start().await;
    let session_id = Uuid::now_v7();

    Mock::given(method("GET"))
        .and(path(format!("/sessions/{session_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": session_id,
            "status": "completed",
            "created_at": "2025-06-01T12:00:00+00:00",
            "started_at": "2025-06-01T12:00:01+00:00",
            "completed_at": "2025-06-01T12:00:09+00:00",
            "result": {"summary": "Done", "value": "42"},
            "execution_time": 7.5,
        })))
        .mount(&server)
        .await;

    let api = HttpSessionApi::new(&server.uri());
    let session = api.fetch_session(session_id).await.unwrap();

    assert_eq!(session.session_id, session_id);
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.execution_time, Some(7.5));
    assert_eq!(session.result, Some(json!({"summary": "Done", "value": "42"})));
}

#[tokio::test]
async fn fetch_events_marks_backlog_historical() {
    let server = MockServer::start().await;
    let session_id = Uuid::now_v7();

    Mock::given(method("GET"))
        .and(path(format!("/sessions/{session_id}/events")))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": session_id,
            "events": [
                {
                    "session_id": session_id,
                    "timestamp": "2025-06-01T12:00:00+00:00",
                    "event_type": "user_message",
                    "status": "completed",
                    "output": "hello",
                },
                {
                    "session_id": session_id,
                    "timestamp": "2025-06-01T12:00:01+00:00",
                    "event_type": "session_started",
                    "status": "running",
                },
            ],
            "total_events": 2,
        })))
        .mount(&server)
        .await;

    let api = HttpSessionApi::new(&server.uri());
    let events = api.fetch_events(session_id, Some(20)).await.unwrap();

    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.is_historical));
    assert_eq!(events[0].event_type, EventType::UserMessage);
    assert_eq!(events[1].event_type, EventType::SessionStarted);
}

#[tokio::test]
async fn missing_session_surfaces_not_found() {
    let server = MockServer::start().await;
    let session_id = Uuid::now_v7();

    Mock::given(method("GET"))
        .and(path(format!("/sessions/{session_id}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "detail": format!("Session {session_id} not found"),
        })))
        .mount(&server)
        .await;

    let api = HttpSessionApi::new(&server.uri());
    let err = api.fetch_session(session_id).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(id) if id == session_id));
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let api = HttpSessionApi::new(&server.uri());
    let err = api
        .create_session("q", QueryType::Chat, None)
        .await
        .unwrap_err();
    match err {
        EngineError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected api error, got {other}"),
    }
}

#[tokio::test]
async fn delete_session_accepts_ok_and_no_content() {
    let server = MockServer::start().await;
    let session_id = Uuid::now_v7();

    Mock::given(method("DELETE"))
        .and(path(format!("/sessions/{session_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": format!("Session {session_id} deleted successfully"),
        })))
        .mount(&server)
        .await;

    let api = HttpSessionApi::new(&server.uri());
    api.delete_session(session_id).await.unwrap();
}
