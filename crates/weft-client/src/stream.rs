// Live event stream connector
//
// Owns at most one SSE subscription per session. Frames are decoded by
// event name into SessionEvents exactly once, here at the boundary:
// heartbeats and the connection acknowledgment are consumed internally,
// unrecognized names are tagged rather than dropped, and malformed payloads
// are logged and skipped so a bad frame can never kill the stream.
//
// Reconnection is deliberately not handled here; a dropped stream flips the
// status to disconnected and the caller decides when to connect again.
// Teardown is idempotent and also runs on drop.

use std::sync::Arc;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use weft_core::{EventType, SessionEvent};

use crate::client::ApiError;

/// Capacity of the delivery channel; comfortably above the server's
/// per-session event history cap
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection lifecycle as observed by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Decoded outcome of one SSE frame
#[derive(Debug)]
enum Frame {
    Event(SessionEvent),
    Heartbeat,
    Ack,
    Malformed(String),
}

/// SSE subscription handle for one session at a time
pub struct SseConnector {
    base_url: String,
    http: reqwest::Client,
    status: Arc<watch::Sender<ConnectionStatus>>,
    task: Option<JoinHandle<()>>,
}

impl SseConnector {
    pub fn new(base_url: &str) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            status: Arc::new(status),
            task: None,
        }
    }

    /// Observe connection lifecycle changes
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Open the stream for `session_id`, tearing down any prior
    /// subscription first. Returns the receiving end of the event channel;
    /// the channel closing signals a dropped stream. Safe to call again at
    /// any time - the server replays recent history on reconnect and the
    /// ledger's dedup rule absorbs it.
    pub async fn connect(
        &mut self,
        session_id: Uuid,
    ) -> Result<mpsc::Receiver<SessionEvent>, ApiError> {
        self.disconnect();
        self.status.send_replace(ConnectionStatus::Connecting);

        let url = format!("{}/sessions/{}/stream", self.base_url, session_id);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                self.status.send_replace(ConnectionStatus::Disconnected);
                return Err(err.into());
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            self.status.send_replace(ConnectionStatus::Disconnected);
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            self.status.send_replace(ConnectionStatus::Disconnected);
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let status_tx = Arc::clone(&self.status);
        status_tx.send_replace(ConnectionStatus::Connected);

        let task = tokio::spawn(async move {
            let mut frames = response.bytes_stream().eventsource();
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(frame) => match decode_frame(session_id, &frame.event, &frame.data) {
                        Frame::Event(event) => {
                            if tx.send(event).await.is_err() {
                                // Receiver gone; the view was torn down.
                                break;
                            }
                        }
                        Frame::Heartbeat => {
                            tracing::trace!(%session_id, "heartbeat");
                        }
                        Frame::Ack => {
                            tracing::debug!(%session_id, "stream acknowledged");
                        }
                        Frame::Malformed(reason) => {
                            tracing::warn!(
                                %session_id,
                                event = %frame.event,
                                %reason,
                                "dropping malformed stream frame"
                            );
                        }
                    },
                    Err(err) => {
                        tracing::warn!(%session_id, error = %err, "session stream interrupted");
                        break;
                    }
                }
            }
            status_tx.send_replace(ConnectionStatus::Disconnected);
        });

        self.task = Some(task);
        Ok(rx)
    }

    /// Release the underlying transport. Idempotent; safe with no
    /// subscription active.
    pub fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
    }
}

impl Drop for SseConnector {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Decode one frame. `name` is the SSE event name, `data` its payload.
fn decode_frame(session_id: Uuid, name: &str, data: &str) -> Frame {
    match name {
        "heartbeat" => return Frame::Heartbeat,
        "connected" => return Frame::Ack,
        _ => {}
    }

    let payload: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => return Frame::Malformed(err.to_string()),
    };

    match EventType::from(name) {
        EventType::Unknown(kind) => Frame::Event(SessionEvent::unknown(session_id, kind, payload)),
        _ => match serde_json::from_value::<SessionEvent>(payload) {
            Ok(event) => Frame::Event(event),
            Err(err) => Frame::Malformed(err.to_string()),
        },
    }
}
