// Follow commands - create, attach to, or continue a session and stream
// its execution until the turn settles
//
// The snapshot fetch and the stream connect are issued concurrently; the
// engine's ledger absorbs whichever order they land in. Reconnects after a
// dropped stream happen here, on the engine's configured interval - the
// engine itself stays agnostic to retry policy.

use anyhow::Result;
use std::time::Duration;
use uuid::Uuid;

use weft_client::SseConnector;
use weft_core::{DisplayMessage, EngineError, EventType, QueryType, Role, SessionEngine};

use crate::output::OutputFormat;

/// One observation from the live stream while following a session
enum StreamStep {
    Event(weft_core::SessionEvent),
    Dropped,
    TimedOut,
}

/// Create a session from `query` and stream it to completion
#[allow(clippy::too_many_arguments)]
pub async fn run(
    engine: &mut SessionEngine,
    connector: &mut SseConnector,
    output: OutputFormat,
    quiet: bool,
    query: &str,
    query_type: QueryType,
    repo: Option<&str>,
    timeout: Duration,
) -> Result<()> {
    let session_id = match engine.start(query, query_type, repo).await {
        Ok(id) => id,
        Err(EngineError::Submission { message, input }) => {
            if output.is_text() {
                eprintln!("Submission failed: {}", message);
                eprintln!("Recovered input: {}", input);
            }
            anyhow::bail!("submission failed: {}", message);
        }
        Err(err) => return Err(err.into()),
    };

    if !quiet && output.is_text() {
        println!("Session: {}", session_id);
        println!("You: {}\n", query);
    }

    follow_session(
        engine, connector, output, quiet, session_id, timeout, false, false,
    )
    .await
}

/// Attach to an existing session: print what already happened, then stream
pub async fn attach(
    engine: &mut SessionEngine,
    connector: &mut SseConnector,
    output: OutputFormat,
    quiet: bool,
    session_id: Uuid,
    timeout: Duration,
) -> Result<()> {
    follow_session(
        engine, connector, output, quiet, session_id, timeout, true, false,
    )
    .await
}

/// Post a follow-up message on an existing session and stream the new turn
#[allow(clippy::too_many_arguments)]
pub async fn post(
    engine: &mut SessionEngine,
    connector: &mut SseConnector,
    output: OutputFormat,
    quiet: bool,
    session_id: Uuid,
    query: &str,
    query_type: QueryType,
    repo: Option<&str>,
    timeout: Duration,
) -> Result<()> {
    engine.open(session_id).await?;

    match engine.submit(query, Some(query_type), repo).await {
        Ok(_) => {}
        Err(EngineError::Submission { message, input }) => {
            if output.is_text() {
                eprintln!("Submission failed: {}", message);
                eprintln!("Recovered input: {}", input);
            }
            anyhow::bail!("submission failed: {}", message);
        }
        Err(err) => return Err(err.into()),
    }

    if !quiet && output.is_text() {
        println!("You: {}\n", query);
    }

    follow_session(
        engine, connector, output, quiet, session_id, timeout, false, true,
    )
    .await
}

/// Stream events into the engine until the followed turn reaches a terminal
/// status, the deadline passes, or the caller gives up on reconnects.
#[allow(clippy::too_many_arguments)]
async fn follow_session(
    engine: &mut SessionEngine,
    connector: &mut SseConnector,
    output: OutputFormat,
    quiet: bool,
    session_id: Uuid,
    timeout: Duration,
    print_history: bool,
    require_new_turn: bool,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;

    let (opened, connected) = tokio::join!(engine.open(session_id), connector.connect(session_id));
    opened?;
    let mut rx = match connected {
        Ok(rx) => Some(rx),
        Err(err) => {
            tracing::warn!(error = %err, "initial stream connect failed; will retry");
            None
        }
    };

    if print_history && output.is_text() {
        render_transcript(&engine.transcript());
    }

    // For a follow-up post, the session is typically still terminal from the
    // previous turn; only start watching for terminal once the new turn's
    // user_message/session_started pair has come through.
    let mut turn_open = !require_new_turn;
    let mut live_terminal_seen = false;
    let mut timed_out = false;

    while !(turn_open && engine.session().is_some_and(|s| s.is_terminal())) {
        if rx.is_none() {
            // Dropped stream: reconnect on the configured interval. The
            // server replays recent history and the ledger dedups it.
            tokio::select! {
                _ = tokio::time::sleep(engine.config().reconnect_interval) => {}
                _ = tokio::time::sleep_until(deadline) => {
                    timed_out = true;
                    break;
                }
            }
            match connector.connect(session_id).await {
                Ok(new_rx) => {
                    rx = Some(new_rx);
                    // Refresh the snapshot to fill any gap the drop left.
                    if let Err(err) = engine.open(session_id).await {
                        tracing::warn!(error = %err, "snapshot refresh after reconnect failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "reconnect failed");
                }
            }
            continue;
        }

        let step = {
            let channel = match rx.as_mut() {
                Some(channel) => channel,
                None => continue,
            };
            tokio::select! {
                maybe = channel.recv() => match maybe {
                    Some(event) => StreamStep::Event(event),
                    None => StreamStep::Dropped,
                },
                _ = tokio::time::sleep_until(deadline) => StreamStep::TimedOut,
            }
        };

        match step {
            StreamStep::Event(event) => {
                let is_live = !event.is_historical;
                let kind = event.event_type.clone();
                let step_name = event.step_name.clone();
                let appended = engine.ingest(event);

                if is_live && matches!(kind, EventType::UserMessage | EventType::SessionStarted) {
                    turn_open = true;
                }
                if appended
                    && matches!(kind, EventType::SessionCompleted | EventType::SessionFailed)
                {
                    live_terminal_seen = true;
                }
                if appended && kind == EventType::StepUpdate && output.is_text() && !quiet {
                    println!("  · {}", step_name.unwrap_or_else(|| "step".to_string()));
                }
            }
            StreamStep::Dropped => {
                rx = None;
                if !quiet && output.is_text() {
                    eprintln!("stream dropped; reconnecting...");
                }
            }
            StreamStep::TimedOut => {
                timed_out = true;
                break;
            }
        }
    }

    if timed_out && output.is_text() {
        eprintln!("\nTimeout waiting for completion");
    }

    let transcript = engine.transcript();
    if output.is_text() {
        // When history was already printed, only a turn that settled during
        // the follow adds anything new.
        if !print_history || live_terminal_seen {
            if let Some(message) = transcript
                .iter()
                .rev()
                .find(|m| matches!(m.role, Role::Assistant | Role::Error))
            {
                match message.role {
                    Role::Error => eprintln!("\nError: {}", message.content),
                    _ => println!("\n{}", message.content),
                }
            }
        }
        if !quiet {
            if let Some(execution_time) = engine.session().and_then(|s| s.execution_time) {
                println!("\n({:.2}s)", execution_time);
            }
        }
    } else {
        output.print_value(&transcript);
    }

    Ok(())
}

/// Render a full transcript for text output
fn render_transcript(messages: &[DisplayMessage]) {
    for message in messages {
        match message.role {
            Role::User => println!("You: {}", message.content),
            Role::Assistant => {
                for step in &message.steps {
                    println!("  · {}", step.description);
                }
                println!("Agent: {}\n", message.content);
            }
            Role::Error => println!("Error: {}\n", message.content),
            Role::System => println!("{}\n", message.content),
        }
    }
}
