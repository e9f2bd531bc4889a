// Session management commands

use anyhow::Result;
use clap::Subcommand;
use uuid::Uuid;

use weft_client::HttpSessionApi;
use weft_core::{EngineError, SessionApi};

use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// Get session status by ID
    Get {
        /// Session ID
        session: Uuid,
    },

    /// List recent events for a session
    Events {
        /// Session ID
        session: Uuid,

        /// Max number of events
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Delete a session and its server-side data
    Delete {
        /// Session ID
        session: Uuid,
    },
}

pub async fn run(
    command: SessionsCommand,
    api: &HttpSessionApi,
    output: OutputFormat,
) -> Result<()> {
    match command {
        SessionsCommand::Get { session } => get(api, output, session).await,
        SessionsCommand::Events { session, limit } => events(api, output, session, limit).await,
        SessionsCommand::Delete { session } => delete(api, session).await,
    }
}

async fn get(api: &HttpSessionApi, output: OutputFormat, session_id: Uuid) -> Result<()> {
    let session = api.fetch_session(session_id).await.map_err(not_found_hint)?;

    if output.is_text() {
        print_field("ID", &session.session_id.to_string());
        print_field("Status", &session.status.to_string());
        print_field("Created", &session.created_at.to_rfc3339());
        if let Some(started) = session.started_at {
            print_field("Started", &started.to_rfc3339());
        }
        if let Some(completed) = session.completed_at {
            print_field("Completed", &completed.to_rfc3339());
        }
        if let Some(execution_time) = session.execution_time {
            print_field("Duration", &format!("{:.2}s", execution_time));
        }
        if let Some(error) = &session.error {
            print_field("Error", error);
        }
    } else {
        output.print_value(&session);
    }

    Ok(())
}

async fn events(
    api: &HttpSessionApi,
    output: OutputFormat,
    session_id: Uuid,
    limit: usize,
) -> Result<()> {
    let events = api
        .fetch_events(session_id, Some(limit))
        .await
        .map_err(not_found_hint)?;

    if output.is_text() {
        if events.is_empty() {
            println!("No events recorded");
            return Ok(());
        }

        print_table_header(&[("TIMESTAMP", 25), ("TYPE", 18), ("STEP", 30), ("STATUS", 10)]);
        for event in &events {
            print_table_row(&[
                (&event.timestamp.to_rfc3339(), 25),
                (event.event_type.as_str(), 18),
                (event.step_name.as_deref().unwrap_or("-"), 30),
                (event.status.as_deref().unwrap_or("-"), 10),
            ]);
        }
    } else {
        output.print_value(&events);
    }

    Ok(())
}

async fn delete(api: &HttpSessionApi, session_id: Uuid) -> Result<()> {
    api.delete_session(session_id).await.map_err(not_found_hint)?;
    println!("Deleted session {}", session_id);
    Ok(())
}

fn not_found_hint(err: EngineError) -> anyhow::Error {
    match err {
        EngineError::SessionNotFound(id) => anyhow::anyhow!("Session not found: {}", id),
        err => err.into(),
    }
}
