// Weft CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Rendering only reads the engine's derived transcript and
//                  session projection; it never touches the ledger directly.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use weft_client::{HttpSessionApi, SseConnector};
use weft_core::{EngineConfig, SessionEngine};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Weft - follow server-executed agent sessions from the terminal")]
#[command(version)]
pub struct Cli {
    /// API base URL
    #[arg(long, env = "WEFT_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    /// Seconds between reconnect attempts after a dropped stream
    #[arg(long, default_value = "2")]
    pub reconnect_interval: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a query as a new session and stream its execution
    Run {
        /// Query text to execute
        query: String,

        /// Kind of agent run
        #[arg(long, short = 't', default_value = "chat", value_parser = ["chat", "research", "docs"])]
        query_type: String,

        /// Repository hint for the docs agent
        #[arg(long)]
        repo: Option<String>,

        /// Max wait time in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Attach to an existing session and stream its execution
    Attach {
        /// Session ID
        session: uuid::Uuid,

        /// Max wait time in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Post a follow-up message to a session and stream the new turn
    Post {
        /// Session ID
        session: uuid::Uuid,

        /// Query text to execute
        query: String,

        /// Kind of agent run
        #[arg(long, short = 't', default_value = "chat", value_parser = ["chat", "research", "docs"])]
        query_type: String,

        /// Repository hint for the docs agent
        #[arg(long)]
        repo: Option<String>,

        /// Max wait time in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Inspect and manage sessions
    Sessions {
        #[command(subcommand)]
        command: commands::sessions::SessionsCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = Arc::new(HttpSessionApi::new(&cli.api_url));
    let output_format = output::OutputFormat::from_str(&cli.output);
    let config = EngineConfig {
        reconnect_interval: Duration::from_secs(cli.reconnect_interval),
        ..EngineConfig::default()
    };

    match cli.command {
        Commands::Run {
            query,
            query_type,
            repo,
            timeout,
        } => {
            let mut engine = SessionEngine::new(api.clone(), config);
            let mut connector = SseConnector::new(&cli.api_url);
            commands::follow::run(
                &mut engine,
                &mut connector,
                output_format,
                cli.quiet,
                &query,
                query_type.as_str().into(),
                repo.as_deref(),
                Duration::from_secs(timeout),
            )
            .await
        }
        Commands::Attach { session, timeout } => {
            let mut engine = SessionEngine::new(api.clone(), config);
            let mut connector = SseConnector::new(&cli.api_url);
            commands::follow::attach(
                &mut engine,
                &mut connector,
                output_format,
                cli.quiet,
                session,
                Duration::from_secs(timeout),
            )
            .await
        }
        Commands::Post {
            session,
            query,
            query_type,
            repo,
            timeout,
        } => {
            let mut engine = SessionEngine::new(api.clone(), config);
            let mut connector = SseConnector::new(&cli.api_url);
            commands::follow::post(
                &mut engine,
                &mut connector,
                output_format,
                cli.quiet,
                session,
                &query,
                query_type.as_str().into(),
                repo.as_deref(),
                Duration::from_secs(timeout),
            )
            .await
        }
        Commands::Sessions { command } => {
            commands::sessions::run(command, api.as_ref(), output_format).await
        }
    }
}
