#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use anyhow::{Context, Result};
use clap::Parser;
use planstream::Config;
use planstream::gateway;
use planstream::planner::{ChatMessage, FallbackPlanGenerator, PlanGenerator, PlanRequest};
use planstream::session::{ChatRequest, SessionOrchestrator, SessionState};
use planstream::stream::EventWriter;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("load configuration")?;

    // Logs go to stderr; stdout carries SSE frames and plans.
    let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("install tracing subscriber")?;

    match cli.command {
        Commands::Serve { port, host } => {
            let mut config = config;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            gateway::run_gateway(Arc::new(config)).await
        }
        Commands::Run {
            message,
            active_row,
            project,
        } => run_once(&config, message.join(" "), active_row, project).await,
        Commands::Plan {
            message,
            active_row,
            project,
        } => print_plan(&config, message.join(" "), active_row, project).await,
    }
}

async fn run_once(
    config: &Config,
    message: String,
    active_row_id: Option<i64>,
    project_id: Option<i64>,
) -> Result<()> {
    let orchestrator = SessionOrchestrator::from_config(config);
    let cancel = CancellationToken::new();
    let (writer, mut frames) = EventWriter::channel(config.gateway.event_buffer, cancel.clone());
    let request = ChatRequest {
        messages: vec![ChatMessage::user(message)],
        active_row_id,
        project_id,
    };

    let session =
        tokio::spawn(async move { orchestrator.run(request, BTreeMap::new(), writer).await });

    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                stdout
                    .write_all(frame.to_sse().as_bytes())
                    .await
                    .context("write event to stdout")?;
                stdout.flush().await.context("flush stdout")?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; cancelling session");
                cancel.cancel();
                break;
            }
        }
    }

    let state = session.await.context("join session task")?;
    if state == SessionState::Error {
        anyhow::bail!("session ended with an error");
    }
    Ok(())
}

async fn print_plan(
    config: &Config,
    message: String,
    active_row_id: Option<i64>,
    project_id: Option<i64>,
) -> Result<()> {
    let planner = FallbackPlanGenerator::from_config(config);
    let request = PlanRequest {
        messages: vec![ChatMessage::user(message)],
        active_row_id,
        project_id,
        ..PlanRequest::default()
    };
    let plan = planner
        .generate(&request, &CancellationToken::new())
        .await
        .context("generate plan")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&plan).context("serialize plan")?
    );
    Ok(())
}
