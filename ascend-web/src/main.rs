use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ascend_flow::collaborators::stub::StubCollaborators;
use ascend_flow::collaborators::Collaborators;
use ascend_flow::events::spawn_event_dispatcher;
use ascend_flow::{EventBus, FlowConfig, Orchestrator};
use ascend_web::state::AppState;

#[derive(Parser)]
#[command(name = "ascend-web", about = "Runs client flows behind an HTTP API")]
struct Cli {
    /// Path to config file (default: ~/.config/ascend/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = FlowConfig::load(cli.config.as_ref())?;
    let port = cli.port.unwrap_or(config.http_port);
    info!(
        port = port,
        timeout_ms = config.collaborator_timeout.as_millis() as u64,
        templates = config.workspace_templates.len(),
        "loaded config"
    );

    let collaborators = Collaborators::from_shared(StubCollaborators::new().into_shared());
    let events = EventBus::new(config.event_capacity);
    let cancel = CancellationToken::new();

    let dispatcher_handle = spawn_event_dispatcher(
        &events,
        collaborators.clone(),
        config.collaborator_timeout,
        cancel.clone(),
    );

    let orchestrator = Arc::new(Orchestrator::new(collaborators, events, config));
    let state = AppState::new(orchestrator, cancel.clone());
    let http_handle = ascend_web::spawn_http_server(state, port, cancel.clone()).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();

    if let Err(e) = http_handle.await {
        error!(error = %e, "HTTP server task failed");
    }
    if let Err(e) = dispatcher_handle.await {
        error!(error = %e, "event dispatcher task failed");
    }

    info!("ascend-web stopped");
    Ok(())
}
