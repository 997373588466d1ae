use crate::cli::{Commands, OutputFormat, QueryArgs};
use crate::{Result, TriadError};
use serde_json::Value;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use triad_agent::cli::AgentArgs;
use triad_agent::{run_agent, run_query, LoopExit, Query, SessionSummary};

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Contribute(args) => handle_contribute(args).await,
        Commands::State(args) => handle_query(args, Query::State).await,
        Commands::Transactions(args) => handle_query(args, Query::Transactions).await,
        Commands::Trees(args) => handle_query(args, Query::Trees).await,
        Commands::Token(args) => handle_query(args, Query::Token).await,
    }
}

async fn handle_contribute(args: AgentArgs) -> Result<()> {
    let config = args.into_config()?;
    info!(
        "Contributing to {} ({}, load {})",
        config.endpoint,
        config.protocol.as_str(),
        config.load_value
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            on_signal.cancel();
        }
    });

    let summary = run_agent(config, cancel).await?;
    println!("{}", summary_line(&summary));
    if let LoopExit::SafetyAbort { .. } = summary.exit {
        warn!("Contribution stopped to protect the CPU, let the machine cool down before restarting");
    }
    Ok(())
}

async fn handle_query(args: QueryArgs, query: Query) -> Result<()> {
    let config = args.connection.into_config()?;
    let reply = run_query(&config, query).await?;
    println!("{}", render(&reply, args.format)?);
    Ok(())
}

pub fn render(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).map_err(|e| TriadError::RenderError(e.to_string()))
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(value).map_err(|e| TriadError::RenderError(e.to_string()))
        }
    }
}

pub fn summary_line(summary: &SessionSummary) -> String {
    format!(
        "Session {}: {} contributions sent, {} token pushes, {} frames received",
        summary.exit, summary.contributions_sent, summary.token_rotations, summary.frames_received
    )
}
