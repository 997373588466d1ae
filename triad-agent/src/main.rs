//! triad-agent - contributes this host's resources to a Triad coordinator
//!
//! The agent:
//! - Connects to the coordinator and registers the device
//! - Waits for the authorization token (token-push coordinators)
//! - Reports CPU, memory, storage, bandwidth and uptime every interval
//! - Stops on Ctrl+C, or when the CPU reaches the thermal limit

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use triad_agent::cli::AgentArgs;
use triad_agent::{run_agent, LoopExit};

#[derive(Parser)]
#[command(name = "triad-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Contribute this host's resources to a Triad coordinator", long_about = None)]
struct Cli {
    #[command(flatten)]
    agent: AgentArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.agent.into_config()?;

    info!("triad-agent starting...");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            on_signal.cancel();
        }
    });

    let summary = run_agent(config, cancel).await?;
    if let LoopExit::SafetyAbort {
        temperature_c,
        threshold_c,
    } = summary.exit
    {
        warn!(
            "Contribution stopped to protect the CPU ({:.1}°C >= {:.1}°C). \
             Let the machine cool down before restarting.",
            temperature_c, threshold_c
        );
    }

    info!(
        "triad-agent stopped after {} contributions",
        summary.contributions_sent
    );
    Ok(())
}
