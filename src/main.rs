use clap::Parser;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;
use triad::cli::{commands, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let directives = triad::log_directives(cli.verbose, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid log filter {:?}: {}", directives, e);
        EnvFilter::new("info")
    });

    // Also installs the log bridge, so agent `log` records land here
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("Starting triad v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Some(command) => commands::handle_command(command).await,
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
