pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use triad_agent::cli::{AgentArgs, ConnectionArgs};

#[derive(Parser)]
#[command(name = "triad")]
#[command(author = "Triad Networks")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Contribute host resources to a Triad coordinator and inspect your account", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run a contribution session until Ctrl+C")]
    Contribute(AgentArgs),

    #[command(about = "Show the account record (balance, devices, totals)")]
    State(QueryArgs),

    #[command(about = "List account transactions")]
    Transactions(QueryArgs),

    #[command(about = "Show trees planted by this account")]
    Trees(QueryArgs),

    #[command(about = "Request a fresh authorization token (token-push coordinators)")]
    Token(QueryArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json, help = "Output format")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}
