pub mod cli;
pub mod error;

pub use error::{Result, TriadError};

#[cfg(feature = "common")]
pub use triad_common as common;
pub use triad_agent as agent;
pub use triad_proto as proto;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log directives for the CLI: `RUST_LOG` when set, otherwise `debug` or `info`
pub fn log_directives(verbose: bool, rust_log: Option<String>) -> String {
    match rust_log {
        Some(directives) if !directives.trim().is_empty() => directives,
        _ if verbose => "debug".to_string(),
        _ => "info".to_string(),
    }
}
