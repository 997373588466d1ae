use clap::Parser;
use serde_json::json;
use triad::cli::commands::{render, summary_line};
use triad::cli::{Cli, Commands, OutputFormat};
use triad::error::TriadError;
use triad_agent::{LoopExit, ProtocolKind, SessionError, SessionSummary};

#[test]
fn test_error_types() {
    let err = TriadError::from(SessionError::Connectivity {
        endpoint: "ws://localhost:8080/ws".to_string(),
        attempts: 5,
        last_error: "connection refused".to_string(),
    });

    assert!(err.to_string().contains("ws://localhost:8080/ws"));
    assert!(err.to_string().contains("5 attempts"));
}

#[test]
fn test_version_const() {
    assert!(!triad::VERSION.is_empty());
}

#[test]
fn test_contribute_parses_agent_args() {
    let cli = Cli::try_parse_from([
        "triad",
        "-v",
        "contribute",
        "60",
        "--protocol",
        "request-response",
        "--device-id",
        "rig-2",
    ])
    .unwrap();
    assert!(cli.verbose);

    let Some(Commands::Contribute(args)) = cli.command else {
        panic!("expected contribute");
    };
    let config = args.into_config().unwrap();
    assert_eq!(config.protocol, ProtocolKind::RequestResponse);
    assert_eq!(config.load_value, 60.0);
    assert_eq!(config.device_id, "rig-2");
}

#[test]
fn test_query_format_flag() {
    let cli = Cli::try_parse_from(["triad", "trees", "--format", "yaml", "-d", "rig"]).unwrap();
    match cli.command {
        Some(Commands::Trees(args)) => {
            assert_eq!(args.format, OutputFormat::Yaml);
            assert_eq!(args.connection.device_id.as_deref(), Some("rig"));
        }
        _ => panic!("expected trees"),
    }
}

#[test]
fn test_render_formats() {
    let value = json!({"treesPlanted": 3});

    let as_json = render(&value, OutputFormat::Json).unwrap();
    assert!(as_json.contains("\"treesPlanted\": 3"));

    let as_yaml = render(&value, OutputFormat::Yaml).unwrap();
    assert_eq!(as_yaml.trim(), "treesPlanted: 3");
}

#[test]
fn test_summary_line() {
    let summary = SessionSummary {
        exit: LoopExit::Cancelled,
        contributions_sent: 4,
        token_rotations: 2,
        frames_received: 9,
    };
    assert_eq!(
        summary_line(&summary),
        "Session cancelled: 4 contributions sent, 2 token pushes, 9 frames received"
    );
}

#[test]
fn test_log_directives() {
    assert_eq!(triad::log_directives(false, None), "info");
    assert_eq!(triad::log_directives(true, None), "debug");
    assert_eq!(triad::log_directives(true, Some(" ".to_string())), "debug");
    assert_eq!(
        triad::log_directives(false, Some("triad_agent=trace".to_string())),
        "triad_agent=trace"
    );
}
