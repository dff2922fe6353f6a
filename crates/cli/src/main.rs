//! `pressline` -- local front-end to the conversion and workflow pipeline.
//!
//! Exit codes: 0 on success, 2 when input fails schema or quality
//! validation, 3 when a step or job fails terminally.
//!
//! Logs go to stderr (`RUST_LOG`, `LOG_FORMAT=json`); reports go to stdout.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pressline_cli::error::EXIT_FAILED;
use pressline_cli::{execute, Cli};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pressline_cli=info,pressline_pipeline=info".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_report(report: &serde_json::Value, json: bool) -> anyhow::Result<()> {
    let text = if json {
        serde_json::to_string(report)?
    } else {
        serde_json::to_string_pretty(report)?
    };
    println!("{text}");
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match execute(&cli.command) {
        Ok(outcome) => {
            if let Err(e) = print_report(&outcome.report, cli.json) {
                tracing::error!(error = %e, "Failed to print report");
                return ExitCode::from(EXIT_FAILED);
            }
            ExitCode::from(outcome.exit_code)
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
