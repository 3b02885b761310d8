//! Parla agent binary — deployment wrapper for the English-teacher voice
//! agent.
//!
//! Usage: `parla-agent <mode>` where mode is one of `console`, `dev`,
//! `background`, or `render`. Exits non-zero on an unrecognized mode, missing
//! configuration, or a fatal session failure.

use parla_agent::RunMode;
use std::process::ExitCode;

fn usage() {
    eprintln!("usage: parla-agent <console|dev|background|render>");
    eprintln!();
    eprintln!("  console     local microphone/speaker conversation");
    eprintln!("  dev         connect the playground room, log a visitor join token");
    eprintln!("  background  join the assigned room under an external supervisor");
    eprintln!("  render      background behavior plus GET /health on $PORT");
}

#[tokio::main]
async fn main() -> ExitCode {
    parla_config::load_dotenv();
    parla_agent::init_tracing();

    let Some(token) = std::env::args().nth(1) else {
        usage();
        return ExitCode::from(2);
    };

    // Invalid mode tokens fail before any configuration or session work.
    let mode: RunMode = match token.parse() {
        Ok(mode) => mode,
        Err(e) => {
            tracing::error!("{e}");
            usage();
            return ExitCode::from(2);
        }
    };

    let settings = match parla_config::Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%mode, "starting parla agent");

    match parla_agent::run(mode, settings).await {
        Ok(()) => {
            tracing::info!("parla agent shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "parla agent failed");
            ExitCode::FAILURE
        }
    }
}
