//! Parla agent library: run-mode dispatch, health endpoint, console audio.
//!
//! The binary in `main.rs` stays thin; everything dispatchable or testable
//! lives here.

pub mod audio;
pub mod health;
pub mod mode;
pub mod run;

pub use mode::RunMode;
pub use run::run;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors surfaced by the agent binary.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The run-mode token on the command line is not one of the four modes.
    #[error("invalid run mode {0:?} (expected console, dev, background, or render)")]
    InvalidMode(String),

    #[error(transparent)]
    Config(#[from] parla_config::ConfigError),

    #[error(transparent)]
    Session(#[from] parla_session::SessionError),

    #[error("audio device error: {0}")]
    Audio(String),

    #[error("health endpoint error: {0}")]
    Health(String),
}

/// Initializes tracing from `PARLA_LOG_LEVEL` / `PARLA_LOG_JSON`.
///
/// Defaults to `info` with the plain formatter when unset or unparseable.
pub fn init_tracing() {
    let level = std::env::var("PARLA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("PARLA_LOG_JSON")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
