//! Run-mode selection.
//!
//! The mode is chosen once at startup from a single command-line token and
//! never changes within a process. A closed enum keeps unrecognized tokens
//! from silently falling through to an unsupported behavior.

use crate::AgentError;
use std::fmt;
use std::str::FromStr;

/// The four terminal run modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Local microphone/speaker conversation, no room or avatar.
    Console,
    /// Full session against the playground room, join token logged for
    /// browser participants.
    Dev,
    /// Full session auto-joining the assigned room; restarts belong to an
    /// external process manager.
    Background,
    /// Background behavior plus the health endpoint on the platform port.
    Render,
}

impl RunMode {
    pub const ALL: [RunMode; 4] = [
        RunMode::Console,
        RunMode::Dev,
        RunMode::Background,
        RunMode::Render,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Console => "console",
            RunMode::Dev => "dev",
            RunMode::Background => "background",
            RunMode::Render => "render",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = AgentError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "console" => Ok(RunMode::Console),
            "dev" => Ok(RunMode::Dev),
            "background" => Ok(RunMode::Background),
            "render" => Ok(RunMode::Render),
            other => Err(AgentError::InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_four_modes_parse() {
        for mode in RunMode::ALL {
            assert_eq!(mode.as_str().parse::<RunMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_tokens_are_rejected_with_the_token_named() {
        for token in ["cloud", "CONSOLE", "invalid_mode", "", "daemon"] {
            match token.parse::<RunMode>() {
                Err(AgentError::InvalidMode(named)) => assert_eq!(named, token),
                other => panic!("expected InvalidMode for {token:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn invalid_mode_message_names_the_token() {
        let err = "invalid_mode".parse::<RunMode>().unwrap_err();
        assert!(err.to_string().contains("invalid_mode"));
    }
}
