//! Environment configuration for the Parla agent.
//!
//! All connection parameters come from the process environment (optionally
//! seeded from `.env.local` / `.env`). Required keys fail fast with
//! [`ConfigError::MissingVar`] naming the exact variable; optional keys have
//! documented defaults. Settings are immutable after load and redact secrets
//! in `Debug` output.

use std::fmt;
use thiserror::Error;

/// Required environment variables, checked before any session construction.
pub const REQUIRED_VARS: [&str; 7] = [
    "LIVEKIT_URL",
    "LIVEKIT_API_KEY",
    "LIVEKIT_API_SECRET",
    "GOOGLE_API_KEY",
    "TAVUS_API_KEY",
    "TAVUS_REPLICA_ID",
    "TAVUS_PERSONA_ID",
];

fn default_health_port() -> u16 {
    8000
}

fn default_room_name() -> String {
    "english-teacher-demo".to_string()
}

fn default_gemini_model() -> String {
    "models/gemini-2.0-flash-exp".to_string()
}

fn default_gemini_voice() -> String {
    "Puck".to_string()
}

fn default_gemini_temperature() -> f32 {
    0.8
}

/// Gemini Live API WebSocket endpoint.
pub const DEFAULT_GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Tavus conversations API base URL.
pub const DEFAULT_TAVUS_API_URL: &str = "https://tavusapi.com";

/// Connection settings for the realtime media platform.
#[derive(Clone)]
pub struct LiveKitSettings {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for LiveKitSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitSettings")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Connection settings for the language-model realtime API.
#[derive(Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub temperature: f32,
    /// WebSocket endpoint. Overridable via `GEMINI_LIVE_URL` so tests can
    /// point the client at a local stub server.
    pub live_url: String,
}

impl fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("temperature", &self.temperature)
            .field("live_url", &self.live_url)
            .finish()
    }
}

/// Connection settings for the avatar-rendering service.
#[derive(Clone)]
pub struct TavusSettings {
    pub api_key: String,
    pub replica_id: String,
    pub persona_id: String,
    /// API base URL. Overridable via `TAVUS_API_URL` for tests.
    pub api_url: String,
}

impl fmt::Debug for TavusSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TavusSettings")
            .field("api_key", &"[REDACTED]")
            .field("replica_id", &self.replica_id)
            .field("persona_id", &self.persona_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Top-level agent settings, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Settings {
    pub livekit: LiveKitSettings,
    pub gemini: GeminiSettings,
    pub tavus: TavusSettings,
    /// Room auto-joined in dev/background/render modes.
    pub room_name: String,
    /// Health endpoint listen port (render mode). Default: 8000.
    pub health_port: u16,
}

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An optional variable is present but unparseable.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Seeds the process environment from `.env.local`, then `.env`.
///
/// Existing process variables are never overridden, and the local file wins
/// over the shared one. Missing files are not an error.
pub fn load_dotenv() {
    if dotenvy::from_filename(".env.local").is_ok() {
        tracing::debug!("loaded environment from .env.local");
    }
    if dotenvy::dotenv().is_ok() {
        tracing::debug!("loaded environment from .env");
    }
}

impl Settings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] naming the first absent required
    /// variable, or [`ConfigError::InvalidValue`] for an unparseable optional
    /// one.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an injected key lookup.
    ///
    /// Tests use this to supply a fixed map instead of mutating the real
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| -> Result<String, ConfigError> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(ConfigError::MissingVar(key)),
            }
        };

        let livekit = LiveKitSettings {
            url: require("LIVEKIT_URL")?,
            api_key: require("LIVEKIT_API_KEY")?,
            api_secret: require("LIVEKIT_API_SECRET")?,
        };

        let temperature = match lookup("GEMINI_TEMPERATURE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "GEMINI_TEMPERATURE",
                message: format!("expected a number, got {raw:?}"),
            })?,
            None => default_gemini_temperature(),
        };

        let gemini = GeminiSettings {
            api_key: require("GOOGLE_API_KEY")?,
            model: lookup("GEMINI_MODEL").unwrap_or_else(default_gemini_model),
            voice: lookup("GEMINI_VOICE").unwrap_or_else(default_gemini_voice),
            temperature,
            live_url: lookup("GEMINI_LIVE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_LIVE_URL.to_string()),
        };

        let tavus = TavusSettings {
            api_key: require("TAVUS_API_KEY")?,
            replica_id: require("TAVUS_REPLICA_ID")?,
            persona_id: require("TAVUS_PERSONA_ID")?,
            api_url: lookup("TAVUS_API_URL").unwrap_or_else(|| DEFAULT_TAVUS_API_URL.to_string()),
        };

        let health_port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                message: format!("expected a port number, got {raw:?}"),
            })?,
            None => default_health_port(),
        };

        Ok(Self {
            livekit,
            gemini,
            tavus,
            room_name: lookup("PARLA_ROOM").unwrap_or_else(default_room_name),
            health_port,
        })
    }
}
