use thiserror::Error;

/// Errors surfaced while constructing or running a session.
///
/// Remote-service failures are wrapped verbatim; nothing is retried or
/// reinterpreted here.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("LiveKit token error: {0}")]
    Token(#[from] livekit_api::access_token::AccessTokenError),

    #[error("room service error: {0}")]
    RoomService(String),

    #[error("room media error: {0}")]
    RoomMedia(String),

    #[error("avatar service error (HTTP {status}): {message}")]
    Avatar { status: u16, message: String },

    #[error("avatar transport error: {0}")]
    AvatarTransport(#[from] reqwest::Error),

    #[error("model connection error: {0}")]
    ModelConnect(String),

    #[error("model stream error: {0}")]
    ModelStream(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("model protocol error: {0}")]
    ModelProtocol(String),
}

impl SessionError {
    /// True when the avatar service rejected the conversation for lack of
    /// conversational credits (HTTP 402).
    pub fn is_avatar_credit_exhaustion(&self) -> bool {
        matches!(self, Self::Avatar { status: 402, .. })
    }
}
