//! Session bootstrapping for the Parla English-teacher agent.
//!
//! Wires three hosted services together: LiveKit for room transport and join
//! tokens, the Gemini Live API for the realtime conversation, and Tavus for
//! avatar rendering. No protocol machinery is implemented here beyond the
//! documented wire shapes of each service; the crate sequences handshakes and
//! hands back an explicitly owned [`AgentSession`].
//!
//! Avatar startup failure degrades the session to voice-only; a failed model
//! handshake is fatal.

pub mod avatar;
pub mod error;
pub mod media;
pub mod prompt;
pub mod realtime;
pub mod room;
pub mod session;

pub use avatar::{AvatarClient, AvatarConversation, AVATAR_PARTICIPANT_NAME};
pub use error::SessionError;
pub use media::RoomAudioBridge;
pub use prompt::teaching_instruction;
pub use realtime::{
    RealtimeClient, RealtimeConversation, SessionEvent, INPUT_SAMPLE_RATE_HZ,
    OUTPUT_SAMPLE_RATE_HZ,
};
pub use room::RoomService;
pub use session::{AgentSession, AGENT_IDENTITY};
