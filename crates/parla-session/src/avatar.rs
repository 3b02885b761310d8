//! Avatar-rendering service client (Tavus conversations API).
//!
//! The avatar joins the conversation's room server-side once a conversation
//! is created against the configured replica/persona; this client only
//! creates and ends conversations, passing service errors through verbatim.

use crate::error::SessionError;
use parla_config::TavusSettings;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Participant name the avatar appears under in the room.
pub const AVATAR_PARTICIPANT_NAME: &str = "English-Teacher-Avatar";

#[derive(Debug, Serialize)]
struct CreateConversationRequest<'a> {
    replica_id: &'a str,
    persona_id: &'a str,
    conversation_name: &'a str,
    properties: ConversationProperties<'a>,
}

#[derive(Debug, Serialize)]
struct ConversationProperties<'a> {
    participant_name: &'a str,
}

/// A live avatar conversation bound to a room.
#[derive(Debug, Clone, Deserialize)]
pub struct AvatarConversation {
    pub conversation_id: String,
    #[serde(default)]
    pub conversation_url: Option<String>,
}

/// Client for the hosted avatar-rendering service.
#[derive(Debug, Clone)]
pub struct AvatarClient {
    http: reqwest::Client,
    settings: TavusSettings,
}

impl AvatarClient {
    pub fn new(settings: &TavusSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings: settings.clone(),
        }
    }

    /// Starts an avatar conversation attached to the named room.
    ///
    /// # Errors
    ///
    /// `AvatarTransport` if the service is unreachable, `Avatar` with the
    /// service's status and body for any non-success response (402 signals
    /// exhausted conversational credits).
    pub async fn start_conversation(
        &self,
        room_name: &str,
    ) -> Result<AvatarConversation, SessionError> {
        let body = CreateConversationRequest {
            replica_id: &self.settings.replica_id,
            persona_id: &self.settings.persona_id,
            conversation_name: room_name,
            properties: ConversationProperties {
                participant_name: AVATAR_PARTICIPANT_NAME,
            },
        };

        let response = self
            .http
            .post(format!("{}/v2/conversations", self.settings.api_url))
            .header("x-api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Avatar {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let conversation: AvatarConversation = response.json().await?;
        info!(
            conversation_id = %conversation.conversation_id,
            room = room_name,
            "avatar conversation created"
        );
        Ok(conversation)
    }

    /// Ends an avatar conversation so conversational credits stop accruing.
    pub async fn end_conversation(&self, conversation_id: &str) -> Result<(), SessionError> {
        let response = self
            .http
            .post(format!(
                "{}/v2/conversations/{conversation_id}/end",
                self.settings.api_url
            ))
            .header("x-api-key", &self.settings.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Avatar {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
