//! LiveKit room service access: join tokens, room creation, liveness checks.

use crate::avatar::AVATAR_PARTICIPANT_NAME;
use crate::error::SessionError;
use crate::session::AGENT_IDENTITY;
use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::{CreateRoomOptions, RoomClient};
use livekit_protocol::{ParticipantInfo, Room};
use parla_config::LiveKitSettings;
use std::time::Duration;

/// TTL for minted join tokens.
const JOIN_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Server-side client for the realtime media platform.
#[derive(Debug)]
pub struct RoomService {
    settings: LiveKitSettings,
    client: RoomClient,
}

impl RoomService {
    pub fn new(settings: &LiveKitSettings) -> Self {
        let client =
            RoomClient::with_api_key(&settings.url, &settings.api_key, &settings.api_secret);
        Self {
            settings: settings.clone(),
            client,
        }
    }

    /// Creates the room if it does not already exist.
    pub async fn ensure_room(&self, name: &str) -> Result<Room, SessionError> {
        self.client
            .create_room(name, CreateRoomOptions::default())
            .await
            .map_err(|e| SessionError::RoomService(e.to_string()))
    }

    /// Mints a join token with publish/subscribe/data grants for the room.
    pub fn mint_join_token(
        &self,
        room_name: &str,
        identity: &str,
        display_name: &str,
    ) -> Result<String, SessionError> {
        let token = AccessToken::with_api_key(&self.settings.api_key, &self.settings.api_secret)
            .with_identity(identity)
            .with_name(display_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(JOIN_TOKEN_TTL);

        token.to_jwt().map_err(SessionError::Token)
    }

    /// Returns the number of human participants currently in a room; the
    /// agent itself and its avatar do not count. Returns 0 if the room does
    /// not exist or cannot be reached.
    pub async fn human_participant_count(&self, room_name: &str) -> Result<u32, SessionError> {
        match self.client.list_participants(room_name).await {
            Ok(participants) => Ok(participants.iter().filter(|p| is_human(p)).count() as u32),
            Err(_) => Ok(0),
        }
    }
}

fn is_human(participant: &ParticipantInfo) -> bool {
    participant.identity != AGENT_IDENTITY && participant.name != AVATAR_PARTICIPANT_NAME
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(identity: &str, name: &str) -> ParticipantInfo {
        ParticipantInfo {
            identity: identity.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn agent_and_avatar_do_not_count_as_humans() {
        let agent = participant(AGENT_IDENTITY, "English Teacher");
        let avatar = participant("tavus-replica-1", AVATAR_PARTICIPANT_NAME);
        let visitor = participant("visitor-1", "Browser Visitor");

        assert!(!is_human(&agent));
        assert!(!is_human(&avatar));
        assert!(is_human(&visitor));

        let roster = [agent, avatar, visitor];
        assert_eq!(roster.iter().filter(|p| is_human(p)).count(), 1);
    }
}
