//! Session bootstrap and run loop.
//!
//! [`AgentSession::bootstrap`] sequences the remote handshakes: model socket
//! first (fatal on failure), then the agent's room join token, then the avatar
//! conversation (degrades to voice-only on failure). The resulting handle is
//! owned by exactly one run loop per process.

use crate::avatar::{AvatarClient, AvatarConversation};
use crate::error::SessionError;
use crate::media::RoomAudioBridge;
use crate::prompt::teaching_instruction;
use crate::realtime::{RealtimeClient, RealtimeConversation, SessionEvent};
use crate::room::RoomService;
use parla_config::Settings;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Identity the agent joins rooms under.
pub const AGENT_IDENTITY: &str = "english-teacher-agent";

/// Display name for tokens minted for the agent itself.
const AGENT_DISPLAY_NAME: &str = "English Teacher";

/// Interval between room liveness checks while running.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct ActiveAvatar {
    client: AvatarClient,
    conversation: AvatarConversation,
}

/// One active conversational session: model stream, room access, and
/// (optionally) an avatar conversation bound to the room.
#[derive(Debug)]
pub struct AgentSession {
    conversation: RealtimeConversation,
    room: RoomService,
    avatar: Option<ActiveAvatar>,
    media: Option<RoomAudioBridge>,
    room_name: String,
    server_url: String,
    agent_token: String,
}

impl AgentSession {
    /// Constructs a ready-to-run session from validated settings.
    ///
    /// # Errors
    ///
    /// Any model or token failure is fatal and surfaces the underlying
    /// service error. Avatar failure is not: the session continues
    /// voice-only, which mirrors how the deployment behaves when the avatar
    /// service is out of credits.
    pub async fn bootstrap(settings: &Settings) -> Result<Self, SessionError> {
        let model = RealtimeClient::new(settings.gemini.clone(), teaching_instruction());
        let conversation = model.connect().await?;
        info!(model = %settings.gemini.model, "model conversation established");

        let room = RoomService::new(&settings.livekit);
        let agent_token =
            room.mint_join_token(&settings.room_name, AGENT_IDENTITY, AGENT_DISPLAY_NAME)?;
        debug!(room = %settings.room_name, "minted agent join token");

        let avatar_client = AvatarClient::new(&settings.tavus);
        let avatar = match avatar_client.start_conversation(&settings.room_name).await {
            Ok(conversation) => Some(ActiveAvatar {
                client: avatar_client,
                conversation,
            }),
            Err(e) if e.is_avatar_credit_exhaustion() => {
                error!("avatar service is out of conversational credits");
                info!("continuing in voice-only mode");
                None
            }
            Err(e) => {
                warn!(error = %e, "avatar start failed, continuing in voice-only mode");
                None
            }
        };

        if avatar.is_some() {
            info!("session active with avatar");
        } else {
            info!("session active (voice-only)");
        }

        Ok(Self {
            conversation,
            room,
            avatar,
            media: None,
            room_name: settings.room_name.clone(),
            server_url: settings.livekit.url.clone(),
            agent_token,
        })
    }

    /// Joins the room with the agent's token and wires room audio to the
    /// model: published model speech out, participant audio in.
    ///
    /// # Errors
    ///
    /// `RoomMedia` if the room cannot be joined; room modes treat this as
    /// fatal, since the agent would otherwise be inaudible.
    pub async fn connect_room_audio(&mut self) -> Result<(), SessionError> {
        let bridge = RoomAudioBridge::connect(&self.server_url, &self.agent_token).await?;
        info!(room = %self.room_name, identity = AGENT_IDENTITY, "room audio bridge connected");
        self.media = Some(bridge);
        Ok(())
    }

    pub fn is_voice_only(&self) -> bool {
        self.avatar.is_none()
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    /// The join token minted for the agent identity at bootstrap.
    pub fn agent_token(&self) -> &str {
        &self.agent_token
    }

    /// The avatar's conversation URL, when an avatar is attached.
    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar
            .as_ref()
            .and_then(|a| a.conversation.conversation_url.as_deref())
    }

    /// Creates the session's room if it does not exist yet (dev mode).
    pub async fn ensure_room(&self) -> Result<(), SessionError> {
        let room = self.room.ensure_room(&self.room_name).await?;
        debug!(room = %room.name, "room ready");
        Ok(())
    }

    /// Mints a join token for a human visitor (dev-mode playground).
    pub fn mint_visitor_token(
        &self,
        identity: &str,
        display_name: &str,
    ) -> Result<String, SessionError> {
        self.room
            .mint_join_token(&self.room_name, identity, display_name)
    }

    /// Drives the session until the model stream closes or the room empties
    /// of human participants after a conversation has started. Model audio is
    /// published to the room bridge; participant audio is fed to the model.
    /// Room liveness is checked every 30 seconds.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut saw_participants = false;

        loop {
            tokio::select! {
                event = self.conversation.next_event() => match event {
                    None | Some(SessionEvent::Closed) => {
                        info!("model stream closed, ending session");
                        break;
                    }
                    Some(SessionEvent::Audio(frame)) => match &self.media {
                        Some(media) => {
                            if let Err(e) = media.publish(&frame).await {
                                warn!(error = %e, "dropping model audio frame");
                            }
                        }
                        None => trace!(bytes = frame.len(), "model audio frame with no room media"),
                    },
                    Some(SessionEvent::Transcript(text)) => {
                        debug!(%text, "model transcript");
                    }
                    Some(SessionEvent::TurnComplete) => {
                        debug!("model turn complete");
                    }
                },
                chunk = next_room_chunk(&mut self.media) => match chunk {
                    Some(pcm) => self.conversation.send_audio_chunk(&pcm).await?,
                    None => {
                        warn!("room audio stream ended");
                        self.media = None;
                    }
                },
                _ = ticker.tick() => {
                    let count = self.room.human_participant_count(&self.room_name).await?;
                    if count > 0 {
                        saw_participants = true;
                        debug!(count, "session health check passed");
                    } else if saw_participants {
                        info!("room is empty, ending session");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Tears the session down: ends the avatar conversation, leaves the
    /// room, and closes the model stream.
    pub async fn shutdown(self) {
        if let Some(avatar) = self.avatar {
            if let Err(e) = avatar
                .client
                .end_conversation(&avatar.conversation.conversation_id)
                .await
            {
                warn!(error = %e, "failed to end avatar conversation");
            } else {
                info!("avatar conversation ended");
            }
        }
        if let Some(media) = self.media {
            media.close().await;
        }
        self.conversation.close().await;
        info!("session shut down");
    }
}

async fn next_room_chunk(media: &mut Option<RoomAudioBridge>) -> Option<Vec<u8>> {
    match media {
        Some(bridge) => bridge.next_chunk().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use futures_util::{SinkExt, StreamExt};
    use parla_config::{GeminiSettings, LiveKitSettings};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn run_moves_audio_between_the_room_and_the_model() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Model stub: one audio frame out, then wait for forwarded room
        // audio before hanging up.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _setup = ws.next().await.unwrap().unwrap();
            ws.send(Message::text(json!({"setupComplete": {}}).to_string()))
                .await
                .unwrap();

            let frame = json!({
                "serverContent": {
                    "modelTurn": {
                        "parts": [
                            { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": BASE64.encode([1u8, 2, 3, 4]) } }
                        ]
                    }
                }
            });
            ws.send(Message::text(frame.to_string())).await.unwrap();

            let forwarded = loop {
                let msg = ws.next().await.unwrap().unwrap();
                let value: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
                if value.get("realtimeInput").is_some() {
                    break value;
                }
            };
            ws.close(None).await.unwrap();
            forwarded
        });

        let gemini = GeminiSettings {
            api_key: "google-key".to_string(),
            model: "models/gemini-2.0-flash-exp".to_string(),
            voice: "Puck".to_string(),
            temperature: 0.8,
            live_url: format!("ws://{addr}/live"),
        };
        let conversation = RealtimeClient::new(gemini, "instruction")
            .connect()
            .await
            .unwrap();

        let (room_tx, mut room_rx) = mpsc::channel(8);
        let (mic_tx, mic_rx) = mpsc::channel(8);
        let bridge = RoomAudioBridge::from_channels(room_tx, mic_rx);

        let mut session = AgentSession {
            conversation,
            room: RoomService::new(&LiveKitSettings {
                url: "http://127.0.0.1:1".to_string(),
                api_key: "devkey".to_string(),
                api_secret: "secret".to_string(),
            }),
            avatar: None,
            media: Some(bridge),
            room_name: "english-teacher-demo".to_string(),
            server_url: "ws://127.0.0.1:1".to_string(),
            agent_token: "token".to_string(),
        };

        mic_tx.send(vec![9, 9]).await.unwrap();

        let run = tokio::spawn(async move {
            session.run().await.unwrap();
            session
        });

        // Model audio reaches the room side of the bridge.
        assert_eq!(room_rx.recv().await.unwrap(), vec![1, 2, 3, 4]);

        // Room audio reaches the model as a media chunk.
        let forwarded = server.await.unwrap();
        let media = &forwarded["realtimeInput"]["mediaChunks"][0];
        assert_eq!(media["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(BASE64.decode(media["data"].as_str().unwrap()).unwrap(), vec![9u8, 9]);

        let session = run.await.unwrap();
        session.shutdown().await;
    }
}
