//! Realtime conversation client for the Gemini Live API.
//!
//! Speaks the bidirectional WebSocket protocol: one `setup` message carrying
//! model, voice, temperature, and the system instruction, acknowledged by the
//! server with `setupComplete`; afterwards base64 PCM media chunks flow up and
//! `serverContent` frames flow down. Callback-style SDK events are re-expressed
//! here as an explicit [`SessionEvent`] stream so run loops stay testable.

use crate::error::SessionError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use parla_config::GeminiSettings;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Sample rate the model accepts for input audio (PCM s16le mono).
pub const INPUT_SAMPLE_RATE_HZ: u32 = 16_000;

/// Sample rate of audio frames produced by the model (PCM s16le mono).
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 24_000;

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the outbound frame channel.
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Events emitted by an active model conversation.
#[derive(Debug)]
pub enum SessionEvent {
    /// Raw PCM audio (s16le, [`OUTPUT_SAMPLE_RATE_HZ`]) from the model.
    Audio(Vec<u8>),
    /// Text produced alongside or instead of audio.
    Transcript(String),
    /// The model finished its turn.
    TurnComplete,
    /// The socket closed; no further events will arrive.
    Closed,
}

/// Factory for realtime model conversations.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    settings: GeminiSettings,
    instruction: String,
}

impl RealtimeClient {
    pub fn new(settings: GeminiSettings, instruction: impl Into<String>) -> Self {
        Self {
            settings,
            instruction: instruction.into(),
        }
    }

    fn endpoint(&self) -> String {
        let separator = if self.settings.live_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}key={}",
            self.settings.live_url, separator, self.settings.api_key
        )
    }

    fn setup_message(&self) -> Value {
        json!({
            "setup": {
                "model": self.settings.model,
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "temperature": self.settings.temperature,
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": self.settings.voice }
                        }
                    }
                },
                "systemInstruction": {
                    "parts": [ { "text": self.instruction } ]
                }
            }
        })
    }

    /// Connects to the model and completes the setup handshake.
    ///
    /// # Errors
    ///
    /// `ModelConnect` if the socket cannot be established, `ModelProtocol` if
    /// the server closes or responds unintelligibly before acknowledging the
    /// setup.
    pub async fn connect(&self) -> Result<RealtimeConversation, SessionError> {
        let (socket, _response) = connect_async(self.endpoint())
            .await
            .map_err(|e| SessionError::ModelConnect(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        sink.send(Message::text(self.setup_message().to_string()))
            .await?;

        // Wait for the setup acknowledgement before handing the stream over.
        loop {
            match stream.next().await {
                Some(Ok(msg)) => {
                    let Some(text) = message_text(&msg) else {
                        continue;
                    };
                    let value: Value = serde_json::from_str(&text).map_err(|e| {
                        SessionError::ModelProtocol(format!("unparseable setup response: {e}"))
                    })?;
                    if value.get("setupComplete").is_some() {
                        debug!(model = %self.settings.model, "model setup complete");
                        break;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(SessionError::ModelProtocol(
                        "connection closed during setup".to_string(),
                    ))
                }
            }
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_CAPACITY);

        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_out = outbound_rx.recv() => match maybe_out {
                        Some(msg) => {
                            let closing = matches!(msg, Message::Close(_));
                            if sink.send(msg).await.is_err() {
                                let _ = event_tx.send(SessionEvent::Closed).await;
                                break;
                            }
                            if closing {
                                let _ = event_tx.send(SessionEvent::Closed).await;
                                break;
                            }
                        }
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    maybe_in = stream.next() => match maybe_in {
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = event_tx.send(SessionEvent::Closed).await;
                            break;
                        }
                        Some(Ok(msg)) => {
                            if let Some(text) = message_text(&msg) {
                                match serde_json::from_str::<Value>(&text) {
                                    Ok(value) => dispatch_server_content(&value, &event_tx).await,
                                    Err(e) => debug!(error = %e, "skipping non-JSON model frame"),
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "model stream error");
                            let _ = event_tx.send(SessionEvent::Closed).await;
                            break;
                        }
                    },
                }
            }
        });

        Ok(RealtimeConversation {
            outbound: outbound_tx,
            events: event_rx,
            pump,
        })
    }
}

/// An active model conversation.
///
/// Owned exclusively by whichever run loop drives it; dropped (or closed) when
/// that loop exits.
#[derive(Debug)]
pub struct RealtimeConversation {
    outbound: mpsc::Sender<Message>,
    events: mpsc::Receiver<SessionEvent>,
    pump: tokio::task::JoinHandle<()>,
}

impl RealtimeConversation {
    /// Sends one chunk of input audio (PCM s16le, [`INPUT_SAMPLE_RATE_HZ`]).
    pub async fn send_audio_chunk(&self, pcm: &[u8]) -> Result<(), SessionError> {
        let payload = json!({
            "realtimeInput": {
                "mediaChunks": [
                    {
                        "mimeType": format!("audio/pcm;rate={INPUT_SAMPLE_RATE_HZ}"),
                        "data": BASE64.encode(pcm)
                    }
                ]
            }
        });
        self.send(payload).await
    }

    /// Sends a complete user text turn.
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        let payload = json!({
            "clientContent": {
                "turns": [ { "role": "user", "parts": [ { "text": text } ] } ],
                "turnComplete": true
            }
        });
        self.send(payload).await
    }

    async fn send(&self, payload: Value) -> Result<(), SessionError> {
        self.outbound
            .send(Message::text(payload.to_string()))
            .await
            .map_err(|_| SessionError::ModelProtocol("model stream task has ended".to_string()))
    }

    /// Receives the next event, or `None` once the stream has shut down.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Closes the conversation, sending a close frame if the socket is still up.
    pub async fn close(self) {
        let _ = self.outbound.send(Message::Close(None)).await;
        drop(self.outbound);
        let _ = self.pump.await;
    }
}

/// Extracts the JSON text from a frame; the server may use text or binary.
fn message_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text.as_str().to_string()),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

async fn dispatch_server_content(value: &Value, events: &mpsc::Sender<SessionEvent>) {
    let Some(content) = value.get("serverContent") else {
        return;
    };

    if let Some(parts) = content
        .get("modelTurn")
        .and_then(|turn| turn.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if let Some(data) = part
                .get("inlineData")
                .and_then(|inline| inline.get("data"))
                .and_then(Value::as_str)
            {
                match BASE64.decode(data) {
                    Ok(pcm) => {
                        let _ = events.send(SessionEvent::Audio(pcm)).await;
                    }
                    Err(e) => debug!(error = %e, "dropping undecodable audio part"),
                }
            } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                let _ = events
                    .send(SessionEvent::Transcript(text.to_string()))
                    .await;
            }
        }
    }

    if content
        .get("turnComplete")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        let _ = events.send(SessionEvent::TurnComplete).await;
    }
}
