//! Room audio bridge: publishes model speech into the room and feeds
//! participant audio back to the model.
//!
//! The agent joins the room with its minted token, publishes one mono audio
//! track at the model's output rate, and subscribes to participant tracks
//! resampled to the model's input rate. The avatar republishes the agent's
//! own speech, so its track is never fed back to the model.

use crate::avatar::AVATAR_PARTICIPANT_NAME;
use crate::error::SessionError;
use crate::realtime::{INPUT_SAMPLE_RATE_HZ, OUTPUT_SAMPLE_RATE_HZ};
use futures_util::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::prelude::*;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit::webrtc::prelude::{AudioFrame, AudioSourceOptions, RtcAudioSource};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Samples per published frame (10 ms at the output rate).
const PUBLISH_FRAME_SAMPLES: usize = OUTPUT_SAMPLE_RATE_HZ as usize / 100;

/// Depth of the native source's internal queue.
const SOURCE_QUEUE_MS: u32 = 1000;

/// Name of the agent's published audio track.
const AGENT_TRACK_NAME: &str = "agent-voice";

/// Capacity of the bridge channels in each direction.
const CHANNEL_CAPACITY: usize = 64;

/// Audio link between an active room and the model conversation.
///
/// Owned by the session that joined the room; closed (or dropped) with it.
pub struct RoomAudioBridge {
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: mpsc::Receiver<Vec<u8>>,
    room: Option<Room>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl fmt::Debug for RoomAudioBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomAudioBridge")
            .field("connected", &self.room.is_some())
            .finish()
    }
}

impl RoomAudioBridge {
    /// Joins the room with a minted token and wires both audio directions.
    ///
    /// # Errors
    ///
    /// `RoomMedia` if the room cannot be joined or the agent's audio track
    /// cannot be published.
    pub async fn connect(url: &str, token: &str) -> Result<Self, SessionError> {
        let options = RoomOptions {
            auto_subscribe: true,
            ..Default::default()
        };
        let (room, room_events) = Room::connect(url, token, options)
            .await
            .map_err(|e| SessionError::RoomMedia(format!("failed to join room: {e}")))?;
        info!(room = %room.name(), "joined room");

        let source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            OUTPUT_SAMPLE_RATE_HZ,
            1,
            SOURCE_QUEUE_MS,
        );
        let track = LocalAudioTrack::create_audio_track(
            AGENT_TRACK_NAME,
            RtcAudioSource::Native(source.clone()),
        );
        room.local_participant()
            .publish_track(LocalTrack::Audio(track), TrackPublishOptions::default())
            .await
            .map_err(|e| SessionError::RoomMedia(format!("failed to publish track: {e}")))?;
        debug!("published agent audio track");

        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let publisher = tokio::spawn(publish_model_audio(source, outbound_rx));
        let subscriber = tokio::spawn(forward_participant_audio(room_events, inbound_tx));

        Ok(Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
            room: Some(room),
            tasks: vec![publisher, subscriber],
        })
    }

    /// Queues model audio (PCM s16le, [`OUTPUT_SAMPLE_RATE_HZ`]) for the
    /// agent's room track.
    pub async fn publish(&self, pcm: &[u8]) -> Result<(), SessionError> {
        self.outbound
            .send(pcm.to_vec())
            .await
            .map_err(|_| SessionError::RoomMedia("room publisher has stopped".to_string()))
    }

    /// Receives the next participant audio chunk (PCM s16le,
    /// [`INPUT_SAMPLE_RATE_HZ`]), or `None` once the room stream has ended.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Leaves the room and stops both pump tasks.
    pub async fn close(self) {
        if let Some(room) = self.room {
            if let Err(e) = room.close().await {
                warn!(error = %e, "error leaving room");
            }
        }
        for task in self.tasks {
            task.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn from_channels(
        outbound: mpsc::Sender<Vec<u8>>,
        inbound: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            room: None,
            tasks: Vec::new(),
        }
    }
}

/// Feeds queued model PCM into the native source in 10 ms frames.
async fn publish_model_audio(source: NativeAudioSource, mut pcm_rx: mpsc::Receiver<Vec<u8>>) {
    let mut pending: Vec<i16> = Vec::new();
    while let Some(pcm) = pcm_rx.recv().await {
        pending.extend(pcm_to_samples(&pcm));
        for samples in drain_full_frames(&mut pending) {
            let frame = AudioFrame {
                data: samples.into(),
                sample_rate: OUTPUT_SAMPLE_RATE_HZ,
                num_channels: 1,
                samples_per_channel: PUBLISH_FRAME_SAMPLES as u32,
            };
            if let Err(e) = source.capture_frame(&frame).await {
                warn!(error = %e, "failed to capture model audio frame");
                return;
            }
        }
    }
}

/// Subscribes to participant audio tracks and forwards their frames.
async fn forward_participant_audio(
    mut room_events: mpsc::UnboundedReceiver<RoomEvent>,
    pcm_tx: mpsc::Sender<Vec<u8>>,
) {
    while let Some(event) = room_events.recv().await {
        if let RoomEvent::TrackSubscribed {
            track: RemoteTrack::Audio(track),
            participant,
            ..
        } = event
        {
            if participant.name() == AVATAR_PARTICIPANT_NAME {
                debug!("ignoring avatar audio track");
                continue;
            }
            info!(participant = %participant.identity().0, "subscribed to participant audio");

            let mut frames =
                NativeAudioStream::new(track.rtc_track(), INPUT_SAMPLE_RATE_HZ as i32, 1);
            let tx = pcm_tx.clone();
            tokio::spawn(async move {
                while let Some(frame) = frames.next().await {
                    if tx.send(samples_to_pcm(&frame.data)).await.is_err() {
                        break;
                    }
                }
            });
        }
    }
}

fn drain_full_frames(pending: &mut Vec<i16>) -> Vec<Vec<i16>> {
    let mut frames = Vec::new();
    while pending.len() >= PUBLISH_FRAME_SAMPLES {
        frames.push(pending.drain(..PUBLISH_FRAME_SAMPLES).collect());
    }
    frames
}

fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn samples_to_pcm(samples: &[i16]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    pcm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_byte_order_round_trips() {
        let samples = vec![-1i16, 0, 257];
        assert_eq!(pcm_to_samples(&samples_to_pcm(&samples)), samples);
    }

    #[test]
    fn trailing_odd_byte_is_dropped() {
        assert_eq!(pcm_to_samples(&[1, 0, 7]), vec![1]);
    }

    #[test]
    fn published_frames_are_ten_milliseconds() {
        let mut pending = vec![0i16; PUBLISH_FRAME_SAMPLES * 2 + PUBLISH_FRAME_SAMPLES / 2];
        let frames = drain_full_frames(&mut pending);

        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == PUBLISH_FRAME_SAMPLES));
        // The remainder waits for the next chunk.
        assert_eq!(pending.len(), PUBLISH_FRAME_SAMPLES / 2);
    }
}
