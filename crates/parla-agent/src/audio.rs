//! Local microphone/speaker bridge for console mode.
//!
//! cpal streams are not `Send`, so both streams live on a dedicated thread
//! for the bridge's lifetime. Captured frames cross into async code through an
//! unbounded channel; playback samples go the other way through a shared
//! ring buffer drained by the output callback.
//!
//! Devices rarely run at the model's rates natively, so each direction
//! negotiates a supported configuration and converts: channel downmix, linear
//! resampling, and i16/f32 sample conversion.

use crate::AgentError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parla_session::{INPUT_SAMPLE_RATE_HZ, OUTPUT_SAMPLE_RATE_HZ};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Upper bound on buffered playback, in seconds at the device rate. Older
/// samples are dropped first if the model gets this far ahead of the speaker.
const MAX_PLAYBACK_SECS: usize = 30;

/// Live microphone/speaker bridge.
pub struct AudioBridge {
    mic_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    playback: Arc<Mutex<VecDeque<i16>>>,
    playback_resampler: Resampler,
    playback_cap: usize,
    stop_tx: std::sync::mpsc::Sender<()>,
}

impl AudioBridge {
    /// Opens the default input and output devices at a negotiated
    /// configuration and starts both streams. Capture is converted to the
    /// model's input rate (mono s16le); playback is converted from the
    /// model's output rate to whatever the device runs at.
    ///
    /// # Errors
    ///
    /// `AgentError::Audio` when no device is available, no configuration can
    /// be negotiated, or a stream cannot be built.
    pub fn start() -> Result<Self, AgentError> {
        let (mic_tx, mic_rx) = mpsc::unbounded_channel();
        let playback = Arc::new(Mutex::new(VecDeque::new()));
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<u32, String>>();

        let buffer = playback.clone();
        std::thread::spawn(move || {
            match build_streams(&mic_tx, &buffer) {
                Ok((input, output, output_rate)) => {
                    if ready_tx.send(Ok(output_rate)).is_err() {
                        return;
                    }
                    // Streams stay alive while this thread blocks.
                    let _ = stop_rx.recv();
                    drop(input);
                    drop(output);
                    debug!("audio bridge stopped");
                }
                Err(message) => {
                    let _ = ready_tx.send(Err(message));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(output_rate)) => Ok(Self {
                mic_rx,
                playback,
                playback_resampler: Resampler::new(OUTPUT_SAMPLE_RATE_HZ, output_rate),
                playback_cap: output_rate as usize * MAX_PLAYBACK_SECS,
                stop_tx,
            }),
            Ok(Err(message)) => Err(AgentError::Audio(message)),
            Err(_) => Err(AgentError::Audio("audio thread exited early".to_string())),
        }
    }

    /// Receives the next captured microphone chunk (PCM s16le, mono at the
    /// model's input rate).
    pub async fn next_mic_chunk(&mut self) -> Option<Vec<u8>> {
        self.mic_rx.recv().await
    }

    /// Queues model audio (PCM s16le, mono at the model's output rate) for
    /// playback, resampling it to the device rate.
    pub fn queue_playback(&mut self, pcm: &[u8]) {
        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let converted = self.playback_resampler.convert(&samples);

        let mut buffer = lock(&self.playback);
        buffer.extend(converted);
        while buffer.len() > self.playback_cap {
            buffer.pop_front();
        }
    }

    /// Stops both streams and releases the devices.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mic capture state shared by the per-format input callbacks.
struct CapturePipeline {
    channels: usize,
    resampler: Resampler,
    mic_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl CapturePipeline {
    fn new(device_hz: u32, channels: usize, mic_tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            channels,
            resampler: Resampler::new(device_hz, INPUT_SAMPLE_RATE_HZ),
            mic_tx,
        }
    }

    fn push(&mut self, samples: &[i16]) {
        let mono = downmix(samples, self.channels);
        let converted = self.resampler.convert(&mono);
        if converted.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(converted.len() * 2);
        for sample in &converted {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let _ = self.mic_tx.send(bytes);
    }
}

fn build_streams(
    mic_tx: &mpsc::UnboundedSender<Vec<u8>>,
    playback: &Arc<Mutex<VecDeque<i16>>>,
) -> Result<(cpal::Stream, cpal::Stream, u32), String> {
    let host = cpal::default_host();

    let input_device = host
        .default_input_device()
        .ok_or_else(|| "no default input device".to_string())?;
    let output_device = host
        .default_output_device()
        .ok_or_else(|| "no default output device".to_string())?;

    let input_ranges: Vec<_> = input_device
        .supported_input_configs()
        .map_err(|e| format!("failed to enumerate input configs: {e}"))?
        .collect();
    let (input_config, input_format) = negotiate(&input_ranges, INPUT_SAMPLE_RATE_HZ)?;
    debug!(
        rate = input_config.sample_rate.0,
        channels = input_config.channels,
        format = ?input_format,
        "negotiated input config"
    );

    let in_channels = input_config.channels as usize;
    let capture = CapturePipeline::new(input_config.sample_rate.0, in_channels, mic_tx.clone());
    let err_fn = |e| warn!(error = %e, "input stream error");

    let input = match input_format {
        cpal::SampleFormat::I16 => {
            let mut capture = capture;
            input_device.build_input_stream(
                &input_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| capture.push(data),
                err_fn,
                None,
            )
        }
        cpal::SampleFormat::F32 => {
            let mut capture = capture;
            input_device.build_input_stream(
                &input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i16> = data.iter().map(|s| f32_to_i16(*s)).collect();
                    capture.push(&samples);
                },
                err_fn,
                None,
            )
        }
        other => return Err(format!("unsupported input sample format {other:?}")),
    }
    .map_err(|e| format!("failed to open microphone: {e}"))?;

    let output_ranges: Vec<_> = output_device
        .supported_output_configs()
        .map_err(|e| format!("failed to enumerate output configs: {e}"))?
        .collect();
    let (output_config, output_format) = negotiate(&output_ranges, OUTPUT_SAMPLE_RATE_HZ)?;
    debug!(
        rate = output_config.sample_rate.0,
        channels = output_config.channels,
        format = ?output_format,
        "negotiated output config"
    );

    let out_channels = output_config.channels as usize;
    let output_rate = output_config.sample_rate.0;
    let buffer = playback.clone();
    let err_fn = |e| warn!(error = %e, "output stream error");

    let output = match output_format {
        cpal::SampleFormat::I16 => output_device.build_output_stream(
            &output_config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut queued = lock(&buffer);
                for frame in data.chunks_mut(out_channels) {
                    frame.fill(queued.pop_front().unwrap_or(0));
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => output_device.build_output_stream(
            &output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queued = lock(&buffer);
                for frame in data.chunks_mut(out_channels) {
                    let sample = queued.pop_front().unwrap_or(0);
                    frame.fill(f32::from(sample) / f32::from(i16::MAX));
                }
            },
            err_fn,
            None,
        ),
        other => return Err(format!("unsupported output sample format {other:?}")),
    }
    .map_err(|e| format!("failed to open speakers: {e}"))?;

    input
        .play()
        .map_err(|e| format!("failed to start microphone: {e}"))?;
    output
        .play()
        .map_err(|e| format!("failed to start speakers: {e}"))?;

    debug!("audio bridge started");
    Ok((input, output, output_rate))
}

/// Picks a stream configuration: a range covering the target rate if the
/// device has one, otherwise the highest-rate configuration it offers.
fn negotiate(
    ranges: &[cpal::SupportedStreamConfigRange],
    target_hz: u32,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat), String> {
    for range in ranges {
        if (range.min_sample_rate().0..=range.max_sample_rate().0).contains(&target_hz) {
            let supported = range.clone().with_sample_rate(cpal::SampleRate(target_hz));
            return Ok((supported.config(), supported.sample_format()));
        }
    }

    ranges
        .iter()
        .map(|range| range.clone().with_max_sample_rate())
        .max_by_key(|supported| supported.sample_rate().0)
        .map(|supported| (supported.config(), supported.sample_format()))
        .ok_or_else(|| "no supported stream configuration".to_string())
}

/// Stateful linear resampler over mono s16le samples.
struct Resampler {
    from_hz: u32,
    to_hz: u32,
    step: f64,
    cursor: f64,
    buffer: Vec<i16>,
}

impl Resampler {
    fn new(from_hz: u32, to_hz: u32) -> Self {
        let step = if to_hz == 0 {
            1.0
        } else {
            f64::from(from_hz) / f64::from(to_hz)
        };
        Self {
            from_hz,
            to_hz,
            step,
            cursor: 0.0,
            buffer: Vec::new(),
        }
    }

    fn convert(&mut self, input: &[i16]) -> Vec<i16> {
        if self.from_hz == self.to_hz || self.from_hz == 0 || self.to_hz == 0 {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        self.buffer.extend_from_slice(input);
        if self.buffer.len() < 2 {
            return Vec::new();
        }

        let mut output = Vec::new();
        let mut cursor = self.cursor;
        while cursor + 1.0 < self.buffer.len() as f64 {
            let base = cursor.floor() as usize;
            let frac = cursor - base as f64;
            let current = f64::from(self.buffer[base]);
            let next = f64::from(self.buffer[base + 1]);
            output.push((current + (next - current) * frac).round() as i16);
            cursor += self.step;
        }

        let consumed = (cursor.floor() as usize).saturating_sub(1);
        if consumed > 0 && consumed <= self.buffer.len() {
            self.buffer.drain(..consumed);
            cursor -= consumed as f64;
        }
        self.cursor = cursor;
        output
    }
}

fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| (frame.iter().map(|s| i32::from(*s)).sum::<i32>() / frame.len() as i32) as i16)
        .collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

fn lock(buffer: &Arc<Mutex<VecDeque<i16>>>) -> std::sync::MutexGuard<'_, VecDeque<i16>> {
    match buffer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfigRange};

    #[test]
    fn resample_identity_passes_samples_through() {
        let mut resampler = Resampler::new(16_000, 16_000);
        let samples = vec![1i16, 2, 3, 4];
        assert_eq!(resampler.convert(&samples), samples);
    }

    #[test]
    fn resample_downsamples_48k_to_16k() {
        let mut resampler = Resampler::new(48_000, 16_000);
        let samples = vec![100i16; 300];
        let result = resampler.convert(&samples);
        // Roughly a third of the input, give or take edge buffering.
        assert!((95..=105).contains(&result.len()), "got {}", result.len());
        assert!(result.iter().all(|&s| s == 100));
    }

    #[test]
    fn resample_upsamples_24k_to_48k() {
        let mut resampler = Resampler::new(24_000, 48_000);
        let result = resampler.convert(&vec![0i16; 100]);
        assert!((190..=200).contains(&result.len()), "got {}", result.len());
    }

    #[test]
    fn resample_carries_state_across_blocks() {
        let mut chunked = Resampler::new(48_000, 16_000);
        let mut total = 0;
        for _ in 0..10 {
            total += chunked.convert(&[50i16; 48]).len();
        }
        // 480 input samples at a 3:1 ratio.
        assert!((155..=161).contains(&total), "got {total}");
    }

    #[test]
    fn downmix_averages_interleaved_channels() {
        assert_eq!(downmix(&[10, 20, 30, 50], 2), vec![15, 40]);
        assert_eq!(downmix(&[7, 8, 9], 1), vec![7, 8, 9]);
    }

    #[test]
    fn float_samples_are_clamped() {
        assert_eq!(f32_to_i16(1.5), i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
        assert!(f32_to_i16(-1.5) <= -i16::MAX);
    }

    #[test]
    fn negotiate_prefers_the_target_rate() {
        let ranges = [SupportedStreamConfigRange::new(
            1,
            SampleRate(8_000),
            SampleRate(48_000),
            SupportedBufferSize::Unknown,
            SampleFormat::I16,
        )];
        let (config, format) = negotiate(&ranges, INPUT_SAMPLE_RATE_HZ).unwrap();
        assert_eq!(config.sample_rate.0, INPUT_SAMPLE_RATE_HZ);
        assert_eq!(format, SampleFormat::I16);
    }

    #[test]
    fn negotiate_falls_back_to_the_best_device_rate() {
        let ranges = [SupportedStreamConfigRange::new(
            2,
            SampleRate(44_100),
            SampleRate(48_000),
            SupportedBufferSize::Unknown,
            SampleFormat::F32,
        )];
        let (config, format) = negotiate(&ranges, INPUT_SAMPLE_RATE_HZ).unwrap();
        assert_eq!(config.sample_rate.0, 48_000);
        assert_eq!(config.channels, 2);
        assert_eq!(format, SampleFormat::F32);
    }

    #[test]
    fn negotiate_fails_with_no_configs() {
        assert!(negotiate(&[], INPUT_SAMPLE_RATE_HZ).is_err());
    }
}
