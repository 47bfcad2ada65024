//! # Audio Decoding
//!
//! The decode capability the WAV encoder depends on: arbitrary compressed or
//! raw audio bytes in, per-channel float PCM out at the native sample rate.
//! Nothing here resamples or downmixes.
//!
//! ## Key Components:
//! - **DecodedAudio**: Planar float samples plus sample rate
//! - **AudioDecoder / DecodeSession**: Injectable decode capability. A session
//!   is the decode context; dropping it releases whatever it holds.
//! - **SymphoniaDecoder**: Default implementation backed by symphonia, with
//!   Opus registered through the libopus adapter so WebM and Ogg voice
//!   recordings decode

use crate::audio::error::{PipelineError, PipelineResult};
use std::io::Cursor;
use std::sync::OnceLock;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecRegistry, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, Probe};
use symphonia_adapter_libopus::OpusDecoder;
use tracing::{debug, trace, warn};

/// Decoded PCM audio, one vector of normalized samples per channel.
///
/// ## Invariants (checked by [`DecodedAudio::new`]):
/// - At least one channel
/// - Every channel has the same number of frames
/// - Sample rate is non-zero
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> PipelineResult<Self> {
        if sample_rate == 0 {
            return Err(PipelineError::DecodeError("Sample rate must be greater than 0".to_string()));
        }
        let first_len = match channels.first() {
            Some(first) => first.len(),
            None => return Err(PipelineError::DecodeError("Decoded audio has no channels".to_string())),
        };
        if channels.iter().any(|c| c.len() != first_len) {
            return Err(PipelineError::DecodeError(
                "Decoded channels have different lengths".to_string(),
            ));
        }

        Ok(Self { sample_rate, channels })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }
}

/// A source of decode contexts.
///
/// Implementations must be shareable across threads; the WAV encoder holds
/// one behind an `Arc` and opens a fresh session per conversion.
pub trait AudioDecoder: Send + Sync {
    /// Acquire a decode context.
    ///
    /// Fails with `UnsupportedFormat` when no decoding capability is available.
    fn open(&self) -> PipelineResult<Box<dyn DecodeSession>>;
}

/// A single decode context. Released when dropped.
pub trait DecodeSession: Send {
    /// Decode a complete payload. `hint` is a file extension (`"mp3"`, `"wav"`, ...).
    fn decode(&mut self, bytes: &[u8], hint: Option<&str>) -> PipelineResult<DecodedAudio>;
}

/// Symphonia's enabled codecs plus the libopus-backed Opus decoder.
fn codec_registry() -> &'static CodecRegistry {
    static CODEC_REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    CODEC_REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<OpusDecoder>();
        symphonia::default::register_enabled_codecs(&mut registry);
        registry
    })
}

/// Decoder backed by symphonia's default format detection and an Opus-capable codec registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn open(&self) -> PipelineResult<Box<dyn DecodeSession>> {
        trace!("Opening symphonia decode context");
        Ok(Box::new(SymphoniaSession {
            probe: symphonia::default::get_probe(),
            codecs: codec_registry(),
        }))
    }
}

struct SymphoniaSession {
    probe: &'static Probe,
    codecs: &'static CodecRegistry,
}

impl DecodeSession for SymphoniaSession {
    fn decode(&mut self, bytes: &[u8], hint: Option<&str>) -> PipelineResult<DecodedAudio> {
        let source = Cursor::new(bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut probe_hint = Hint::new();
        if let Some(extension) = hint {
            probe_hint.with_extension(extension);
        }

        let probed = self
            .probe
            .format(&probe_hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| PipelineError::DecodeError(format!("Failed to probe input: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PipelineError::DecodeError("No audio track found in input".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = self
            .codecs
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| match e {
                SymphoniaError::Unsupported(what) => PipelineError::UnsupportedFormat(what.to_string()),
                other => PipelineError::DecodeError(format!("Failed to create decoder: {}", other)),
            })?;

        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channels: Vec<Vec<f32>> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(PipelineError::DecodeError(format!("Error reading packet: {}", e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!(error = %msg, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(PipelineError::DecodeError(e.to_string())),
            };

            let spec = *decoded.spec();
            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            let channel_count = spec.channels.count();

            if channels.is_empty() {
                channels = vec![Vec::new(); channel_count];
                sample_rate = spec.rate;
            } else if channels.len() != channel_count {
                return Err(PipelineError::DecodeError(format!(
                    "Channel count changed mid-stream: {} -> {}",
                    channels.len(),
                    channel_count
                )));
            }

            let mut planar = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            planar.copy_planar_ref(decoded);
            let samples = planar.samples();

            for (index, channel) in channels.iter_mut().enumerate() {
                channel.extend_from_slice(&samples[index * frames..(index + 1) * frames]);
            }
        }

        if channels.iter().all(Vec::is_empty) {
            return Err(PipelineError::DecodeError("Input contains no audio frames".to_string()));
        }

        debug!(
            sample_rate = sample_rate,
            channels = channels.len(),
            frames = channels[0].len(),
            "Decoded input audio"
        );

        DecodedAudio::new(sample_rate, channels)
    }
}

impl Drop for SymphoniaSession {
    fn drop(&mut self) {
        trace!("Symphonia decode context released");
    }
}
