//! # Voice-Note Transcoder
//!
//! Turns arbitrary recorded or uploaded audio into a messaging-compatible
//! voice note: Opus in an Ogg container, mono, 48 kHz, variable bitrate,
//! tuned for speech.
//!
//! ## Conversion Steps:
//! 1. Resolve the input container (magic bytes first, declared type second)
//! 2. Lease the shared codec engine (loading it on first use)
//! 3. Write `input.<ext>`, run the directive, read `output.ogg`
//! 4. Delete both engine files; failures here are only logged
//! 5. Verify the output is a single mono 48 kHz Opus stream

use crate::audio::blob::{AudioBlob, MEDIA_TYPE_OGG};
use crate::audio::container::ContainerKind;
use crate::audio::engine::{CodecEngine, EngineHandle, EngineState};
use crate::audio::error::{PipelineError, PipelineResult};
use crate::audio::ogg;
use std::sync::Arc;
use tracing::{debug, warn};

const OUTPUT_NAME: &str = "output.ogg";

/// Encoding parameters for voice notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceNoteProfile {
    pub channels: u32,
    pub sample_rate: u32,
    pub codec: String,
    pub bitrate: String,
    pub vbr: bool,
    /// Opus application profile (`voip` favors intelligibility and latency)
    pub application: String,
}

impl Default for VoiceNoteProfile {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 48000,
            codec: "libopus".to_string(),
            bitrate: "24k".to_string(),
            vbr: true,
            application: "voip".to_string(),
        }
    }
}

impl VoiceNoteProfile {
    /// Render the transcode directive for the engine.
    pub fn args(&self, input: &str, output: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-c:a".to_string(),
            self.codec.clone(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            "-vbr".to_string(),
            if self.vbr { "on" } else { "off" }.to_string(),
            "-application".to_string(),
            self.application.clone(),
            output.to_string(),
        ]
    }
}

/// Transcodes audio blobs into Ogg/Opus voice notes using a shared engine.
pub struct VoiceNoteTranscoder {
    engine: Arc<EngineHandle>,
    profile: VoiceNoteProfile,
}

impl VoiceNoteTranscoder {
    pub fn new(engine: Arc<EngineHandle>) -> Self {
        Self::with_profile(engine, VoiceNoteProfile::default())
    }

    pub fn with_profile(engine: Arc<EngineHandle>, profile: VoiceNoteProfile) -> Self {
        Self { engine, profile }
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn profile(&self) -> &VoiceNoteProfile {
        &self.profile
    }

    /// Load the engine ahead of the first conversion.
    pub async fn preload(&self) -> PipelineResult<()> {
        self.engine.acquire().await.map(drop)
    }

    pub async fn encode_to_voice_note(&self, input: &AudioBlob) -> PipelineResult<AudioBlob> {
        let container = ContainerKind::resolve(input);
        let input_name = format!("input.{}", container.extension());
        debug!(container = %container, input_name = %input_name, "Resolved input container");

        let mut lease = self.engine.acquire().await?;
        let bytes = input.bytes().to_vec();
        let profile = self.profile.clone();

        let output = tokio::task::spawn_blocking(move || {
            run_directive(&mut **lease, &input_name, &bytes, &profile)
        })
        .await
        .map_err(|e| PipelineError::TranscodeError(format!("Transcode task failed: {}", e)))??;

        let stream = ogg::verify_voice_note(&output, &self.profile)?;
        debug!(
            channels = stream.channels,
            sample_rate = stream.input_sample_rate,
            output_bytes = output.len(),
            "Voice note verified"
        );

        Ok(AudioBlob::new(output, MEDIA_TYPE_OGG))
    }
}

/// One write/exec/read/cleanup sequence on a leased engine.
fn run_directive(
    engine: &mut dyn CodecEngine,
    input_name: &str,
    bytes: &[u8],
    profile: &VoiceNoteProfile,
) -> PipelineResult<Vec<u8>> {
    let result = engine
        .write_file(input_name, bytes)
        .and_then(|_| engine.exec(&profile.args(input_name, OUTPUT_NAME)))
        .and_then(|_| engine.read_file(OUTPUT_NAME));

    for name in [input_name, OUTPUT_NAME] {
        if let Err(e) = engine.delete_file(name) {
            warn!(file = %name, error = %e, "Engine cleanup failed");
        }
    }

    result
}
