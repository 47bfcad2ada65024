//! # Audio Normalization Pipeline
//!
//! Bundles the two independent converters behind one object that the HTTP
//! layer (or any other caller) owns. Each conversion runs inside its own
//! tracing span tagged with a fresh conversion id.

use crate::audio::blob::AudioBlob;
use crate::audio::decode::{AudioDecoder, SymphoniaDecoder};
use crate::audio::engine::{EngineHandle, EngineLoader, EngineState};
use crate::audio::error::PipelineResult;
use crate::audio::ffmpeg::FfmpegLoader;
use crate::audio::voice_note::VoiceNoteTranscoder;
use crate::audio::wav::WavEncoder;
use crate::config::TranscoderConfig;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Which converter handled a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    Wav,
    VoiceNote,
}

impl ConversionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionKind::Wav => "wav",
            ConversionKind::VoiceNote => "voice_note",
        }
    }
}

pub struct AudioPipeline {
    wav: WavEncoder,
    voice_note: VoiceNoteTranscoder,
}

impl AudioPipeline {
    /// Build the pipeline with the symphonia decoder and the ffmpeg engine.
    pub fn from_config(config: &TranscoderConfig) -> Self {
        let loader = FfmpegLoader::new(
            config.ffmpeg_path.clone(),
            config.work_dir.as_ref().map(PathBuf::from),
        );
        Self::with_parts(Arc::new(SymphoniaDecoder::new()), Arc::new(loader))
    }

    /// Build the pipeline from injected collaborators.
    pub fn with_parts(decoder: Arc<dyn AudioDecoder>, loader: Arc<dyn EngineLoader>) -> Self {
        let engine = Arc::new(EngineHandle::new(loader));
        Self {
            wav: WavEncoder::new(decoder),
            voice_note: VoiceNoteTranscoder::new(engine),
        }
    }

    pub fn engine_state(&self) -> EngineState {
        self.voice_note.engine_state()
    }

    pub async fn preload_engine(&self) -> PipelineResult<()> {
        self.voice_note.preload().await
    }

    pub async fn encode_to_wav(&self, input: &AudioBlob) -> PipelineResult<AudioBlob> {
        instrumented(ConversionKind::Wav, input, self.wav.encode_to_wav(input)).await
    }

    pub async fn encode_to_voice_note(&self, input: &AudioBlob) -> PipelineResult<AudioBlob> {
        instrumented(ConversionKind::VoiceNote, input, self.voice_note.encode_to_voice_note(input)).await
    }
}

async fn instrumented<F>(kind: ConversionKind, input: &AudioBlob, conversion: F) -> PipelineResult<AudioBlob>
where
    F: Future<Output = PipelineResult<AudioBlob>>,
{
    let span = info_span!(
        "conversion",
        conversion_id = %Uuid::new_v4(),
        kind = kind.as_str(),
        input_bytes = input.len(),
        media_type = input.media_type().unwrap_or("unknown")
    );

    async move {
        let started = Instant::now();
        let result = conversion.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => info!(output_bytes = output.len(), elapsed_ms, "Conversion completed"),
            Err(e) => warn!(error = %e, error_kind = e.kind(), elapsed_ms, "Conversion failed"),
        }
        result
    }
    .instrument(span)
    .await
}
