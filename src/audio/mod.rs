//! # Audio Normalization Module
//!
//! Two independent converters that callers hand a blob and get a blob back:
//!
//! - **WAV Encoder** (`wav`): decode anything the host decoder understands and
//!   re-serialize it as canonical 16-bit PCM WAV at the native rate and
//!   channel count
//! - **Voice-Note Transcoder** (`voice_note`): sniff the container, run it
//!   through the shared codec engine and produce mono 48 kHz Opus-in-Ogg
//!
//! ## Supporting Pieces:
//! - **blob**: Opaque payload plus declared media type
//! - **container**: Magic-byte and media-type container detection
//! - **decode**: Injectable decode capability (symphonia by default)
//! - **engine**: Single-flight, exclusively leased codec engine handle
//! - **ffmpeg**: Default codec engine backed by an ffmpeg executable
//! - **ogg**: Ogg/Opus output inspection
//! - **pipeline**: Both converters behind one instrumented facade

pub mod blob;
pub mod container;
pub mod decode;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod ogg;
pub mod pipeline;
pub mod voice_note;
pub mod wav;

pub use blob::{AudioBlob, MEDIA_TYPE_OGG, MEDIA_TYPE_WAV};
pub use container::ContainerKind;
pub use decode::{AudioDecoder, DecodeSession, DecodedAudio, SymphoniaDecoder};
pub use engine::{CodecEngine, EngineHandle, EngineLoader, EngineState};
pub use error::{PipelineError, PipelineResult};
pub use ffmpeg::FfmpegLoader;
pub use pipeline::{AudioPipeline, ConversionKind};
pub use voice_note::{VoiceNoteProfile, VoiceNoteTranscoder};
pub use wav::{WavEncoder, WavHeader};
