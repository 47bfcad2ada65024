//! # Pipeline Errors
//!
//! Error taxonomy shared by both converters. Every failure the pipeline can
//! report to a caller is one of four kinds; housekeeping problems (closing a
//! decode context, deleting engine scratch files) are logged and never end up
//! here.
//!
//! ## Error Kinds:
//! - **UnsupportedFormat**: No decoder is available for the input (WAV path)
//! - **DecodeError**: The bytes are not a decodable audio stream
//! - **EngineLoadError**: The codec engine could not be located or initialized
//! - **TranscodeError**: The codec engine ran but reported a failure

use std::fmt;

/// Failure reported by the audio normalization pipeline.
///
/// Each variant carries a human-readable description of the underlying cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The host has no decoding capability for this input
    UnsupportedFormat(String),

    /// The input bytes could not be decoded as audio
    DecodeError(String),

    /// The codec engine's runtime could not be fetched or initialized
    EngineLoadError(String),

    /// The codec engine reported an execution failure
    TranscodeError(String),
}

impl PipelineError {
    /// Stable, machine-readable label for this error kind.
    ///
    /// Used as the `type` field of HTTP error bodies and as the key of the
    /// per-kind failure counters.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedFormat(_) => "unsupported_format",
            PipelineError::DecodeError(_) => "decode_error",
            PipelineError::EngineLoadError(_) => "engine_load_error",
            PipelineError::TranscodeError(_) => "transcode_error",
        }
    }

    /// The message carried by the error, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            PipelineError::UnsupportedFormat(msg)
            | PipelineError::DecodeError(msg)
            | PipelineError::EngineLoadError(msg)
            | PipelineError::TranscodeError(msg) => msg,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::UnsupportedFormat(msg) => write!(f, "Unsupported audio format: {}", msg),
            PipelineError::DecodeError(msg) => write!(f, "Audio decode error: {}", msg),
            PipelineError::EngineLoadError(msg) => write!(f, "Codec engine load error: {}", msg),
            PipelineError::TranscodeError(msg) => write!(f, "Transcode error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Shorthand for results produced by the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;
