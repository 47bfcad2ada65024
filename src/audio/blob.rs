//! # Audio Blobs
//!
//! The opaque byte payload exchanged with callers: raw bytes plus a
//! best-effort media type. The declared type is untrusted; converters sniff
//! the real container from the bytes whenever it matters.

/// Media type of blobs produced by the WAV encoder.
pub const MEDIA_TYPE_WAV: &str = "audio/wav";

/// Media type of blobs produced by the voice-note transcoder.
pub const MEDIA_TYPE_OGG: &str = "audio/ogg";

/// Strip parameters from a media type, then trim and lowercase it.
pub fn media_type_essence(media_type: &str) -> String {
    media_type.split(';').next().unwrap_or("").trim().to_lowercase()
}

/// An opaque audio payload with an optional declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    bytes: Vec<u8>,
    media_type: Option<String>,
}

impl AudioBlob {
    /// Create a blob with a declared media type (e.g. `audio/webm;codecs=opus`).
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: Some(media_type.into()),
        }
    }

    /// Create a blob whose media type is unknown.
    pub fn untyped(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The media type exactly as declared by the caller.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// The declared media type without parameters, trimmed and lowercased.
    ///
    /// `"Audio/WebM; codecs=opus"` becomes `"audio/webm"`. Returns an empty
    /// string when no type was declared.
    pub fn essence(&self) -> String {
        self.media_type.as_deref().map(media_type_essence).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
