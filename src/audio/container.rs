//! # Container Detection
//!
//! Works out which container an input blob really is. Two signals are
//! available: the declared media type and the magic bytes at the start of
//! the payload. The header always wins when it is recognized; the media type
//! is only a fallback.
//!
//! ## Recognized Signatures:
//! - `RIFF....WAVE` → wav
//! - `OggS` → ogg
//! - `....ftyp` (bytes 4-7) → m4a
//! - `1A 45 DF A3` (EBML) → webm
//! - `ID3` → mp3

use crate::audio::blob::{media_type_essence, AudioBlob};

/// Container format of an input payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Wav,
    Ogg,
    M4a,
    Webm,
    Mp3,
    /// Neither the header nor the media type identified the container
    Unknown,
}

const EBML_MAGIC: [u8; 4] = [0x1a, 0x45, 0xdf, 0xa3];

impl ContainerKind {
    /// File extension the codec engine uses to pick a demuxer.
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerKind::Wav => "wav",
            ContainerKind::Ogg => "ogg",
            ContainerKind::M4a => "m4a",
            ContainerKind::Webm => "webm",
            ContainerKind::Mp3 => "mp3",
            ContainerKind::Unknown => "bin",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != ContainerKind::Unknown
    }

    /// Format hint for the symphonia decoder, `None` when unknown.
    pub fn symphonia_hint(&self) -> Option<&'static str> {
        if self.is_known() {
            Some(self.extension())
        } else {
            None
        }
    }

    /// Guess the container from a declared media type.
    ///
    /// Matches by substring on the lowercased essence, so `audio/x-wav`,
    /// `audio/vnd.wave` and `audio/wav` all map to wav.
    pub fn from_media_type(media_type: &str) -> Self {
        Self::from_essence(&media_type_essence(media_type))
    }

    fn from_essence(essence: &str) -> Self {
        if essence.contains("wav") {
            ContainerKind::Wav
        } else if essence.contains("ogg") {
            ContainerKind::Ogg
        } else if essence.contains("mpeg") {
            ContainerKind::Mp3
        } else if essence.contains("mp4") {
            ContainerKind::M4a
        } else if essence.contains("webm") {
            ContainerKind::Webm
        } else {
            ContainerKind::Unknown
        }
    }

    /// Identify the container from its leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.len() >= 12 && starts_with_at(bytes, b"RIFF", 0) && starts_with_at(bytes, b"WAVE", 8) {
            ContainerKind::Wav
        } else if starts_with_at(bytes, b"OggS", 0) {
            ContainerKind::Ogg
        } else if starts_with_at(bytes, b"ftyp", 4) {
            ContainerKind::M4a
        } else if starts_with_at(bytes, &EBML_MAGIC, 0) {
            ContainerKind::Webm
        } else if starts_with_at(bytes, b"ID3", 0) {
            ContainerKind::Mp3
        } else {
            ContainerKind::Unknown
        }
    }

    /// Resolve the container of a blob: header first, declared type second.
    pub fn resolve(blob: &AudioBlob) -> Self {
        let from_header = Self::sniff(blob.bytes());
        if from_header.is_known() {
            return from_header;
        }
        Self::from_essence(&blob.essence())
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

fn starts_with_at(bytes: &[u8], magic: &[u8], offset: usize) -> bool {
    bytes
        .get(offset..offset + magic.len())
        .map_or(false, |window| window == magic)
}
