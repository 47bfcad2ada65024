//! # Ogg/Opus Inspection
//!
//! A minimal Ogg page walker used to verify transcoder output before it is
//! handed back to the caller. It only looks at what a voice-note consumer
//! cares about: how many logical streams start in the file and what their
//! `OpusHead` identification headers declare.
//!
//! Page CRCs are not verified.

use crate::audio::error::{PipelineError, PipelineResult};
use crate::audio::voice_note::VoiceNoteProfile;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;
const FLAG_BEGINNING_OF_STREAM: u8 = 0x02;
const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
const OPUS_HEAD_MIN_LEN: usize = 19;

/// What an `OpusHead` identification header declares for one logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OggStreamInfo {
    pub serial: u32,
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
}

/// Walk every page of an Ogg file and collect the Opus streams it begins.
///
/// Beginning-of-stream pages whose first packet is not an `OpusHead` are
/// skipped (they belong to other codecs). Truncated or malformed pages are
/// an error.
pub fn inspect(bytes: &[u8]) -> PipelineResult<Vec<OggStreamInfo>> {
    let mut streams = Vec::new();
    let mut offset = 0usize;

    if bytes.is_empty() {
        return Err(invalid("empty Ogg payload"));
    }

    while offset < bytes.len() {
        let page = bytes
            .get(offset..)
            .ok_or_else(|| invalid("page offset out of range"))?;
        if page.len() < PAGE_HEADER_LEN || &page[0..4] != CAPTURE_PATTERN {
            return Err(invalid(&format!("missing capture pattern at byte {}", offset)));
        }

        let mut header = Cursor::new(&page[4..PAGE_HEADER_LEN]);
        let version = read(header.read_u8())?;
        if version != 0 {
            return Err(invalid(&format!("unsupported Ogg version {}", version)));
        }
        let header_type = read(header.read_u8())?;
        let _granule = read(header.read_i64::<LittleEndian>())?;
        let serial = read(header.read_u32::<LittleEndian>())?;
        let _sequence = read(header.read_u32::<LittleEndian>())?;
        let _crc = read(header.read_u32::<LittleEndian>())?;
        let segment_count = read(header.read_u8())? as usize;

        let lacing = page
            .get(PAGE_HEADER_LEN..PAGE_HEADER_LEN + segment_count)
            .ok_or_else(|| invalid("truncated lacing table"))?;
        let body_len: usize = lacing.iter().map(|&v| v as usize).sum();
        let body_start = PAGE_HEADER_LEN + segment_count;
        let body = page
            .get(body_start..body_start + body_len)
            .ok_or_else(|| invalid("truncated page body"))?;

        if header_type & FLAG_BEGINNING_OF_STREAM != 0 {
            let first_packet = &body[..first_packet_len(lacing).min(body.len())];
            if let Some(info) = parse_opus_head(serial, first_packet)? {
                streams.push(info);
            }
        }

        offset += body_start + body_len;
    }

    Ok(streams)
}

/// Check that `bytes` is exactly one Opus stream matching the profile.
pub fn verify_voice_note(bytes: &[u8], profile: &VoiceNoteProfile) -> PipelineResult<OggStreamInfo> {
    let streams = inspect(bytes)
        .map_err(|e| PipelineError::TranscodeError(format!("Engine produced invalid Ogg output: {}", e.message())))?;

    let stream = match streams.as_slice() {
        [single] => *single,
        other => {
            return Err(PipelineError::TranscodeError(format!(
                "Expected exactly one Opus stream, found {}",
                other.len()
            )))
        }
    };

    if stream.channels as u32 != profile.channels {
        return Err(PipelineError::TranscodeError(format!(
            "Expected {} channel(s), engine produced {}",
            profile.channels, stream.channels
        )));
    }
    if stream.input_sample_rate != profile.sample_rate {
        return Err(PipelineError::TranscodeError(format!(
            "Expected {} Hz, engine produced {} Hz",
            profile.sample_rate, stream.input_sample_rate
        )));
    }

    Ok(stream)
}

/// Length of the first packet on a page: lacing values up to and including
/// the first one below 255.
fn first_packet_len(lacing: &[u8]) -> usize {
    let mut len = 0usize;
    for &value in lacing {
        len += value as usize;
        if value < 255 {
            break;
        }
    }
    len
}

fn parse_opus_head(serial: u32, packet: &[u8]) -> PipelineResult<Option<OggStreamInfo>> {
    if !packet.starts_with(OPUS_HEAD_MAGIC) {
        return Ok(None);
    }
    if packet.len() < OPUS_HEAD_MIN_LEN {
        return Err(invalid("truncated OpusHead"));
    }

    let mut cursor = Cursor::new(&packet[OPUS_HEAD_MAGIC.len()..]);
    let _version = read(cursor.read_u8())?;
    let channels = read(cursor.read_u8())?;
    let pre_skip = read(cursor.read_u16::<LittleEndian>())?;
    let input_sample_rate = read(cursor.read_u32::<LittleEndian>())?;

    Ok(Some(OggStreamInfo {
        serial,
        channels,
        pre_skip,
        input_sample_rate,
    }))
}

fn read<T>(result: std::io::Result<T>) -> PipelineResult<T> {
    result.map_err(|e| invalid(&e.to_string()))
}

fn invalid(msg: &str) -> PipelineError {
    PipelineError::DecodeError(format!("Invalid Ogg data: {}", msg))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_inspect_single_stream() {
        let streams = inspect(&voice_note(1, 48000)).unwrap();
        assert_eq!(
            streams,
            vec![OggStreamInfo {
                serial: 7,
                channels: 1,
                pre_skip: 312,
                input_sample_rate: 48000
            }]
        );
    }

    #[test]
    fn test_inspect_counts_multiple_streams() {
        let mut bytes = page(FLAG_BEGINNING_OF_STREAM, 1, 0, &opus_head(1, 48000));
        bytes.extend(page(FLAG_BEGINNING_OF_STREAM, 2, 0, &opus_head(2, 44100)));
        let streams = inspect(&bytes).unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[1].channels, 2);
    }

    #[test]
    fn test_inspect_ignores_non_opus_streams() {
        let bytes = page(FLAG_BEGINNING_OF_STREAM, 3, 0, b"\x01vorbis\x00\x00\x00\x00\x01");
        assert!(inspect(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_inspect_handles_long_packets() {
        // Body longer than 255 bytes needs several lacing values
        let mut body = opus_head(1, 48000);
        body.resize(600, 0);
        let bytes = page(FLAG_BEGINNING_OF_STREAM, 9, 0, &body);
        let streams = inspect(&bytes).unwrap();
        assert_eq!(streams[0].input_sample_rate, 48000);
    }

    #[test]
    fn test_inspect_rejects_truncation() {
        let bytes = voice_note(1, 48000);
        assert!(inspect(&bytes[..bytes.len() - 5]).is_err());
        assert!(inspect(b"RIFF....WAVE").is_err());
        assert!(inspect(&[]).is_err());
    }

    #[test]
    fn test_verify_voice_note_profile() {
        let profile = VoiceNoteProfile::default();
        assert!(verify_voice_note(&voice_note(1, 48000), &profile).is_ok());

        let stereo = verify_voice_note(&voice_note(2, 48000), &profile);
        assert!(matches!(stereo, Err(PipelineError::TranscodeError(_))));

        let wrong_rate = verify_voice_note(&voice_note(1, 16000), &profile);
        assert!(matches!(wrong_rate, Err(PipelineError::TranscodeError(_))));

        let garbage = verify_voice_note(b"not ogg", &profile);
        assert!(matches!(garbage, Err(PipelineError::TranscodeError(_))));
    }
}
