//! # WAV Encoder
//!
//! Re-serializes any decodable input into a canonical 16-bit linear PCM WAV.
//! Sample rate and channel count are taken from the decoded source as-is.
//!
//! ## Canonical Layout (little-endian):
//! ```text
//! 0   "RIFF"            4   36 + data_size
//! 8   "WAVE"            12  "fmt "
//! 16  16 (fmt size)     20  1 (PCM)
//! 22  channels          24  sample_rate
//! 28  byte_rate         32  block_align
//! 34  16 (bit depth)    36  "data"
//! 40  data_size         44  interleaved i16 samples
//! ```

use crate::audio::blob::{AudioBlob, MEDIA_TYPE_WAV};
use crate::audio::container::ContainerKind;
use crate::audio::decode::{AudioDecoder, DecodedAudio};
use crate::audio::error::{PipelineError, PipelineResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::debug;

pub const WAV_HEADER_LEN: usize = 44;
const PCM_FORMAT: u16 = 1;
const BIT_DEPTH: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BIT_DEPTH / 8;

/// Convert a normalized float sample to signed 16-bit PCM.
///
/// Clamps to [-1, 1], then scales negatives by 32768 and everything else by
/// 32767 so both ends of the i16 range are reachable without overflow. NaN
/// becomes silence.
pub fn pcm16_from_f32(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Serialize decoded audio as a canonical 16-bit PCM WAV file.
pub fn write_wav(audio: &DecodedAudio) -> PipelineResult<Vec<u8>> {
    let channels = u16::try_from(audio.channel_count()).map_err(|_| {
        PipelineError::UnsupportedFormat(format!("Too many channels for WAV: {}", audio.channel_count()))
    })?;
    let block_align = channels
        .checked_mul(BYTES_PER_SAMPLE)
        .ok_or_else(|| PipelineError::UnsupportedFormat("Block align overflows 16 bits".to_string()))?;
    let byte_rate = audio
        .sample_rate()
        .checked_mul(block_align as u32)
        .ok_or_else(|| PipelineError::UnsupportedFormat("Byte rate overflows 32 bits".to_string()))?;
    let data_size = u32::try_from(audio.frames() as u64 * block_align as u64)
        .ok()
        .filter(|size| size.checked_add(36).is_some())
        .ok_or_else(|| PipelineError::UnsupportedFormat("Audio too long for a WAV container".to_string()))?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_size as usize);
    write_header(&mut out, channels, audio.sample_rate(), byte_rate, block_align, data_size)
        .map_err(|e| PipelineError::DecodeError(format!("Failed to write WAV header: {}", e)))?;

    let planes = audio.channels();
    for frame in 0..audio.frames() {
        for plane in planes {
            out.write_i16::<LittleEndian>(pcm16_from_f32(plane[frame]))
                .map_err(|e| PipelineError::DecodeError(format!("Failed to write sample: {}", e)))?;
        }
    }

    Ok(out)
}

fn write_header(
    out: &mut Vec<u8>,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    data_size: u32,
) -> std::io::Result<()> {
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(36 + data_size)?;
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(PCM_FORMAT)?;
    out.write_u16::<LittleEndian>(channels)?;
    out.write_u32::<LittleEndian>(sample_rate)?;
    out.write_u32::<LittleEndian>(byte_rate)?;
    out.write_u16::<LittleEndian>(block_align)?;
    out.write_u16::<LittleEndian>(BIT_DEPTH)?;

    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_size)?;
    Ok(())
}

/// Fields of a canonical 44-byte WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bit_depth: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Parse the canonical header written by [`write_wav`].
    ///
    /// Only the fixed layout is understood; files with extra chunks before
    /// `data` are rejected.
    pub fn parse(bytes: &[u8]) -> PipelineResult<Self> {
        if bytes.len() < WAV_HEADER_LEN {
            return Err(PipelineError::DecodeError(format!(
                "WAV header needs {} bytes, got {}",
                WAV_HEADER_LEN,
                bytes.len()
            )));
        }
        Self::read_from(&mut Cursor::new(bytes))
            .map_err(|e| PipelineError::DecodeError(format!("Malformed WAV header: {}", e)))
    }

    fn read_from(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        expect_tag(cursor, b"RIFF")?;
        let riff_size = cursor.read_u32::<LittleEndian>()?;
        expect_tag(cursor, b"WAVE")?;
        expect_tag(cursor, b"fmt ")?;
        let fmt_size = cursor.read_u32::<LittleEndian>()?;
        if fmt_size != 16 {
            return Err(invalid(format!("unexpected fmt chunk size {}", fmt_size)));
        }
        let audio_format = cursor.read_u16::<LittleEndian>()?;
        let channels = cursor.read_u16::<LittleEndian>()?;
        let sample_rate = cursor.read_u32::<LittleEndian>()?;
        let byte_rate = cursor.read_u32::<LittleEndian>()?;
        let block_align = cursor.read_u16::<LittleEndian>()?;
        let bit_depth = cursor.read_u16::<LittleEndian>()?;
        expect_tag(cursor, b"data")?;
        let data_size = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            riff_size,
            audio_format,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bit_depth,
            data_size,
        })
    }

    /// Duration implied by the header, in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.byte_rate == 0 {
            return 0.0;
        }
        self.data_size as f64 / self.byte_rate as f64
    }
}

fn expect_tag(cursor: &mut Cursor<&[u8]>, tag: &[u8; 4]) -> std::io::Result<()> {
    let mut found = [0u8; 4];
    cursor.read_exact(&mut found)?;
    if &found != tag {
        return Err(invalid(format!(
            "expected {:?}, found {:?}",
            String::from_utf8_lossy(tag),
            String::from_utf8_lossy(&found)
        )));
    }
    Ok(())
}

fn invalid(msg: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

/// Converts arbitrary audio blobs into canonical 16-bit PCM WAV blobs.
pub struct WavEncoder {
    decoder: Arc<dyn AudioDecoder>,
}

impl WavEncoder {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { decoder }
    }

    /// Decode `input` and re-encode it as `audio/wav`.
    ///
    /// The decode context is opened and dropped inside the blocking task, so
    /// it is released on every exit path.
    pub async fn encode_to_wav(&self, input: &AudioBlob) -> PipelineResult<AudioBlob> {
        let decoder = Arc::clone(&self.decoder);
        let bytes = input.bytes().to_vec();
        let hint = ContainerKind::resolve(input).symphonia_hint();

        let wav = tokio::task::spawn_blocking(move || -> PipelineResult<Vec<u8>> {
            let mut session = decoder.open()?;
            let audio = session.decode(&bytes, hint)?;
            drop(session);

            debug!(
                sample_rate = audio.sample_rate(),
                channels = audio.channel_count(),
                frames = audio.frames(),
                "Serializing WAV"
            );
            write_wav(&audio)
        })
        .await
        .map_err(|e| PipelineError::DecodeError(format!("Decode task failed: {}", e)))??;

        Ok(AudioBlob::new(wav, MEDIA_TYPE_WAV))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::{DecodeSession, SymphoniaDecoder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Decoder fake that returns fixed audio and counts open/released contexts.
    struct FakeDecoder {
        result: PipelineResult<DecodedAudio>,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    struct FakeSession {
        result: PipelineResult<DecodedAudio>,
        released: Arc<AtomicUsize>,
    }

    impl AudioDecoder for FakeDecoder {
        fn open(&self) -> PipelineResult<Box<dyn DecodeSession>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                result: self.result.clone(),
                released: Arc::clone(&self.released),
            }))
        }
    }

    impl DecodeSession for FakeSession {
        fn decode(&mut self, _bytes: &[u8], _hint: Option<&str>) -> PipelineResult<DecodedAudio> {
            self.result.clone()
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoDecoder;

    impl AudioDecoder for NoDecoder {
        fn open(&self) -> PipelineResult<Box<dyn DecodeSession>> {
            Err(PipelineError::UnsupportedFormat("no decoder available".to_string()))
        }
    }

    fn fake(result: PipelineResult<DecodedAudio>) -> (FakeDecoder, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let decoder = FakeDecoder {
            result,
            opened: Arc::clone(&opened),
            released: Arc::clone(&released),
        };
        (decoder, opened, released)
    }

    fn sine_wav(seconds: u32, channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..(seconds * sample_rate) {
                let t = i as f32 / sample_rate as f32;
                let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
                for _ in 0..channels {
                    writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_pcm16_scaling() {
        assert_eq!(pcm16_from_f32(0.0), 0);
        assert_eq!(pcm16_from_f32(1.0), 32767);
        assert_eq!(pcm16_from_f32(-1.0), -32768);
        assert_eq!(pcm16_from_f32(0.5), 16383);
        assert_eq!(pcm16_from_f32(-0.5), -16384);
        // Out-of-range input is clamped rather than wrapped
        assert_eq!(pcm16_from_f32(3.0), 32767);
        assert_eq!(pcm16_from_f32(-7.5), -32768);
        assert_eq!(pcm16_from_f32(f32::NAN), 0);
    }

    #[test]
    fn test_header_layout() {
        let audio = DecodedAudio::new(22050, vec![vec![0.1; 10], vec![-0.1; 10], vec![0.0; 10]]).unwrap();
        let wav = write_wav(&audio).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let header = WavHeader::parse(&wav).unwrap();
        let data_size = 10 * 3 * 2;
        assert_eq!(header.data_size, data_size);
        assert_eq!(header.riff_size, 36 + data_size);
        assert_eq!(header.audio_format, 1);
        assert_eq!(header.channels, 3);
        assert_eq!(header.sample_rate, 22050);
        assert_eq!(header.block_align, 6);
        assert_eq!(header.byte_rate, 22050 * 6);
        assert_eq!(header.bit_depth, 16);
        assert_eq!(wav.len(), WAV_HEADER_LEN + data_size as usize);
    }

    #[test]
    fn test_interleaving_order() {
        let audio = DecodedAudio::new(8000, vec![vec![1.0, -1.0], vec![0.0, 0.5]]).unwrap();
        let wav = write_wav(&audio).unwrap();
        let mut data = Cursor::new(&wav[WAV_HEADER_LEN..]);

        let samples: Vec<i16> = (0..4).map(|_| data.read_i16::<LittleEndian>().unwrap()).collect();
        assert_eq!(samples, vec![32767, 0, -32768, 16383]);
    }

    #[test]
    fn test_silence_encodes_to_zero_bytes() {
        let audio = DecodedAudio::new(16000, vec![vec![0.0; 1600]; 2]).unwrap();
        let wav = write_wav(&audio).unwrap();
        assert!(wav[WAV_HEADER_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_quantization_round_trip() {
        let original: Vec<f32> = (0..2000).map(|i| ((i as f32) * 0.013).sin() * 0.9).collect();
        let audio = DecodedAudio::new(48000, vec![original.clone()]).unwrap();
        let wav = write_wav(&audio).unwrap();
        let mut data = Cursor::new(&wav[WAV_HEADER_LEN..]);

        for &expected in &original {
            let pcm = data.read_i16::<LittleEndian>().unwrap();
            let restored = if pcm < 0 { pcm as f32 / 32768.0 } else { pcm as f32 / 32767.0 };
            assert!(
                (restored - expected).abs() <= 1.0 / 32767.0,
                "sample {} restored as {}",
                expected,
                restored
            );
        }
    }

    #[test]
    fn test_header_fields_that_overflow_are_unsupported() {
        // 40000 channels fit in u16 but not once doubled into the block align
        let wide = DecodedAudio::new(8000, vec![vec![0.0; 1]; 40_000]).unwrap();
        assert!(matches!(write_wav(&wide), Err(PipelineError::UnsupportedFormat(_))));

        let too_many = DecodedAudio::new(8000, vec![vec![0.0; 1]; 70_000]).unwrap();
        match write_wav(&too_many) {
            Err(PipelineError::UnsupportedFormat(msg)) => assert!(msg.contains("70000")),
            other => panic!("expected UnsupportedFormat, got {:?}", other.map(|b| b.len())),
        }

        let fast = DecodedAudio::new(u32::MAX, vec![vec![0.0; 4]]).unwrap();
        assert!(matches!(write_wav(&fast), Err(PipelineError::UnsupportedFormat(_))));

        // The widest layout that still fits is accepted
        let widest = DecodedAudio::new(8000, vec![vec![0.0; 1]; 32_767]).unwrap();
        let header = WavHeader::parse(&write_wav(&widest).unwrap()).unwrap();
        assert_eq!(header.block_align, 65534);
    }

    #[tokio::test]
    async fn test_encoder_reports_overflow_as_unsupported() {
        let (decoder, _, released) = fake(DecodedAudio::new(8000, vec![vec![0.0; 1]; 40_000]));
        let encoder = WavEncoder::new(Arc::new(decoder));

        let result = encoder.encode_to_wav(&AudioBlob::new(vec![1, 2, 3], "audio/webm")).await;
        assert!(matches!(result, Err(PipelineError::UnsupportedFormat(_))));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_header_parse_rejects_non_wav() {
        assert!(WavHeader::parse(b"RIFF").is_err());
        let mut bogus = vec![0u8; WAV_HEADER_LEN];
        bogus[0..4].copy_from_slice(b"OggS");
        assert!(WavHeader::parse(&bogus).is_err());
    }

    #[tokio::test]
    async fn test_encode_releases_context_on_success() {
        let audio = DecodedAudio::new(16000, vec![vec![0.25; 160]]).unwrap();
        let (decoder, opened, released) = fake(Ok(audio));
        let encoder = WavEncoder::new(Arc::new(decoder));

        let output = encoder
            .encode_to_wav(&AudioBlob::new(vec![1, 2, 3], "audio/webm"))
            .await
            .unwrap();

        assert_eq!(output.media_type(), Some("audio/wav"));
        assert_eq!(WavHeader::parse(output.bytes()).unwrap().data_size, 320);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_encode_releases_context_on_failure() {
        let (decoder, opened, released) = fake(Err(PipelineError::DecodeError("corrupt".to_string())));
        let encoder = WavEncoder::new(Arc::new(decoder));

        let result = encoder.encode_to_wav(&AudioBlob::untyped(vec![0; 16])).await;

        assert_eq!(result, Err(PipelineError::DecodeError("corrupt".to_string())));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_decoder_is_unsupported_format() {
        let encoder = WavEncoder::new(Arc::new(NoDecoder));
        let result = encoder.encode_to_wav(&AudioBlob::untyped(vec![0; 16])).await;
        assert!(matches!(result, Err(PipelineError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_stereo_sine_end_to_end() {
        let input = AudioBlob::new(sine_wav(2, 2, 44100), "audio/wav");
        let encoder = WavEncoder::new(Arc::new(SymphoniaDecoder::new()));

        let output = encoder.encode_to_wav(&input).await.unwrap();
        let header = WavHeader::parse(output.bytes()).unwrap();

        assert_eq!(header.channels, 2);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.bit_depth, 16);
        assert_eq!(header.data_size, 2 * 44100 * 2 * 2);
        assert_eq!(header.riff_size, 36 + header.data_size);

        // The output is readable by an independent WAV reader
        let reader = hound::WavReader::new(Cursor::new(output.bytes().to_vec())).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.len(), 2 * 44100 * 2);
    }

    #[tokio::test]
    async fn test_input_is_not_consumed() {
        let input = AudioBlob::new(sine_wav(1, 1, 8000), "audio/wav");
        let snapshot = input.clone();
        let encoder = WavEncoder::new(Arc::new(SymphoniaDecoder::new()));

        encoder.encode_to_wav(&input).await.unwrap();
        assert_eq!(input, snapshot);
    }
}
