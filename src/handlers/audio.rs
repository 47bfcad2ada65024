//! # Audio Conversion Endpoints
//!
//! ## Endpoints:
//! - `POST /api/v1/audio/wav`: any decodable audio → 16-bit PCM WAV
//! - `POST /api/v1/audio/voice-note`: any audio → mono 48 kHz Ogg/Opus
//!
//! Both take multipart form data with the audio in a field named `audio`.
//! The part's `Content-Type` is passed along as the declared media type.
//! The response body is the converted audio itself.

use crate::audio::{AudioBlob, ConversionKind};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use std::time::Instant;
use tracing::debug;

const AUDIO_FIELD: &str = "audio";

pub async fn convert_to_wav(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    convert(&state, payload, ConversionKind::Wav).await
}

pub async fn convert_to_voice_note(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    convert(&state, payload, ConversionKind::VoiceNote).await
}

async fn convert(state: &AppState, payload: Multipart, kind: ConversionKind) -> AppResult<HttpResponse> {
    let input = read_audio_field(payload, state.config.limits.max_upload_bytes).await?;

    let started = Instant::now();
    let result = match kind {
        ConversionKind::Wav => state.pipeline.encode_to_wav(&input).await,
        ConversionKind::VoiceNote => state.pipeline.encode_to_voice_note(&input).await,
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(output) => {
            state.record_success(kind, input.len(), output.len(), duration_ms);
            Ok(audio_response(output, kind))
        }
        Err(e) => {
            state.record_failure(kind, input.len(), e.kind(), duration_ms);
            Err(AppError::Pipeline(e))
        }
    }
}

/// Pull the `audio` part out of the form, enforcing the upload limit while streaming.
async fn read_audio_field(mut payload: Multipart, max_bytes: usize) -> AppResult<AudioBlob> {
    let mut audio: Option<AudioBlob> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field = item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let is_audio = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map(|name| name == AUDIO_FIELD)
            .unwrap_or(false);
        if !is_audio {
            continue;
        }
        if audio.is_some() {
            return Err(AppError::BadRequest(format!(
                "Multipart form contains more than one '{}' field",
                AUDIO_FIELD
            )));
        }

        let media_type = field.content_type().map(|mime| mime.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::PayloadTooLarge(format!(
                    "Upload exceeds {} bytes",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(bytes = bytes.len(), media_type = ?media_type, "Received audio upload");
        audio = Some(match media_type {
            Some(media_type) => AudioBlob::new(bytes, media_type),
            None => AudioBlob::untyped(bytes),
        });
    }

    audio.ok_or_else(|| AppError::BadRequest(format!("Missing multipart field '{}'", AUDIO_FIELD)))
}

fn audio_response(output: AudioBlob, kind: ConversionKind) -> HttpResponse {
    let filename = match kind {
        ConversionKind::Wav => "audio.wav",
        ConversionKind::VoiceNote => "voice-note.ogg",
    };
    let content_type = output
        .media_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    HttpResponse::Ok()
        .content_type(content_type)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(output.into_bytes())
}
