//! # Health and Metrics Endpoints
//!
//! - `GET /health`, `GET /api/v1/health`: liveness plus codec engine state
//! - `GET /api/v1/metrics`: per-converter counters

use crate::audio::ConversionKind;
use crate::state::{AppState, ConverterMetric};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let total_requests = metrics.total_requests();
    let total_failures = metrics.total_failures();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "engine": {
            "state": state.pipeline.engine_state(),
            "ffmpeg_path": config.transcoder.ffmpeg_path
        },
        "metrics": {
            "total_conversions": total_requests,
            "total_failures": total_failures,
            "failure_rate": if total_requests > 0 {
                total_failures as f64 / total_requests as f64
            } else {
                0.0
            }
        },
        "memory": get_memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let converters: Vec<_> = [ConversionKind::Wav, ConversionKind::VoiceNote]
        .iter()
        .map(|kind| {
            let metric = metrics.converters.get(kind).cloned().unwrap_or_default();
            converter_json(*kind, &metric)
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "engine_state": state.pipeline.engine_state(),
        "overall": {
            "total_conversions": metrics.total_requests(),
            "total_failures": metrics.total_failures(),
            "conversions_per_second": if uptime_seconds > 0 {
                metrics.total_requests() as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "converters": converters,
        "memory": get_memory_info()
    }))
}

fn converter_json(kind: ConversionKind, metric: &ConverterMetric) -> serde_json::Value {
    json!({
        "converter": kind.as_str(),
        "request_count": metric.request_count,
        "success_count": metric.success_count(),
        "failure_count": metric.failure_count(),
        "failure_rate": metric.failure_rate(),
        "failures_by_kind": metric.failures,
        "bytes_in": metric.bytes_in,
        "bytes_out": metric.bytes_out,
        "average_output_bytes": metric.average_output_bytes(),
        "average_duration_ms": metric.average_duration_ms(),
        "total_duration_ms": metric.total_duration_ms
    })
}

/// Resident and virtual memory of this process, from `/proc` where available.
fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let field_bytes = |key: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(key))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .map(|kb| kb * 1024)
                    .unwrap_or(0)
            };

            return json!({
                "resident_memory_bytes": field_bytes("VmRSS:"),
                "virtual_memory_bytes": field_bytes("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}
