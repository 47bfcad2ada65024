//! # HTTP Handlers
//!
//! Route table shared by the server binary and the handler tests.

pub mod audio;
pub mod config;

pub use self::audio::*;
pub use self::config::*;

use crate::health;
use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(get_config))
            .route("/audio/wav", web::post().to(convert_to_wav))
            .route("/audio/voice-note", web::post().to(convert_to_voice_note)),
    )
    // Also provide health check at root level for convenience
    .route("/health", web::get().to(health::health_check));
}
