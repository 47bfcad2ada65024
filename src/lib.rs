//! # Voice Note Pipeline
//!
//! Audio normalization service: a WAV encoder that turns anything the host
//! decoder understands into 16-bit PCM WAV, and a voice-note transcoder that
//! produces mono 48 kHz Opus-in-Ogg through a lazily loaded, shared codec
//! engine.
//!
//! ## Modules:
//! - **audio**: The converters and everything they are built from
//! - **config**: Layered configuration (defaults, `config.toml`, environment)
//! - **error**: HTTP error envelope and status mapping
//! - **state**: Shared handler state and conversion metrics
//! - **health**: Health and metrics endpoints
//! - **handlers**: Conversion and config endpoints plus the route table

pub mod audio;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod state;
