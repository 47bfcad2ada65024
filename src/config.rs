//! # Configuration Management
//!
//! Settings are layered from several sources, highest priority first:
//! 1. `HOST` / `PORT` (deployment platform conventions)
//! 2. Environment variables with the `APP_` prefix, nested keys joined by `__`
//!    (e.g. `APP_TRANSCODER__FFMPEG_PATH=/usr/local/bin/ffmpeg`)
//! 3. `config.toml` in the working directory, if present
//! 4. Built-in defaults
//!
//! ## Sections:
//! - **server**: Bind address of the HTTP surface
//! - **limits**: Upload size cap for incoming audio
//! - **transcoder**: Where to find the codec engine and where it may write

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub transcoder: TranscoderConfig,
}

/// Server bind settings.
///
/// `host = "0.0.0.0"` accepts connections from anywhere; the default only
/// listens on localhost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,
}

/// Codec engine settings for the voice-note transcoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// ffmpeg executable: a bare name looked up on `PATH` or an absolute path
    pub ffmpeg_path: String,

    /// Parent directory for the engine's scratch space (system temp dir if unset)
    #[serde(default)]
    pub work_dir: Option<String>,

    /// Load the engine at startup instead of on the first voice-note request
    #[serde(default)]
    pub preload: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            limits: LimitsConfig {
                max_upload_bytes: 25 * 1024 * 1024, // 25 MiB, a long voice recording
            },
            transcoder: TranscoderConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                work_dir: None,
                preload: false,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = Self::defaults_builder()?
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Layer a TOML document over the defaults, ignoring the environment.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config = Self::defaults_builder()?
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    fn defaults_builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.limits.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.transcoder.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcoder ffmpeg_path cannot be empty"));
        }

        Ok(())
    }
}
