//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data`.
//!
//! ## Contents:
//! - **config**: The validated configuration the server started with
//! - **metrics**: Per-converter counters, updated after every conversion
//! - **pipeline**: The audio pipeline, which owns the lazily loaded codec engine
//! - **start_time**: For uptime reporting
//!
//! ## Rust Concepts:
//! - **Arc<RwLock<T>>**: Many handlers read metrics concurrently; a conversion
//!   takes the write lock only long enough to bump its counters
//! - **Arc<AudioPipeline>**: The pipeline synchronizes internally, so it is
//!   shared without an outer lock

use crate::audio::{AudioPipeline, ConversionKind};
use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metrics: Arc<RwLock<ConversionMetrics>>,
    pub pipeline: Arc<AudioPipeline>,
    pub start_time: Instant,
}

/// Counters for every converter that has handled at least one request.
#[derive(Debug, Default, Clone)]
pub struct ConversionMetrics {
    pub converters: HashMap<ConversionKind, ConverterMetric>,
}

/// Counters for one converter.
///
/// ## Derived values:
/// - **Average duration**: total_duration_ms / request_count
/// - **Failure rate**: failure_count / request_count
#[derive(Debug, Default, Clone)]
pub struct ConverterMetric {
    pub request_count: u64,

    /// Failures keyed by error kind (`decode_error`, `transcode_error`, ...)
    pub failures: HashMap<String, u64>,

    /// Input bytes across all requests, output bytes across successful ones
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub total_duration_ms: u64,
}

impl AppState {
    /// Build state with the production pipeline (symphonia + ffmpeg).
    pub fn new(config: AppConfig) -> Self {
        let pipeline = AudioPipeline::from_config(&config.transcoder);
        Self::with_pipeline(config, pipeline)
    }

    pub fn with_pipeline(config: AppConfig, pipeline: AudioPipeline) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(ConversionMetrics::default())),
            pipeline: Arc::new(pipeline),
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> AppConfig {
        self.config.as_ref().clone()
    }

    pub fn record_success(&self, kind: ConversionKind, bytes_in: usize, bytes_out: usize, duration_ms: u64) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        let metric = metrics.converters.entry(kind).or_default();
        metric.request_count += 1;
        metric.bytes_in += bytes_in as u64;
        metric.bytes_out += bytes_out as u64;
        metric.total_duration_ms += duration_ms;
    }

    pub fn record_failure(&self, kind: ConversionKind, bytes_in: usize, error_kind: &str, duration_ms: u64) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        let metric = metrics.converters.entry(kind).or_default();
        metric.request_count += 1;
        metric.bytes_in += bytes_in as u64;
        metric.total_duration_ms += duration_ms;
        *metric.failures.entry(error_kind.to_string()).or_default() += 1;
    }

    /// Copy the counters out so the lock is not held while serializing.
    pub fn get_metrics_snapshot(&self) -> ConversionMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl ConversionMetrics {
    pub fn total_requests(&self) -> u64 {
        self.converters.values().map(|m| m.request_count).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.converters.values().map(|m| m.failure_count()).sum()
    }
}

impl ConverterMetric {
    pub fn failure_count(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn success_count(&self) -> u64 {
        self.request_count - self.failure_count()
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.failure_count() as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Mean output size of successful conversions.
    pub fn average_output_bytes(&self) -> f64 {
        let successes = self.success_count();
        if successes > 0 {
            self.bytes_out as f64 / successes as f64
        } else {
            0.0
        }
    }
}
