//! # Codec Engine Handle
//!
//! The voice-note transcoder drives an external codec engine through a small
//! command-style interface: files go into the engine's private filesystem, a
//! transcode directive runs, and the result is read back out.
//!
//! ## Lifecycle:
//! Unloaded → Loading → Ready
//!
//! The engine is loaded lazily by the first caller and shared by everyone
//! after that. Concurrent first callers wait on the same load instead of
//! starting their own (single-flight). The load runs in its own task, so a
//! caller that gives up (timeout, dropped request) does not abort it; the
//! next caller picks up the same load. A failed load drops back to Unloaded
//! so a later call can try again; Ready is terminal.
//!
//! ## Exclusivity:
//! Engine invocations are not assumed to be reentrant. [`EngineHandle::acquire`]
//! hands out an owned lease on the engine; the next caller waits until the
//! current one has finished its write/exec/read/cleanup sequence.

use crate::audio::error::{PipelineError, PipelineResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

/// Command-style codec engine with a private, flat filesystem.
///
/// All methods are blocking; callers run them on a blocking thread.
pub trait CodecEngine: Send {
    fn write_file(&mut self, name: &str, data: &[u8]) -> PipelineResult<()>;

    /// Run a transcode directive. A non-zero/error result is a `TranscodeError`.
    fn exec(&mut self, args: &[String]) -> PipelineResult<()>;

    fn read_file(&mut self, name: &str) -> PipelineResult<Vec<u8>>;

    fn delete_file(&mut self, name: &str) -> PipelineResult<()>;
}

/// Fetches and initializes a codec engine. Called at most once per
/// successful load.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> PipelineResult<Box<dyn CodecEngine>>;
}

/// Load state of the shared engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Loading,
            2 => EngineState::Ready,
            _ => EngineState::Unloaded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EngineState::Unloaded => 0,
            EngineState::Loading => 1,
            EngineState::Ready => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Unloaded => "unloaded",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
        }
    }
}

/// Exclusive access to the loaded engine, released on drop.
pub type EngineLease = OwnedMutexGuard<Box<dyn CodecEngine>>;

type SharedEngine = Arc<Mutex<Box<dyn CodecEngine>>>;

/// An in-flight or finished load, awaited by every caller that needs the engine.
type EngineLoad = Shared<BoxFuture<'static, PipelineResult<SharedEngine>>>;

/// Single-flight, lazily initialized handle to a codec engine.
pub struct EngineHandle {
    loader: Arc<dyn EngineLoader>,
    load: Arc<StdMutex<Option<EngineLoad>>>,
    state: Arc<AtomicU8>,
}

impl EngineHandle {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            loader,
            load: Arc::new(StdMutex::new(None)),
            state: Arc::new(AtomicU8::new(EngineState::Unloaded.as_u8())),
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Load the engine if needed and wait for exclusive access to it.
    ///
    /// Dropping the returned future never cancels the load itself.
    pub async fn acquire(&self) -> PipelineResult<EngineLease> {
        let engine = self.current_load().await?;
        Ok(engine.lock_owned().await)
    }

    /// Join the load that is running or finished, or start one.
    fn current_load(&self) -> EngineLoad {
        let mut slot = self.load.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(load) = slot.as_ref() {
            return load.clone();
        }

        let load = self.spawn_load();
        *slot = Some(load.clone());
        load
    }

    fn spawn_load(&self) -> EngineLoad {
        self.state.store(EngineState::Loading.as_u8(), Ordering::SeqCst);

        let loader = Arc::clone(&self.loader);
        let state = Arc::clone(&self.state);
        let slot = Arc::clone(&self.load);

        let task = tokio::spawn(async move {
            info!("Loading codec engine");
            let started = Instant::now();

            let result = tokio::task::spawn_blocking(move || loader.load())
                .await
                .map_err(|e| PipelineError::EngineLoadError(format!("Engine load task failed: {}", e)))
                .and_then(|loaded| loaded);

            match result {
                Ok(engine) => {
                    state.store(EngineState::Ready.as_u8(), Ordering::SeqCst);
                    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Codec engine ready");
                    Ok(Arc::new(Mutex::new(engine)))
                }
                Err(e) => {
                    // Forget the failed load so the next caller starts a fresh one
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
                    state.store(EngineState::Unloaded.as_u8(), Ordering::SeqCst);
                    error!(error = %e, "Codec engine failed to load");
                    Err(e)
                }
            }
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| Err(PipelineError::EngineLoadError(format!("Engine load task failed: {}", e))))
        })
        .boxed()
        .shared()
    }
}

/// Reject names that would escape a flat engine filesystem.
pub(crate) fn validate_file_name(name: &str) -> PipelineResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(PipelineError::TranscodeError(format!("Invalid engine file name: {:?}", name)));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_loads_once() {
        let mut loader = FakeLoader::producing(Vec::new());
        loader.load_delay = Duration::from_millis(100);
        let loads = Arc::clone(&loader.loads);
        let handle = Arc::new(EngineHandle::new(Arc::new(loader)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.acquire().await.map(|_| ()) })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let loader = FakeLoader::producing(Vec::new());
        let handle = EngineHandle::new(Arc::new(loader));
        assert_eq!(handle.state(), EngineState::Unloaded);

        let lease = handle.acquire().await.unwrap();
        assert_eq!(handle.state(), EngineState::Ready);
        drop(lease);

        handle.acquire().await.unwrap();
        assert_eq!(handle.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_failed_load_can_be_retried() {
        let mut loader = FakeLoader::producing(Vec::new());
        loader.fail_first_loads = 1;
        let loads = Arc::clone(&loader.loads);
        let handle = EngineHandle::new(Arc::new(loader));

        let first = handle.acquire().await;
        assert!(matches!(first, Err(PipelineError::EngineLoadError(_))));
        assert_eq!(handle.state(), EngineState::Unloaded);

        assert!(handle.acquire().await.is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(handle.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let handle = EngineHandle::new(Arc::new(FakeLoader::producing(Vec::new())));
        let lease = handle.acquire().await.unwrap();

        let second = tokio::time::timeout(Duration::from_millis(50), handle.acquire()).await;
        assert!(second.is_err(), "second lease granted while the first is held");

        drop(lease);
        let third = tokio::time::timeout(Duration::from_millis(500), handle.acquire()).await;
        assert!(third.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_first_acquire_keeps_single_load() {
        let mut loader = FakeLoader::producing(Vec::new());
        loader.load_delay = Duration::from_millis(200);
        let loads = Arc::clone(&loader.loads);
        let handle = EngineHandle::new(Arc::new(loader));

        let first = tokio::time::timeout(Duration::from_millis(20), handle.acquire()).await;
        assert!(first.is_err(), "load finished before the caller gave up");
        assert_eq!(handle.state(), EngineState::Loading);

        // The load completes without anyone waiting on it
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(handle.state(), EngineState::Ready);

        handle.acquire().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_failed_load_returns_to_unloaded() {
        let mut loader = FakeLoader::producing(Vec::new());
        loader.load_delay = Duration::from_millis(100);
        loader.fail_first_loads = 1;
        let loads = Arc::clone(&loader.loads);
        let handle = EngineHandle::new(Arc::new(loader));

        let first = tokio::time::timeout(Duration::from_millis(10), handle.acquire()).await;
        assert!(first.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(handle.state(), EngineState::Unloaded);

        handle.acquire().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(handle.state(), EngineState::Ready);
    }

    #[test]
    fn test_file_name_validation() {
        assert!(validate_file_name("input.webm").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("a\\b").is_err());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(EngineState::Loading.as_str(), "loading");
        assert_eq!(serde_json::to_string(&EngineState::Ready).unwrap(), "\"ready\"");
    }
}
