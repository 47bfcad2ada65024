//! # FFmpeg Codec Engine
//!
//! Default [`CodecEngine`] backed by an `ffmpeg` executable. The engine's
//! filesystem is a private temporary directory that lives as long as the
//! engine does; ffmpeg runs with that directory as its working directory so
//! directives only ever mention bare file names.

use crate::audio::engine::{validate_file_name, CodecEngine, EngineLoader};
use crate::audio::error::{PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;
use tracing::{debug, info};

/// Arguments prepended to every directive.
const BASE_ARGS: [&str; 5] = ["-hide_banner", "-loglevel", "error", "-y", "-nostdin"];

/// Locates and initializes the ffmpeg engine.
#[derive(Debug, Clone)]
pub struct FfmpegLoader {
    binary: PathBuf,
    work_dir: Option<PathBuf>,
}

impl FfmpegLoader {
    /// `binary` may be a bare name resolved through `PATH` or an absolute path.
    /// Scratch directories are created under `work_dir`, or the system
    /// temporary directory when `None`.
    pub fn new(binary: impl Into<PathBuf>, work_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir,
        }
    }

    fn probe(&self, args: &[&str]) -> PipelineResult<Output> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                PipelineError::EngineLoadError(format!("Failed to run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            return Err(PipelineError::EngineLoadError(format!(
                "{} {} exited with {}",
                self.binary.display(),
                args.join(" "),
                output.status
            )));
        }
        Ok(output)
    }

    fn scratch_dir(&self) -> PipelineResult<TempDir> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("voice-note-engine-");
            builder
        };
        let created = match &self.work_dir {
            Some(dir) => std::fs::create_dir_all(dir).and_then(|_| builder.tempdir_in(dir)),
            None => builder.tempdir(),
        };
        created.map_err(|e| PipelineError::EngineLoadError(format!("Failed to create engine workspace: {}", e)))
    }
}

impl EngineLoader for FfmpegLoader {
    fn load(&self) -> PipelineResult<Box<dyn CodecEngine>> {
        let version = self.probe(&["-version"])?;
        let banner = String::from_utf8_lossy(&version.stdout);
        let first_line = banner.lines().next().unwrap_or("unknown version").to_string();

        let encoders = self.probe(&["-hide_banner", "-encoders"])?;
        if !String::from_utf8_lossy(&encoders.stdout).contains("libopus") {
            return Err(PipelineError::EngineLoadError(format!(
                "{} was built without the libopus encoder",
                self.binary.display()
            )));
        }

        let scratch = self.scratch_dir()?;
        info!(
            binary = %self.binary.display(),
            version = %first_line,
            workspace = %scratch.path().display(),
            "FFmpeg engine initialized"
        );

        Ok(Box::new(FfmpegEngine::new(self.binary.clone(), scratch)))
    }
}

/// A loaded ffmpeg engine and its private workspace.
pub struct FfmpegEngine {
    binary: PathBuf,
    scratch: TempDir,
}

impl FfmpegEngine {
    pub(crate) fn new(binary: PathBuf, scratch: TempDir) -> Self {
        Self { binary, scratch }
    }

    pub fn workspace(&self) -> &Path {
        self.scratch.path()
    }

    fn path_of(&self, name: &str) -> PipelineResult<PathBuf> {
        validate_file_name(name)?;
        Ok(self.scratch.path().join(name))
    }
}

impl CodecEngine for FfmpegEngine {
    fn write_file(&mut self, name: &str, data: &[u8]) -> PipelineResult<()> {
        let path = self.path_of(name)?;
        std::fs::write(&path, data)
            .map_err(|e| PipelineError::TranscodeError(format!("Failed to write {}: {}", name, e)))
    }

    fn exec(&mut self, args: &[String]) -> PipelineResult<()> {
        debug!(args = ?args, "Running ffmpeg");
        let output = Command::new(&self.binary)
            .current_dir(self.scratch.path())
            .args(BASE_ARGS)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PipelineError::TranscodeError(format!("Failed to spawn ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::TranscodeError(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn read_file(&mut self, name: &str) -> PipelineResult<Vec<u8>> {
        let path = self.path_of(name)?;
        std::fs::read(&path).map_err(|e| PipelineError::TranscodeError(format!("Failed to read {}: {}", name, e)))
    }

    fn delete_file(&mut self, name: &str) -> PipelineResult<()> {
        let path = self.path_of(name)?;
        std::fs::remove_file(&path)
            .map_err(|e| PipelineError::TranscodeError(format!("Failed to delete {}: {}", name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(binary: &str) -> FfmpegEngine {
        FfmpegEngine::new(PathBuf::from(binary), tempfile::tempdir().unwrap())
    }

    #[test]
    fn test_missing_binary_is_engine_load_error() {
        let loader = FfmpegLoader::new("/nonexistent/ffmpeg-binary", None);
        let result = loader.load();
        assert!(matches!(result, Err(PipelineError::EngineLoadError(_))));
    }

    #[test]
    fn test_workspace_file_lifecycle() {
        let mut engine = engine_with("ffmpeg");
        engine.write_file("input.wav", b"payload").unwrap();
        assert!(engine.workspace().join("input.wav").exists());
        assert_eq!(engine.read_file("input.wav").unwrap(), b"payload");

        engine.delete_file("input.wav").unwrap();
        assert!(!engine.workspace().join("input.wav").exists());
        assert!(engine.delete_file("input.wav").is_err());
    }

    #[test]
    fn test_workspace_rejects_path_escape() {
        let mut engine = engine_with("ffmpeg");
        assert!(engine.write_file("../escape.wav", b"x").is_err());
        assert!(engine.read_file("/etc/hostname").is_err());
    }

    #[test]
    fn test_workspace_removed_with_engine() {
        let engine = engine_with("ffmpeg");
        let dir = engine.workspace().to_path_buf();
        assert!(dir.exists());
        drop(engine);
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_exec_is_transcode_error() {
        let mut engine = engine_with("false");
        let result = engine.exec(&["-i".to_string(), "input.wav".to_string()]);
        assert!(matches!(result, Err(PipelineError::TranscodeError(_))));
    }

    #[test]
    #[ignore = "requires ffmpeg with libopus on PATH"]
    fn test_real_ffmpeg_loads() {
        let loader = FfmpegLoader::new("ffmpeg", None);
        assert!(loader.load().is_ok());
    }
}
