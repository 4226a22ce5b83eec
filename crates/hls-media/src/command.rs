//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path (always the final positional argument)
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: false,
        }
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Overwrite existing output files.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set H.264 profile.
    pub fn profile(self, profile: impl Into<String>) -> Self {
        self.output_arg("-profile:v").output_arg(profile)
    }

    /// Set H.264 level.
    pub fn level(self, level: impl Into<String>) -> Self {
        self.output_arg("-level").output_arg(level)
    }

    /// Index of the first segment.
    pub fn start_number(self, n: u32) -> Self {
        self.output_arg("-start_number").output_arg(n.to_string())
    }

    /// Target segment duration in seconds.
    pub fn hls_time(self, seconds: u32) -> Self {
        self.output_arg("-hls_time").output_arg(seconds.to_string())
    }

    /// Maximum playlist entries; 0 keeps every segment.
    pub fn hls_list_size(self, size: u32) -> Self {
        self.output_arg("-hls_list_size").output_arg(size.to_string())
    }

    /// Set output format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Segment filename pattern.
    pub fn hls_segment_filename(self, pattern: impl AsRef<Path>) -> Self {
        let pattern = pattern.as_ref().to_string_lossy().into_owned();
        self.output_arg("-hls_segment_filename").output_arg(pattern)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Captured result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Combined stdout followed by stderr
    pub diagnostics: String,
    pub elapsed: Duration,
}

/// Runs FFmpeg (or a compatible executable) to completion.
///
/// A started process is never interrupted: there is no cancellation or
/// timeout, the call returns when the child exits.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: String,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRunner {
    /// Create a runner for the given executable name or path.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Resolve the executable via `PATH` (or check it directly if it is a path).
    pub fn resolve(&self) -> MediaResult<PathBuf> {
        which::which(&self.binary).map_err(|_| MediaError::TranscoderNotFound(self.binary.clone()))
    }

    /// Run an FFmpeg command and capture its diagnostics.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<RunOutput> {
        let binary = self.resolve()?;
        let args = cmd.build_args();
        debug!("Running transcoder: {} {}", binary.display(), args.join(" "));

        let started = Instant::now();
        let output = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(MediaError::LaunchFailed)?;
        let elapsed = started.elapsed();

        let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            return Ok(RunOutput {
                diagnostics,
                elapsed,
            });
        }

        warn!(
            exit_code = ?output.status.code(),
            "Transcoder exited with non-zero status after {:.1}s",
            elapsed.as_secs_f64()
        );
        Err(MediaError::transcode_failed(
            output.status.to_string(),
            diagnostics.trim_end(),
            output.status.code(),
        ))
    }
}
