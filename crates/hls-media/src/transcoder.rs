//! Transcoder capability.
//!
//! The worker only needs "segment this input into an HLS manifest"; the
//! trait keeps the process invocation out of the job logic so tests can
//! substitute a deterministic stub.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Compatibility profile passed to the encoder.
pub const HLS_PROFILE: &str = "baseline";
/// Compatibility level passed to the encoder.
pub const HLS_LEVEL: &str = "3.0";

/// Parameters for one conversion.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub manifest: PathBuf,
    pub segment_pattern: PathBuf,
    /// Seconds per segment
    pub segment_duration: u32,
    pub overwrite: bool,
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, Default)]
pub struct TranscodeOutput {
    pub diagnostics: String,
    pub elapsed: Duration,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run one conversion to completion.
    ///
    /// A non-zero exit is reported as `MediaError::TranscodeFailed` with the
    /// combined output as diagnostics.
    async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<TranscodeOutput>;
}

/// Transcoder backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    /// Fixed HLS argument template.
    pub fn hls_command(request: &TranscodeRequest) -> FfmpegCommand {
        FfmpegCommand::new(&request.input, &request.manifest)
            .overwrite(request.overwrite)
            .profile(HLS_PROFILE)
            .level(HLS_LEVEL)
            .start_number(0)
            .hls_time(request.segment_duration)
            .hls_list_size(0)
            .format("hls")
            .hls_segment_filename(&request.segment_pattern)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<TranscodeOutput> {
        let cmd = Self::hls_command(request);
        info!(
            input = %request.input.display(),
            manifest = %request.manifest.display(),
            "Starting HLS conversion"
        );

        let output = self.runner.run(&cmd).await?;
        Ok(TranscodeOutput {
            diagnostics: output.diagnostics,
            elapsed: output.elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;

    fn request(dir: &std::path::Path) -> TranscodeRequest {
        TranscodeRequest {
            input: PathBuf::from("/tmp/in.mp4"),
            manifest: dir.join("tok.m3u8"),
            segment_pattern: dir.join("tok_%03d.ts"),
            segment_duration: 10,
            overwrite: false,
        }
    }

    #[test]
    fn test_hls_argument_template() {
        let req = request(std::path::Path::new("/out/r1"));
        let args = FfmpegTranscoder::hls_command(&req).build_args();

        let expected: Vec<String> = [
            "-i",
            "/tmp/in.mp4",
            "-profile:v",
            "baseline",
            "-level",
            "3.0",
            "-start_number",
            "0",
            "-hls_time",
            "10",
            "-hls_list_size",
            "0",
            "-f",
            "hls",
            "-hls_segment_filename",
            "/out/r1/tok_%03d.ts",
            "/out/r1/tok.m3u8",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_overwrite_adds_flag() {
        let mut req = request(std::path::Path::new("/out"));
        req.overwrite = true;
        let args = FfmpegTranscoder::hls_command(&req).build_args();
        assert_eq!(args[0], "-y");
    }

    #[cfg(unix)]
    fn write_script(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_captures_combined_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo starting\necho 'bad codec' >&2\nexit 1");
        let transcoder = FfmpegTranscoder::new(FfmpegRunner::new(script));

        let err = transcoder.transcode(&request(dir.path())).await.unwrap_err();
        match &err {
            MediaError::TranscodeFailed {
                output, exit_code, ..
            } => {
                assert_eq!(*exit_code, Some(1));
                assert!(output.contains("starting"));
                assert!(output.contains("bad codec"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("bad codec"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_passes_manifest_last() {
        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("args.txt");
        let script = write_script(
            dir.path(),
            &format!("for a in \"$@\"; do echo \"$a\"; done > '{}'\nexit 0", args_file.display()),
        );
        let transcoder = FfmpegTranscoder::new(FfmpegRunner::new(script));

        let req = request(dir.path());
        transcoder.transcode(&req).await.unwrap();

        let recorded = std::fs::read_to_string(&args_file).unwrap();
        let lines: Vec<&str> = recorded.lines().collect();
        assert_eq!(lines.first(), Some(&"-i"));
        assert_eq!(lines.last().copied(), Some(req.manifest.to_str().unwrap()));
    }
}
