//! FFmpeg CLI wrapper for HLS segmenting.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building for the HLS muxer
//! - A runner that captures combined stdout/stderr diagnostics
//! - The `Transcoder` capability used by the worker (and stubbed in tests)
//! - Output naming for manifests and segments

pub mod command;
pub mod error;
pub mod format;
pub mod naming;
pub mod transcoder;

pub use command::{FfmpegCommand, FfmpegRunner, RunOutput};
pub use error::{MediaError, MediaResult};
pub use format::{is_supported_container, SUPPORTED_CONTAINERS};
pub use naming::{NameEncoder, NamingScheme, OutputNames};
pub use transcoder::{FfmpegTranscoder, TranscodeOutput, TranscodeRequest, Transcoder};
