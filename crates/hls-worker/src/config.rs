//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use hls_media::NamingScheme;
use tracing::warn;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root under which per-request output directories are created
    pub output_dir: PathBuf,
    /// Where uploaded inputs land; only created at startup
    pub upload_dir: PathBuf,
    /// Target seconds per HLS segment
    pub segment_duration: u32,
    /// Transcoder executable name or path
    pub ffmpeg_path: String,
    /// How output names are derived
    pub naming: NamingScheme,
    /// Upper bound on a single fetch
    pub poll_timeout: Duration,
    /// Pause after a failed fetch
    pub error_backoff: Duration,
    /// Port for the Prometheus exporter; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            upload_dir: PathBuf::from("./uploads"),
            segment_duration: 10,
            ffmpeg_path: "ffmpeg".to_string(),
            naming: NamingScheme::default(),
            poll_timeout: Duration::from_secs(10),
            error_backoff: Duration::from_millis(1000),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    ///
    /// Unparseable numbers fall back to their defaults. An unknown naming
    /// scheme falls back to the default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let naming = match lookup("HLS_NAMING") {
            Some(raw) => raw.parse::<NamingScheme>().unwrap_or_else(|e| {
                warn!("{}, using {}", e, defaults.naming.as_str());
                defaults.naming
            }),
            None => defaults.naming,
        };

        Self {
            output_dir: lookup("OUTPUT_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            upload_dir: lookup("UPLOAD_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            segment_duration: lookup("HLS_SEGMENT_DURATION")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.segment_duration),
            ffmpeg_path: lookup("FFMPEG_PATH")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.ffmpeg_path),
            naming,
            poll_timeout: Duration::from_secs(
                lookup("WORKER_POLL_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            error_backoff: Duration::from_millis(
                lookup("WORKER_ERROR_BACKOFF_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            metrics_port: lookup("METRICS_PORT").and_then(|s| s.parse().ok()),
        }
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.segment_duration == 0 {
            return Err(WorkerError::config_error(
                "HLS_SEGMENT_DURATION must be greater than zero",
            ));
        }
        if self.poll_timeout.is_zero() {
            return Err(WorkerError::config_error(
                "WORKER_POLL_TIMEOUT_SECS must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.segment_duration, 10);
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.naming, NamingScheme::Timestamped);
        assert_eq!(config.poll_timeout, Duration::from_secs(10));
        assert_eq!(config.error_backoff, Duration::from_secs(1));
        assert!(config.metrics_port.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("OUTPUT_DIR", "/srv/hls"),
            ("HLS_SEGMENT_DURATION", "6"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ("HLS_NAMING", "request"),
            ("METRICS_PORT", "9464"),
        ]));
        assert_eq!(config.output_dir, PathBuf::from("/srv/hls"));
        assert_eq!(config.segment_duration, 6);
        assert_eq!(config.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.naming, NamingScheme::RequestScoped);
        assert_eq!(config.metrics_port, Some(9464));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("HLS_SEGMENT_DURATION", "ten"),
            ("HLS_NAMING", "random"),
            ("METRICS_PORT", "not-a-port"),
        ]));
        assert_eq!(config.segment_duration, 10);
        assert_eq!(config.naming, NamingScheme::Timestamped);
        assert!(config.metrics_port.is_none());
    }

    #[test]
    fn test_zero_segment_duration_rejected() {
        let config = WorkerConfig::from_lookup(lookup(&[("HLS_SEGMENT_DURATION", "0")]));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HLS_SEGMENT_DURATION"));
    }
}
