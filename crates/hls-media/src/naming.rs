//! Output naming for manifests and segment files.
//!
//! A token is the hex SHA-256 digest of `<basename>_<discriminator>`, where
//! the basename is the input file name without its extension. The manifest
//! is `<token>.m3u8` and segments follow `<token>_%03d.ts`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::MediaError;

/// How the discriminator for a job's token is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingScheme {
    /// High-resolution timestamp taken when naming is resolved. Every
    /// invocation yields a fresh name, including redeliveries.
    #[default]
    Timestamped,
    /// The request id. Redeliveries of the same request reuse the name.
    RequestScoped,
}

impl NamingScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamingScheme::Timestamped => "timestamp",
            NamingScheme::RequestScoped => "request",
        }
    }
}

impl FromStr for NamingScheme {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" | "timestamped" => Ok(NamingScheme::Timestamped),
            "request" | "request_id" => Ok(NamingScheme::RequestScoped),
            other => Err(MediaError::InvalidNamingScheme(other.to_string())),
        }
    }
}

/// Stateless token encoder.
pub struct NameEncoder;

impl NameEncoder {
    /// Digest `<base_name>_<discriminator>` into a 64-char hex token.
    pub fn encode(base_name: &str, discriminator: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(base_name.as_bytes());
        hasher.update(b"_");
        hasher.update(discriminator.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Encode using a nanosecond timestamp as discriminator.
    pub fn encode_at(base_name: &str, at: DateTime<Utc>) -> String {
        // Nanos overflow i64 after 2262; fall back to micros with a zero pad.
        let nanos = at
            .timestamp_nanos_opt()
            .map(i128::from)
            .unwrap_or_else(|| i128::from(at.timestamp_micros()) * 1000);
        Self::encode(base_name, &nanos.to_string())
    }

    /// Input file name without its extension.
    pub fn base_name(input: &Path) -> String {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Resolved output locations for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    pub token: String,
    pub manifest: PathBuf,
    /// printf-style pattern handed to the transcoder
    pub segment_pattern: PathBuf,
}

impl OutputNames {
    /// Resolve names for `input` inside `output_dir`.
    pub fn resolve(
        scheme: NamingScheme,
        input: &Path,
        output_dir: &Path,
        request_id: &str,
    ) -> Self {
        let base = NameEncoder::base_name(input);
        let token = match scheme {
            NamingScheme::Timestamped => NameEncoder::encode_at(&base, Utc::now()),
            NamingScheme::RequestScoped => NameEncoder::encode(&base, request_id),
        };
        Self::from_token(token, output_dir)
    }

    pub fn from_token(token: String, output_dir: &Path) -> Self {
        let manifest = output_dir.join(format!("{token}.m3u8"));
        let segment_pattern = output_dir.join(format!("{token}_%03d.ts"));
        Self {
            token,
            manifest,
            segment_pattern,
        }
    }

    /// File name the transcoder will write for segment `index`.
    pub fn segment_file_name(&self, index: u32) -> String {
        format!("{}_{:03}.ts", self.token, index)
    }
}
