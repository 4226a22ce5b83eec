//! Conversion of a single job.

use std::sync::Arc;

use hls_media::{is_supported_container, NamingScheme, OutputNames, TranscodeRequest, Transcoder};
use hls_models::ConversionJob;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Drives one `ConversionJob` through the transcoder.
pub struct JobManager {
    transcoder: Arc<dyn Transcoder>,
    segment_duration: u32,
    naming: NamingScheme,
}

impl JobManager {
    pub fn new(transcoder: Arc<dyn Transcoder>, segment_duration: u32, naming: NamingScheme) -> Self {
        Self {
            transcoder,
            segment_duration,
            naming,
        }
    }

    pub fn naming(&self) -> NamingScheme {
        self.naming
    }

    /// Convert the job's input into an HLS manifest plus segments.
    ///
    /// On return the job is terminal whenever the error is a content error
    /// (unsupported format, conversion failure). The output directory must
    /// already exist.
    pub async fn convert(&self, job: &mut ConversionJob) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.id, "hls_conversion");

        if !is_supported_container(&job.input_file) {
            let message = format!("unsupported input format: {}", job.input_file.display());
            logger.log_warning(&message);
            job.fail(message)?;
            return Err(WorkerError::UnsupportedFormat(job.input_file.clone()));
        }

        job.start()?;
        let names = OutputNames::resolve(
            self.naming,
            &job.input_file,
            &job.output_dir,
            job.id.as_str(),
        );
        job.set_output_file(&names.manifest)?;
        logger.log_start(&format!(
            "{} -> {}",
            job.input_file.display(),
            names.manifest.display()
        ));

        let request = TranscodeRequest {
            input: job.input_file.clone(),
            manifest: names.manifest,
            segment_pattern: names.segment_pattern,
            segment_duration: self.segment_duration,
            overwrite: self.naming == NamingScheme::RequestScoped,
        };

        match self.transcoder.transcode(&request).await {
            Ok(output) => {
                metrics::record_transcode_duration(output.elapsed.as_secs_f64());
                job.complete()?;
                logger.log_completion(&format!("took {:.2}s", output.elapsed.as_secs_f64()));
                Ok(())
            }
            Err(e) => {
                let detail = e
                    .diagnostics()
                    .filter(|d| !d.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string());
                logger.log_error("transcoder failed", Some(&detail));
                job.fail(detail.clone())?;
                Err(WorkerError::conversion_failed(detail))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use hls_media::{MediaError, MediaResult, TranscodeOutput};
    use hls_models::{JobId, JobStatus};

    /// Records every request and replies with a fixed outcome.
    struct StubTranscoder {
        fail_with: Option<String>,
        requests: Mutex<Vec<TranscodeRequest>>,
    }

    impl StubTranscoder {
        fn ok() -> Self {
            Self {
                fail_with: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(output: &str) -> Self {
            Self {
                fail_with: Some(output.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<TranscodeRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transcoder for StubTranscoder {
        async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<TranscodeOutput> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.fail_with {
                Some(output) => Err(MediaError::transcode_failed("exit status: 1", output, Some(1))),
                None => Ok(TranscodeOutput::default()),
            }
        }
    }

    fn job(input: &str) -> ConversionJob {
        ConversionJob::new(JobId::from_string("req-1"), input, "/out/req-1")
    }

    #[tokio::test]
    async fn test_successful_conversion() {
        let stub = Arc::new(StubTranscoder::ok());
        let manager = JobManager::new(stub.clone(), 6, NamingScheme::Timestamped);
        let mut job = job("/in/movie.mp4");

        manager.convert(&mut job).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.input, PathBuf::from("/in/movie.mp4"));
        assert_eq!(request.segment_duration, 6);
        assert!(!request.overwrite);
        assert_eq!(job.output_file.as_deref(), Some(request.manifest.as_path()));
        assert_eq!(request.manifest.parent(), Some(Path::new("/out/req-1")));
        assert!(request.manifest.to_string_lossy().ends_with(".m3u8"));
        assert!(request.segment_pattern.to_string_lossy().ends_with("_%03d.ts"));
    }

    #[tokio::test]
    async fn test_failed_conversion_keeps_diagnostics() {
        let stub = Arc::new(StubTranscoder::failing("bad codec"));
        let manager = JobManager::new(stub, 10, NamingScheme::Timestamped);
        let mut job = job("/in/movie.mp4");

        let err = manager.convert(&mut job).await.unwrap_err();

        assert!(matches!(err, WorkerError::ConversionFailed(_)));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("bad codec"));
        assert!(job.output_file.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_extension_skips_transcoder() {
        let stub = Arc::new(StubTranscoder::ok());
        let manager = JobManager::new(stub.clone(), 10, NamingScheme::Timestamped);
        let mut job = job("/in/clip.webm");

        let err = manager.convert(&mut job).await.unwrap_err();

        assert!(matches!(err, WorkerError::UnsupportedFormat(_)));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("unsupported input format"));
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_request_scoped_naming_is_stable_and_overwrites() {
        let stub = Arc::new(StubTranscoder::ok());
        let manager = JobManager::new(stub.clone(), 10, NamingScheme::RequestScoped);

        let mut first = job("/in/movie.MOV");
        let mut second = job("/in/movie.MOV");
        manager.convert(&mut first).await.unwrap();
        manager.convert(&mut second).await.unwrap();

        assert_eq!(first.output_file, second.output_file);
        assert!(stub.requests().iter().all(|r| r.overwrite));
    }

    #[tokio::test]
    async fn test_terminal_job_is_not_restarted() {
        let stub = Arc::new(StubTranscoder::ok());
        let manager = JobManager::new(stub.clone(), 10, NamingScheme::Timestamped);
        let mut job = job("/in/movie.mp4");
        job.fail("input file not found").unwrap();

        let err = manager.convert(&mut job).await.unwrap_err();

        assert!(matches!(err, WorkerError::Model(_)));
        assert_eq!(job.error.as_deref(), Some("input file not found"));
        assert!(stub.requests().is_empty());
    }
}
