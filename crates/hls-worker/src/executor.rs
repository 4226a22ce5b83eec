//! Job executor: the consume loop.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use hls_media::Transcoder;
use hls_models::{ConversionJob, JobRequest, ModelError};
use hls_queue::{MessageQueue, QueueMessage, QueueResult};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::WorkerConfig;
use crate::error::{Disposition, WorkerError, WorkerResult};
use crate::job_manager::JobManager;
use crate::logging::JobLogger;
use crate::metrics;
use crate::publisher::CompletionPublisher;

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing arrived within the poll timeout.
    Idle,
    Committed,
    /// Left pending for redelivery.
    Withheld,
    FetchFailed,
}

/// Sequential consumer: fetch, process, commit. One job at a time.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<dyn MessageQueue>,
    manager: JobManager,
    publisher: CompletionPublisher,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn MessageQueue>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let manager = JobManager::new(transcoder, config.segment_duration, config.naming);
        let publisher = CompletionPublisher::new(queue.clone());
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            queue,
            manager,
            publisher,
            shutdown,
        }
    }

    /// Run until `shutdown` is called, then close the queue.
    ///
    /// Shutdown interrupts a pending fetch but never a running transcode;
    /// the current message is finished first.
    pub async fn run(&self) -> WorkerResult<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        info!(
            output_dir = %self.config.output_dir.display(),
            naming = self.manager.naming().as_str(),
            "Starting consume loop"
        );

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown requested, stopping consume loop");
                break;
            }

            let fetched = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                fetched = self.queue.fetch_next(self.config.poll_timeout) => fetched,
            };
            self.handle_fetch(fetched).await;
        }

        self.queue.close().await?;
        info!("Queue closed");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run a single iteration without watching for shutdown.
    pub async fn poll_once(&self) -> PollOutcome {
        let fetched = self.queue.fetch_next(self.config.poll_timeout).await;
        self.handle_fetch(fetched).await
    }

    async fn handle_fetch(&self, fetched: QueueResult<Option<QueueMessage>>) -> PollOutcome {
        match fetched {
            Ok(Some(message)) => self.handle_message(&message).await,
            Ok(None) => PollOutcome::Idle,
            Err(e) => {
                metrics::record_fetch_error();
                if e.is_transient() {
                    warn!("Fetch failed, retrying in {:?}: {}", self.config.error_backoff, e);
                } else {
                    error!("Fetch failed, retrying in {:?}: {}", self.config.error_backoff, e);
                }
                tokio::time::sleep(self.config.error_backoff).await;
                PollOutcome::FetchFailed
            }
        }
    }

    async fn handle_message(&self, message: &QueueMessage) -> PollOutcome {
        metrics::record_message_received();
        debug!(
            message_id = %message.id,
            topic = %message.topic,
            redelivered = message.redelivered,
            "Message received"
        );

        let (disposition, reason) = match self.process_message(message).await {
            Ok(()) => (Disposition::Commit, "ok"),
            Err(e) => {
                let disposition = e.disposition();
                match disposition {
                    Disposition::Commit => {
                        warn!(message_id = %message.id, "Message failed permanently: {}", e)
                    }
                    Disposition::Withhold => {
                        error!(message_id = %message.id, "Message withheld for redelivery: {}", e)
                    }
                }
                (disposition, e.kind())
            }
        };
        metrics::record_disposition(disposition, reason);

        match disposition {
            Disposition::Commit => {
                // An uncommitted message is redelivered later; processing is
                // already done, so only log.
                if let Err(e) = self.queue.commit(message).await {
                    error!(message_id = %message.id, "Failed to commit message: {}", e);
                }
                PollOutcome::Committed
            }
            Disposition::Withhold => PollOutcome::Withheld,
        }
    }

    /// Process one message up to the commit decision.
    async fn process_message(&self, message: &QueueMessage) -> WorkerResult<()> {
        let request = JobRequest::decode(&message.payload).map_err(|e| match e {
            ModelError::Malformed(e) => WorkerError::Malformed(e.to_string()),
            other => WorkerError::invalid_request(other.to_string()),
        })?;
        let output_dir = self.output_dir_for(&request)?;
        let requested_dir = output_override(&request).is_some();

        let job = ConversionJob::new(request.job_id(), request.input_path(), output_dir);
        let span = JobLogger::new(&job.id, "consume").create_span();
        self.run_job(job, requested_dir).instrument(span).await
    }

    async fn run_job(&self, mut job: ConversionJob, requested_dir: bool) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.id, "consume");
        logger.log_progress(&format!("input {}", job.input_file.display()));

        if matches!(tokio::fs::try_exists(&job.input_file).await, Ok(false)) {
            job.fail(format!("input file not found: {}", job.input_file.display()))?;
            self.finish(&job).await;
            return Err(WorkerError::InputNotFound(job.input_file));
        }

        if let Err(source) = tokio::fs::create_dir_all(&job.output_dir).await {
            // A bad client-supplied path fails the same way on every delivery.
            let permanent = requested_dir || is_path_rejected(&source);
            if permanent {
                job.fail(format!(
                    "cannot create output directory {}: {}",
                    job.output_dir.display(),
                    source
                ))?;
                self.finish(&job).await;
            }
            return Err(WorkerError::OutputDir {
                path: job.output_dir,
                source,
                permanent,
            });
        }

        let result = self.manager.convert(&mut job).await;
        if job.is_terminal() {
            self.finish(&job).await;
        }
        result
    }

    async fn finish(&self, job: &ConversionJob) {
        metrics::record_job(job.status.as_str());
        self.publisher.publish(job).await;
    }

    /// `outputPath` wins; otherwise one directory per request under the root.
    fn output_dir_for(&self, request: &JobRequest) -> WorkerResult<PathBuf> {
        if let Some(path) = output_override(request) {
            return Ok(PathBuf::from(path));
        }
        let mut components = Path::new(&request.request_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.config.output_dir.join(&request.request_id)),
            _ => Err(WorkerError::invalid_request(format!(
                "requestId cannot be used as a directory name: {}",
                request.request_id
            ))),
        }
    }
}

fn output_override(request: &JobRequest) -> Option<&str> {
    request.output_path.as_deref().filter(|p| !p.trim().is_empty())
}

/// The filesystem rejected the path itself; retrying cannot succeed.
fn is_path_rejected(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotADirectory | io::ErrorKind::AlreadyExists | io::ErrorKind::InvalidInput
    )
}
