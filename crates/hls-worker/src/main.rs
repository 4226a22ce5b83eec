//! HLS conversion worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hls_media::{FfmpegRunner, FfmpegTranscoder};
use hls_queue::{QueueConfig, RedisStreamQueue};
use hls_worker::{metrics, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hls=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    // TLS for rediss:// broker URLs
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting hls-worker");

    let config = WorkerConfig::from_env();
    let queue_config = QueueConfig::from_env();
    info!("Worker config: {:?}", config);
    info!("Queue config: {:?}", queue_config);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    for dir in [&config.output_dir, &config.upload_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!("Failed to create directory {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    }

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Metrics exporter listening on port {}", port),
            Err(e) => {
                error!("Failed to start metrics exporter: {}", e);
                std::process::exit(1);
            }
        }
    }

    let queue = match RedisStreamQueue::connect(queue_config).await {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to connect to queue: {}", e);
            std::process::exit(1);
        }
    };

    let transcoder = FfmpegTranscoder::new(FfmpegRunner::new(config.ffmpeg_path.clone()));
    if let Err(e) = transcoder.runner().resolve() {
        warn!("{}; conversions will fail until it is installed", e);
    }

    let executor = Arc::new(JobExecutor::new(
        config,
        Arc::new(queue),
        Arc::new(transcoder),
    ));

    let signal_executor = executor.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("hls-worker stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal, finishing current message");
}
