use std::path::Path;
use std::process::Command;

use hls_media::FfmpegRunner;
use hls_queue::QueueConfig;
use hls_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    let queue_config = QueueConfig::from_env();

    println!(
        "worker-selfcheck: starting with output_dir={}",
        config.output_dir.display()
    );
    config.validate()?;
    ensure_dir(&config.output_dir).await?;
    ensure_ffmpeg(&config.ffmpeg_path)?;
    ensure_broker(&queue_config.broker_url).await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
    Ok(())
}

fn ensure_ffmpeg(binary: &str) -> anyhow::Result<()> {
    let runner = FfmpegRunner::new(binary);
    let resolved = runner
        .resolve()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", runner.binary(), e))?;

    let output = Command::new(&resolved)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not runnable: {}", resolved.display(), e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            resolved.display(),
            output.status
        ));
    }
    println!("worker-selfcheck: ffmpeg at {}", resolved.display());
    Ok(())
}

async fn ensure_broker(url: &str) -> anyhow::Result<()> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    anyhow::ensure!(pong == "PONG", "unexpected PING reply: {}", pong);
    Ok(())
}
