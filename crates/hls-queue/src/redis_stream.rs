//! Redis Streams implementation of the job channel.
//!
//! Topics are streams, the consumer group tracks delivery, and `XACK` is the
//! commit. Unacknowledged entries stay in the group's pending list and are
//! reclaimed with `XAUTOCLAIM` once they have been idle long enough.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::queue::MessageQueue;

/// Field holding the JSON payload of an entry.
pub const PAYLOAD_FIELD: &str = "payload";
/// Field name used by older producers.
const LEGACY_PAYLOAD_FIELD: &str = "job";
/// Field holding the partition key of an entry.
pub const KEY_FIELD: &str = "key";

/// Extra time allowed on top of the requested block before a fetch is
/// treated as hung.
const FETCH_GRACE: Duration = Duration::from_secs(5);

/// When to sweep the pending list for idle entries.
///
/// A sweep that reclaims something makes the next fetch sweep again, so a
/// backlog drains one entry per fetch instead of one per interval.
#[derive(Debug)]
struct ClaimSchedule {
    interval: Duration,
    last_sweep: Option<Instant>,
}

impl ClaimSchedule {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sweep: None,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.last_sweep
            .map(|at| now.saturating_duration_since(at) >= self.interval)
            .unwrap_or(true)
    }

    fn record(&mut self, now: Instant, reclaimed: bool) {
        self.last_sweep = if reclaimed { None } else { Some(now) };
    }
}

/// Job channel backed by Redis Streams.
///
/// The multiplexed connection is cached and dropped after any transient
/// failure; the next call opens a fresh one, so the worker recovers from
/// broker restarts.
pub struct RedisStreamQueue {
    config: QueueConfig,
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    closed: AtomicBool,
    claims: Mutex<ClaimSchedule>,
}

impl RedisStreamQueue {
    /// Connect to the broker and make sure the topics exist.
    ///
    /// Fails only if the broker cannot be reached. Existing streams and
    /// groups are left untouched.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.broker_url.as_str())?;
        let broker = config.redacted_broker_url();
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(format!("{broker}: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::connection_failed(format!("{broker}: {e}")))?;
        info!("Connected to broker {}", broker);

        ensure_group(&mut conn, &config.input_topic, &config.consumer_group, "$").await?;
        if let Some(output) = &config.output_topic {
            // Start at 0 so downstream readers see every event we publish.
            ensure_group(&mut conn, output, &config.output_group, "0").await?;
        }

        info!(
            "Consumer '{}' joined group '{}' on topic '{}'",
            config.consumer_id, config.consumer_group, config.input_topic
        );

        let claims = ClaimSchedule::new(config.claim_interval);
        Ok(Self {
            config,
            client,
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
            claims: Mutex::new(claims),
        })
    }

    /// Cached connection, reconnecting if the last one was dropped.
    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let broker = self.config.redacted_broker_url();
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(format!("{broker}: {e}")))?;
        info!("Reconnected to broker {}", broker);
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the cached connection when `result` is a transient failure.
    async fn observe<T>(&self, result: QueueResult<T>) -> QueueResult<T> {
        if let Err(e) = &result {
            if e.is_transient() && self.conn.lock().await.take().is_some() {
                warn!("Dropping broker connection after error: {}", e);
            }
        }
        result
    }

    /// Take over one pending entry that has been idle past the threshold.
    async fn claim_stale(&self) -> QueueResult<Option<QueueMessage>> {
        let mut conn = self.connection().await?;

        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.input_topic)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await?;

        match reply.claimed.into_iter().next() {
            Some(entry) => {
                info!("Reclaimed pending message {} for redelivery", entry.id);
                Ok(Some(entry_to_message(entry, &self.config.input_topic, true)))
            }
            None => Ok(None),
        }
    }

    async fn read_new(&self, wait: Duration) -> QueueResult<Option<QueueMessage>> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(wait.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.input_topic)
            .arg(">"); // Only new messages
        let read = cmd.query_async::<Option<StreamReadReply>>(&mut conn);

        let reply = tokio::time::timeout(wait + FETCH_GRACE, read)
            .await
            .map_err(|_| QueueError::FetchTimeout(wait))??;

        let entry = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next();

        Ok(entry.map(|entry| entry_to_message(entry, &self.config.input_topic, false)))
    }

    async fn ack(&self, message: &QueueMessage) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.input_topic)
            .arg(&self.config.consumer_group)
            .arg(&message.id)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn append(&self, topic: &str, key: &str, payload: &[u8]) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let entry_id: String = redis::cmd("XADD")
            .arg(topic)
            .arg("*")
            .arg(KEY_FIELD)
            .arg(key)
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(entry_id)
    }
}

/// Turn a stream entry into a message.
///
/// The payload comes from `payload`, falling back to the legacy `job` field.
/// An entry with neither yields an empty payload, which the worker rejects
/// as malformed.
fn entry_to_message(entry: StreamId, topic: &str, redelivered: bool) -> QueueMessage {
    let payload = entry
        .get::<Vec<u8>>(PAYLOAD_FIELD)
        .or_else(|| entry.get::<Vec<u8>>(LEGACY_PAYLOAD_FIELD))
        .unwrap_or_default();

    QueueMessage {
        id: entry.id,
        topic: topic.to_string(),
        payload,
        redelivered,
    }
}

/// Create a consumer group (and the stream), tolerating "already exists".
///
/// Only connectivity failures are fatal; anything else is logged and the
/// first fetch will surface it.
async fn ensure_group(
    conn: &mut MultiplexedConnection,
    topic: &str,
    group: &str,
    start_id: &str,
) -> QueueResult<()> {
    let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(topic)
        .arg(group)
        .arg(start_id)
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(()) => info!("Created consumer group '{}' on topic '{}'", group, topic),
        Err(e) if e.to_string().contains("BUSYGROUP") => {
            debug!("Consumer group '{}' already exists on '{}'", group, topic);
        }
        Err(e) => {
            let err = QueueError::Redis(e);
            if err.is_transient() {
                return Err(err);
            }
            warn!("Could not create consumer group '{}' on '{}': {}", group, topic, err);
        }
    }

    Ok(())
}

#[async_trait]
impl MessageQueue for RedisStreamQueue {
    async fn fetch_next(&self, wait: Duration) -> QueueResult<Option<QueueMessage>> {
        if self.claims.lock().await.is_due(Instant::now()) {
            let claimed = self.claim_stale().await;
            let claimed = self.observe(claimed).await;
            self.claims
                .lock()
                .await
                .record(Instant::now(), matches!(claimed, Ok(Some(_))));

            match claimed {
                Ok(Some(message)) => return Ok(Some(message)),
                Ok(None) => {}
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => warn!("Failed to reclaim pending messages: {}", e),
            }
        }

        let fetched = self.read_new(wait).await;
        self.observe(fetched).await
    }

    async fn commit(&self, message: &QueueMessage) -> QueueResult<()> {
        let acked = self.ack(message).await;
        self.observe(acked).await?;
        debug!("Committed message {}", message.id);
        Ok(())
    }

    fn has_output(&self) -> bool {
        self.config.output_topic.is_some()
    }

    async fn publish(&self, key: &str, payload: &[u8]) -> QueueResult<()> {
        let topic = self
            .config
            .output_topic
            .as_deref()
            .ok_or(QueueError::NoOutputTopic)?;

        let appended = self.append(topic, key, payload).await;
        let entry_id = self.observe(appended).await?;
        debug!("Published event for key {} as {} on '{}'", key, entry_id, topic);
        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        self.closed.store(true, Ordering::Release);
        if self.conn.lock().await.take().is_some() {
            info!("Closed queue client '{}'", self.config.consumer_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use redis::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::{JoinHandle, JoinSet};

    fn entry(fields: &[(&str, &[u8])]) -> StreamId {
        StreamId {
            id: "1700000000000-0".to_string(),
            map: fields
                .iter()
                .map(|(k, v)| (k.to_string(), Value::BulkString(v.to_vec())))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_entry_payload_field() {
        let message = entry_to_message(
            entry(&[(KEY_FIELD, b"r1"), (PAYLOAD_FIELD, b"{\"requestId\":\"r1\"}")]),
            "hls:jobs",
            false,
        );
        assert_eq!(message.id, "1700000000000-0");
        assert_eq!(message.topic, "hls:jobs");
        assert_eq!(message.payload, b"{\"requestId\":\"r1\"}");
        assert!(!message.redelivered);
    }

    #[test]
    fn test_entry_legacy_job_field() {
        let message = entry_to_message(entry(&[("job", b"{}")]), "hls:jobs", true);
        assert_eq!(message.payload, b"{}");
        assert!(message.redelivered);
    }

    #[test]
    fn test_entry_payload_field_wins_over_legacy() {
        let message = entry_to_message(
            entry(&[("job", b"old"), (PAYLOAD_FIELD, b"new")]),
            "hls:jobs",
            false,
        );
        assert_eq!(message.payload, b"new");
    }

    #[test]
    fn test_entry_without_payload_is_empty() {
        let message = entry_to_message(entry(&[("other", b"x")]), "hls:jobs", false);
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_claim_schedule_cadence() {
        let start = Instant::now();
        let mut schedule = ClaimSchedule::new(Duration::from_secs(30));
        assert!(schedule.is_due(start));

        schedule.record(start, false);
        assert!(!schedule.is_due(start + Duration::from_secs(10)));
        assert!(schedule.is_due(start + Duration::from_secs(30)));
    }

    #[test]
    fn test_claim_schedule_drains_backlog() {
        let start = Instant::now();
        let mut schedule = ClaimSchedule::new(Duration::from_secs(30));

        schedule.record(start, true);
        assert!(schedule.is_due(start + Duration::from_millis(1)));

        schedule.record(start, false);
        assert!(!schedule.is_due(start + Duration::from_millis(1)));
    }

    /// Minimal RESP2 responder: enough for connect, XACK and idle fetches.
    struct FakeBroker {
        port: u16,
        task: JoinHandle<()>,
    }

    impl FakeBroker {
        async fn start(port: u16) -> Self {
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let task = tokio::spawn(async move {
                let mut clients = JoinSet::new();
                while let Ok((socket, _)) = listener.accept().await {
                    clients.spawn(answer(socket));
                }
            });
            Self { port, task }
        }

        async fn stop(self) {
            self.task.abort();
            let _ = self.task.await;
        }
    }

    async fn answer(mut socket: TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            while let Some((args, used)) = parse_command(&buf) {
                buf.drain(..used);
                if socket.write_all(reply(&args)).await.is_err() {
                    return;
                }
            }
        }
    }

    fn reply(args: &[String]) -> &'static [u8] {
        match args.first().map(|a| a.to_ascii_uppercase()).as_deref() {
            Some("PING") => b"+PONG\r\n",
            Some("XACK") => b":1\r\n",
            Some("XREADGROUP") => b"*-1\r\n",
            Some("XAUTOCLAIM") => b"*3\r\n$3\r\n0-0\r\n*0\r\n*0\r\n",
            _ => b"+OK\r\n",
        }
    }

    fn parse_command(buf: &[u8]) -> Option<(Vec<String>, usize)> {
        let (count, mut pos) = read_header(buf, 0, b'*')?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let (len, start) = read_header(buf, pos, b'$')?;
            let end = start + len;
            if buf.len() < end + 2 {
                return None;
            }
            args.push(String::from_utf8_lossy(&buf[start..end]).into_owned());
            pos = end + 2;
        }
        Some((args, pos))
    }

    fn read_header(buf: &[u8], start: usize, prefix: u8) -> Option<(usize, usize)> {
        if *buf.get(start)? != prefix {
            return None;
        }
        let line = buf[start..].windows(2).position(|w| w == b"\r\n")?;
        let n = std::str::from_utf8(&buf[start + 1..start + line]).ok()?.parse().ok()?;
        Some((n, start + line + 2))
    }

    fn config_for(port: u16) -> QueueConfig {
        QueueConfig {
            broker_url: format!("redis://127.0.0.1:{port}"),
            ..QueueConfig::default()
        }
    }

    #[tokio::test]
    async fn test_recovers_after_broker_restart() {
        let broker = FakeBroker::start(0).await;
        let port = broker.port;
        let queue = RedisStreamQueue::connect(config_for(port)).await.unwrap();
        let message = QueueMessage::new("1-0", "hls:jobs", "{}");
        queue.commit(&message).await.unwrap();

        broker.stop().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = tokio::time::timeout(Duration::from_secs(5), queue.commit(&message))
            .await
            .expect("commit hung while broker was down")
            .unwrap_err();
        assert!(err.is_transient(), "{err}");

        let _broker = FakeBroker::start(port).await;
        let mut recovered = false;
        for _ in 0..5 {
            let attempt = tokio::time::timeout(Duration::from_secs(2), queue.commit(&message)).await;
            if matches!(attempt, Ok(Ok(()))) {
                recovered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(recovered, "queue never reconnected");

        let fetched = queue.fetch_next(Duration::from_millis(10)).await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let broker = FakeBroker::start(0).await;
        let queue = RedisStreamQueue::connect(config_for(broker.port)).await.unwrap();

        queue.close().await.unwrap();
        queue.close().await.unwrap();

        let message = QueueMessage::new("1-0", "hls:jobs", "{}");
        assert!(matches!(queue.commit(&message).await, Err(QueueError::Closed)));
        broker.stop().await;
    }
}
