//! Client builder and connection runtime.
//!
//! The [`ClientBuilder`] collects configuration and attaches a [`Client`] to
//! a connected stream. The client then runs two tasks:
//! 1. Writer task: drains queued frames onto the write half
//! 2. Read loop: reassembles frames and settles pending requests
//!
//! # Example
//!
//! ```ignore
//! use corrwire::{Client, Endpoint};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> corrwire::Result<()> {
//!     let endpoint = Endpoint::parse("tcp://127.0.0.1:7000")?;
//!     let client = Client::builder()
//!         .request_timeout(std::time::Duration::from_millis(500))
//!         .connect_endpoint(&endpoint)
//!         .await?;
//!
//!     let reply = client.send(&json!({"a": 1, "b": "x"})).await?;
//!     println!("{reply}");
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;

use crate::codec::{DecodeOptions, ValueCodec};
use crate::correlation::{CorrelationTable, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{CorrwireError, Result};
use crate::protocol::{FrameCodec, StreamReassembler, Struct, Value, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::transport::Endpoint;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Default read buffer size (64 KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default time `disconnect` waits for queued frames to flush.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Client settings.
///
/// Deserializes from camelCase JSON; missing fields keep their defaults:
///
/// ```
/// use corrwire::ClientConfig;
///
/// let config = ClientConfig::from_json(r#"{"requestTimeoutMs": 250}"#).unwrap();
/// assert_eq!(config.request_timeout.as_millis(), 250);
/// assert_eq!(config.channel_capacity, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// How long a request waits for its response. Default: 1000 ms
    #[serde(rename = "requestTimeoutMs", with = "duration_ms")]
    pub request_timeout: Duration,
    /// Largest payload sent or accepted. Default: 16 MiB
    pub max_payload_size: u32,
    /// Writer queue depth. Default: 1024
    pub channel_capacity: usize,
    /// Bytes requested per socket read. Default: 64 KiB
    pub read_buffer_size: usize,
    /// How long `disconnect` waits for the writer to flush. Default: 1000 ms
    #[serde(rename = "flushTimeoutMs", with = "duration_ms")]
    pub flush_timeout: Duration,
    /// Rendering used by [`Client::send_object`].
    pub decode: DecodeOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            decode: DecodeOptions::standard(),
        }
    }
}

impl ClientConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Builder for configuring and connecting a client.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting at once.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-request timeout.
    ///
    /// Default: 1000 ms
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the maximum payload size in either direction.
    ///
    /// Default: 16 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set how long `disconnect` waits for queued frames to flush.
    ///
    /// Default: 1000 ms
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.flush_timeout = timeout;
        self
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.config.decode = options;
        self
    }

    /// Attach to a connected stream and start the writer task and read loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<S>(self, stream: S) -> Client
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Client::start(stream, self.config)
    }

    /// Connect to `endpoint`, then attach as [`ClientBuilder::connect`] does.
    pub async fn connect_endpoint(self, endpoint: &Endpoint) -> Result<Client> {
        let stream = endpoint.connect().await?;
        Ok(self.connect(stream))
    }
}

/// A connected client.
///
/// `send` takes `&self`; share one client between tasks with `Arc`.
pub struct Client {
    config: ClientConfig,
    table: CorrelationTable,
    /// `None` after `disconnect`.
    writer: Mutex<Option<WriterHandle>>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
    read_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Attach to `stream` with default settings.
    pub fn connect<S>(stream: S) -> Client
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        ClientBuilder::new().connect(stream)
    }

    fn start<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);

        let (writer, writer_task) = spawn_writer_task(
            write_half,
            WriterConfig {
                channel_capacity: config.channel_capacity,
            },
        );

        let table = CorrelationTable::new();
        let closed = Arc::new(AtomicBool::new(false));

        let read_task = tokio::spawn({
            let table = table.clone();
            let closed = closed.clone();
            let max_payload_size = config.max_payload_size;
            let read_buffer_size = config.read_buffer_size;
            async move {
                match Self::read_loop(reader, &table, max_payload_size, read_buffer_size).await {
                    Ok(()) => tracing::debug!("Peer closed the connection"),
                    Err(e) => tracing::error!("Read loop error: {}", e),
                }
                closed.store(true, Ordering::SeqCst);
                let failed = table.fail_all();
                if failed > 0 {
                    tracing::debug!("Failed {} pending requests on close", failed);
                }
            }
        });

        tracing::debug!("Client connected");

        Client {
            config,
            table,
            writer: Mutex::new(Some(writer)),
            writer_task: Mutex::new(Some(writer_task)),
            read_task,
            closed,
        }
    }

    /// Read bytes, reassemble frames, and settle the requests they answer.
    async fn read_loop<R: AsyncRead + Unpin>(
        mut reader: R,
        table: &CorrelationTable,
        max_payload_size: u32,
        read_buffer_size: usize,
    ) -> Result<()> {
        let mut reassembler = StreamReassembler::with_max_payload(max_payload_size);
        let mut buf = vec![0u8; read_buffer_size.max(1)];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }

            reassembler.on_bytes_received(&buf[..n], |frame| {
                table.dispatch(frame.correlation_id(), frame.payload);
            });
        }
    }

    fn writer(&self) -> Result<WriterHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CorrwireError::ConnectionClosed);
        }
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(CorrwireError::ConnectionClosed)
    }

    /// Send a native value and wait for the reply, converted back to native.
    ///
    /// The request must serialize to a map. Conversion and validation errors
    /// surface before anything is written.
    pub async fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<serde_json::Value> {
        let request = ValueCodec::to_struct(value)?;
        let response = self.send_wire(request).await?;
        ValueCodec::from_wire(&response)
    }

    /// Typed variant of [`Client::send`].
    pub async fn call<T, R>(&self, value: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = ValueCodec::to_struct(value)?;
        let response = self.send_wire(request).await?;
        ValueCodec::from_wire_as(&response)
    }

    /// Like [`Client::send`], rendering the reply in schema-object form with
    /// the configured [`DecodeOptions`].
    pub async fn send_object<T: Serialize + ?Sized>(&self, value: &T) -> Result<serde_json::Value> {
        let request = ValueCodec::to_struct(value)?;
        let response = self.send_wire(request).await?;
        Ok(ValueCodec::to_object(&response, &self.config.decode))
    }

    /// Send a wire struct and wait for the wire reply.
    pub async fn send_wire(&self, request: Struct) -> Result<Value> {
        let payload = FrameCodec::encode_payload(&Value::Struct(request))?;
        if payload.len() > self.config.max_payload_size as usize {
            return Err(CorrwireError::Validation(format!(
                "payload of {} bytes exceeds maximum {}",
                payload.len(),
                self.config.max_payload_size
            )));
        }

        let writer = self.writer()?;
        let waiter = self.table.allocate(self.config.request_timeout)?;
        // The read loop may have closed after the writer check; its fail_all
        // would have missed this entry.
        if self.closed.load(Ordering::SeqCst) {
            return Err(CorrwireError::ConnectionClosed);
        }

        let frame = OutboundFrame::for_payload(waiter.correlation_id(), payload)?;
        writer.send(frame).await?;
        drop(writer);

        let bytes = waiter.wait().await?;
        FrameCodec::decode_payload(&bytes)
    }

    /// Number of requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.table.in_flight()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether the connection is closed, locally or by the peer.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fail every pending request with `ConnectionClosed`, then flush
    /// queued frames and close the connection.
    ///
    /// A writer that cannot flush within the configured flush timeout (the
    /// peer stopped reading) is aborted. Calling it again is a no-op.
    pub async fn disconnect(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.read_task.abort();
        let failed = self.table.fail_all();

        let writer_task = self.writer_task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut task) = writer_task {
            match tokio::time::timeout(self.config.flush_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::debug!("Writer stopped with error: {}", e),
                Ok(Err(e)) => tracing::error!("Writer task panicked: {}", e),
                Err(_) => {
                    tracing::warn!(
                        "Writer did not flush within {:?}, aborting",
                        self.config.flush_timeout
                    );
                    task.abort();
                }
            }
        }

        tracing::debug!("Client disconnected, {} pending requests failed", failed);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.read_task.abort();
        self.table.fail_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::protocol::{build_frame, MAX_NESTING_DEPTH};
    use serde_json::json;
    use tokio::io::{duplex, AsyncWriteExt};

    /// `levels` single-element arrays wrapped around `null`.
    fn nested_json(levels: usize) -> serde_json::Value {
        let mut value = json!(null);
        for _ in 0..levels {
            value = json!([value]);
        }
        value
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder()
            .request_timeout(Duration::from_millis(50))
            .max_payload_size(1024)
            .channel_capacity(8)
            .read_buffer_size(512);

        assert_eq!(builder.config.request_timeout, Duration::from_millis(50));
        assert_eq!(builder.config.max_payload_size, 1024);
        assert_eq!(builder.config.channel_capacity, 8);
        assert_eq!(builder.config.read_buffer_size, 512);
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_millis(1000));
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.flush_timeout, DEFAULT_FLUSH_TIMEOUT);
        assert_eq!(config.decode, DecodeOptions::standard());
    }

    #[test]
    fn test_config_from_json() {
        let config = ClientConfig::from_json(
            r#"{"requestTimeoutMs": 20, "maxPayloadSize": 4096, "decode": {"includeDefaults": true}}"#,
        )
        .unwrap();

        assert_eq!(config.request_timeout, Duration::from_millis(20));
        assert_eq!(config.max_payload_size, 4096);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.decode.include_defaults);
        assert!(!config.decode.enums_as_string);
    }

    #[test]
    fn test_config_from_bad_json() {
        let err = ClientConfig::from_json(r#"{"requestTimeoutMs": "soon"}"#).unwrap_err();
        assert!(matches!(err, CorrwireError::Json(_)));
    }

    #[tokio::test]
    async fn test_non_map_request_sends_nothing() {
        let (ours, mut theirs) = duplex(1024);
        let client = Client::connect(ours);

        let err = client.send(&42).await.unwrap_err();
        assert!(matches!(err, CorrwireError::Validation(_)));
        assert_eq!(client.in_flight(), 0);

        client.disconnect().await;
        let mut received = Vec::new();
        theirs.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let (ours, _theirs) = duplex(1024);
        let client = Client::builder().max_payload_size(16).connect(ours);

        let err = client
            .send(&serde_json::json!({"text": "far more than sixteen bytes"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CorrwireError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reply_settles_request() {
        let (ours, mut theirs) = duplex(4096);
        let client = Client::connect(ours);

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = theirs.read(&mut buf).await.unwrap();
            let frames = StreamReassembler::new().push(&buf[..n]);
            let request = &frames[0];

            // Echo the payload back under the request's id.
            let reply = build_frame(request.correlation_id(), request.payload()).unwrap();
            theirs.write_all(&reply).await.unwrap();
            theirs
        });

        let reply = client.send(&serde_json::json!({"k": "v"})).await.unwrap();
        assert_eq!(reply, serde_json::json!({"k": "v"}));
        assert_eq!(client.in_flight(), 0);
        drop(peer.await.unwrap());
    }

    #[tokio::test]
    async fn test_too_deep_request_sends_nothing() {
        let (ours, mut theirs) = duplex(64 * 1024);
        let client = Client::connect(ours);

        // The root struct is level 0, so this puts the innermost null one
        // level past the limit.
        let request = json!({"deep": nested_json(MAX_NESTING_DEPTH)});
        let err = client.send(&request).await.unwrap_err();
        assert!(matches!(err, CorrwireError::Validation(_)));
        assert_eq!(client.in_flight(), 0);

        client.disconnect().await;
        let mut received = Vec::new();
        theirs.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_too_deep_reply_is_rejected() {
        let (ours, mut theirs) = duplex(64 * 1024);
        let client = Client::connect(ours);

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = theirs.read(&mut buf).await.unwrap();
            let request = StreamReassembler::new().push(&buf[..n]).remove(0);

            let mut reply = Value::Null;
            for _ in 0..=MAX_NESTING_DEPTH {
                reply = Value::from(vec![reply]);
            }
            let payload = MsgPackCodec::encode(&reply).unwrap();
            let frame = build_frame(request.correlation_id(), &payload).unwrap();
            theirs.write_all(&frame).await.unwrap();
            theirs
        });

        let err = client.send(&json!({"k": "v"})).await.unwrap_err();
        assert!(matches!(err, CorrwireError::Validation(_)));
        drop(peer.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_with_stalled_peer() {
        // The peer never reads, so the writer blocks once the pipe is full.
        let (ours, _theirs) = duplex(16);
        let client = Arc::new(
            Client::builder()
                .request_timeout(Duration::from_secs(30))
                .flush_timeout(Duration::from_millis(100))
                .connect(ours),
        );

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.send(&json!({"text": "well over sixteen bytes"})).await }
        });
        while client.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let finished = tokio::time::timeout(Duration::from_secs(5), client.disconnect()).await;
        assert!(finished.is_ok());

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, CorrwireError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_send_after_disconnect() {
        let (ours, _theirs) = duplex(1024);
        let client = Client::connect(ours);
        client.disconnect().await;
        client.disconnect().await;

        let err = client.send(&serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, CorrwireError::ConnectionClosed));
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_peer_close_fails_pending() {
        let (ours, theirs) = duplex(1024);
        let client = Arc::new(Client::builder().request_timeout(Duration::from_secs(30)).connect(ours));

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.send(&serde_json::json!({"x": 1})).await }
        });

        while client.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        drop(theirs);

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, CorrwireError::ConnectionClosed));
    }
}
