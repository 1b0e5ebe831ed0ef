//! Responder: the serving half of a connection.
//!
//! Reads request frames, runs a handler per request, and writes each reply
//! under the request's correlation id. Replies go out in completion order,
//! not request order.
//!
//! # Example
//!
//! ```ignore
//! use corrwire::{CorrwireError, Endpoint, Responder};
//!
//! let listener = Endpoint::parse("tcp://127.0.0.1:7000")?.bind().await?;
//! let stream = listener.accept().await?;
//!
//! Responder::builder()
//!     .max_concurrent_handlers(64)
//!     .serve(stream, |request| async move { Ok::<_, CorrwireError>(request) })
//!     .await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::Semaphore;

use crate::client::DEFAULT_READ_BUFFER_SIZE;
use crate::error::{CorrwireError, Result};
use crate::protocol::{Frame, FrameCodec, StreamReassembler, Value, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default maximum concurrent handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Boxed future for handler results.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased request handler.
trait Handler: Send + Sync + 'static {
    fn call(&self, request: Value) -> BoxFuture<'static, Result<Value>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn call(&self, request: Value) -> BoxFuture<'static, Result<Value>> {
        Box::pin(self(request))
    }
}

/// Entry point; see [`ResponderBuilder`].
pub struct Responder;

impl Responder {
    pub fn builder() -> ResponderBuilder {
        ResponderBuilder::new()
    }
}

/// Builder for serving one connection.
#[derive(Debug, Clone)]
pub struct ResponderBuilder {
    max_concurrent_handlers: usize,
    max_payload_size: u32,
    read_buffer_size: usize,
    writer_config: WriterConfig,
}

impl ResponderBuilder {
    pub fn new() -> Self {
        Self {
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer_config: WriterConfig::default(),
        }
    }

    /// Set the maximum number of concurrent handlers.
    ///
    /// When this limit is reached, new requests will be dropped with a warning.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit;
        self
    }

    /// Set the maximum payload size for requests and replies.
    ///
    /// Default: 16 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Serve requests from `stream` until the peer closes it.
    ///
    /// Returns after every started handler has finished and its reply has
    /// been flushed.
    pub async fn serve<S, F, Fut>(self, stream: S, handler: F) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let (mut reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, self.writer_config.clone());

        let handler: Arc<dyn Handler> = Arc::new(handler);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_handlers));
        let mut reassembler = StreamReassembler::with_max_payload(self.max_payload_size);
        let mut buf = vec![0u8; self.read_buffer_size.max(1)];

        let read_result = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e),
            };

            for frame in reassembler.push(&buf[..n]) {
                self.dispatch_frame(frame, &handler, &writer, &semaphore);
            }
        };

        match &read_result {
            Ok(()) => tracing::debug!("Peer closed the connection"),
            Err(e) => tracing::error!("Read loop error: {}", e),
        }

        // Handlers still running hold writer clones; the writer stops after
        // the last one finishes.
        drop(writer);
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("Writer stopped with error: {}", e),
            Err(e) => tracing::error!("Writer task panicked: {}", e),
        }

        read_result.map_err(Into::into)
    }

    /// Run the handler for one request frame in its own task.
    fn dispatch_frame(
        &self,
        frame: Frame,
        handler: &Arc<dyn Handler>,
        writer: &WriterHandle,
        semaphore: &Arc<Semaphore>,
    ) {
        let correlation_id = frame.correlation_id();

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(
                    "Handler capacity reached, dropping request {}",
                    correlation_id
                );
                return;
            }
        };

        let request = match frame.decode_value() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Undecodable request {}: {}", correlation_id, e);
                return;
            }
        };

        let handler = handler.clone();
        let writer = writer.clone();
        let max_payload_size = self.max_payload_size as usize;

        tokio::spawn(async move {
            let _permit = permit;

            let reply = match handler.call(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("Handler error for request {}: {}", correlation_id, e);
                    return;
                }
            };

            let result = send_reply(&writer, correlation_id, &reply, max_payload_size).await;

            if let Err(e) = result {
                tracing::error!("Failed to send reply {}: {}", correlation_id, e);
            }
        });
    }
}

async fn send_reply(
    writer: &WriterHandle,
    correlation_id: u16,
    reply: &Value,
    max_payload_size: usize,
) -> Result<()> {
    let payload = FrameCodec::encode_payload(reply)?;
    if payload.len() > max_payload_size {
        return Err(CorrwireError::Validation(format!(
            "reply of {} bytes exceeds maximum {}",
            payload.len(),
            max_payload_size
        )));
    }
    writer
        .send(OutboundFrame::for_payload(correlation_id, payload)?)
        .await
}

impl Default for ResponderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
