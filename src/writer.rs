//! Writer task owning the write half of a connection.
//!
//! Every sender pushes complete frames into one mpsc channel; a single task
//! drains it, so frames from concurrent requests never interleave on the
//! wire. Ready frames are batched into one vectored write.
//!
//! ```text
//! send() ─┐
//! send() ─┼─► mpsc::Sender<OutboundFrame> ─► writer task ─► stream
//! send() ─┘
//! ```
//!
//! Dropping every [`WriterHandle`] closes the channel; the task then flushes
//! and shuts down the write half.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{CorrwireError, Result};
use crate::protocol::{Header, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header.
    pub header: [u8; HEADER_SIZE],
    pub payload: Bytes,
}

impl OutboundFrame {
    #[inline]
    pub fn new(header: &Header, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
        }
    }

    /// Frame `payload` under `correlation_id`.
    pub fn for_payload(correlation_id: u16, payload: Bytes) -> Result<Self> {
        let header = Header::for_payload(correlation_id, payload.len())?;
        Ok(Self::new(&header, payload))
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Frames that may queue before `send` waits.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing frames on the writer task.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame, waiting while the channel is full.
    ///
    /// Fails with `ConnectionClosed` once the writer task has stopped.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| CorrwireError::ConnectionClosed)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// The `JoinHandle` resolves when the channel closes or a write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer).await;
        if let Err(e) = &result {
            tracing::error!("Writer task failed: {}", e);
        }
        result
    });

    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;
        batch.clear();
    }

    tracing::debug!("Writer channel closed, shutting down write half");
    writer.shutdown().await?;
    Ok(())
}

fn write_zero() -> CorrwireError {
    CorrwireError::Io(std::io::Error::new(
        std::io::ErrorKind::WriteZero,
        "write_vectored returned 0",
    ))
}

/// Write a batch of frames with scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(write_zero());
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices covering everything after the first `skip_bytes` of the batch.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        let header_end = offset + HEADER_SIZE;
        if skip_bytes < header_end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.header[start..]));
        }
        offset = header_end;

        if !frame.payload.is_empty() {
            let payload_end = offset + frame.payload.len();
            if skip_bytes < payload_end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&frame.payload[start..]));
            }
            offset = payload_end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StreamReassembler;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(id: u16, payload: &'static [u8]) -> OutboundFrame {
        OutboundFrame::for_payload(id, Bytes::from_static(payload)).unwrap()
    }

    #[test]
    fn test_outbound_frame_header() {
        let frame = frame(42, b"hello");

        assert_eq!(&frame.header[0..4], &7u32.to_be_bytes());
        assert_eq!(&frame.header[4..6], &42u16.to_be_bytes());
        assert_eq!(frame.size(), HEADER_SIZE + 5);
    }

    #[test]
    fn test_build_remaining_slices_partial_header() {
        let batch = vec![frame(42, b"hello")];

        let slices = build_remaining_slices(&batch, 4);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), HEADER_SIZE - 4);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_build_remaining_slices_mid_second_frame() {
        let batch = vec![frame(1, b"abc"), frame(2, b"defg")];

        let slices = build_remaining_slices(&batch, HEADER_SIZE + 3 + HEADER_SIZE + 1);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"efg");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|i| frame(i, b"abc")).collect();

        write_batch(&mut buf, &batch).await.unwrap();

        let written = buf.into_inner();
        assert_eq!(written.len(), 5 * (HEADER_SIZE + 3));
        assert_eq!(&written[4..6], &0u16.to_be_bytes());
        assert_eq!(&written[HEADER_SIZE + 3 + 4..HEADER_SIZE + 3 + 6], &1u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_frames_arrive_whole_and_in_order() {
        let (client, mut server) = duplex(64);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        for id in 0..20u16 {
            let payload = Bytes::from(vec![id as u8; 10]);
            handle.send(OutboundFrame::for_payload(id, payload).unwrap()).await.unwrap();
        }
        drop(handle);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        task.await.unwrap().unwrap();

        let frames = StreamReassembler::new().push(&received);
        let ids: Vec<u16> = frames.iter().map(|f| f.correlation_id()).collect();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
        assert!(frames.iter().all(|f| f.payload().len() == 10));
    }

    #[tokio::test]
    async fn test_send_after_writer_stopped() {
        let (client, server) = duplex(64);
        drop(server);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        // First write hits the closed pipe and stops the task.
        let _ = handle.send(frame(1, b"x")).await;
        assert!(task.await.unwrap().is_err());

        assert!(handle.is_closed());
        let err = handle.send(frame(2, b"y")).await.unwrap_err();
        assert!(matches!(err, CorrwireError::ConnectionClosed));
    }
}
