//! Stream reassembly: arbitrarily chunked bytes in, whole frames out.
//!
//! Uses `bytes::BytesMut` so frame payloads are split off the buffer
//! without copying. Incomplete trailing bytes stay buffered until the next
//! delivery completes them.
//!
//! # Example
//!
//! ```
//! use corrwire::protocol::{build_frame, StreamReassembler};
//!
//! let bytes = build_frame(7, b"hello").unwrap();
//! let mut reassembler = StreamReassembler::new();
//!
//! assert!(reassembler.push(&bytes[..3]).is_empty());
//! let frames = reassembler.push(&bytes[3..]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].correlation_id(), 7);
//! ```

use bytes::{Buf, BytesMut};

use super::frame::{Frame, FrameCodec};
use super::wire_format::{DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};

/// Default initial buffer capacity (64 KB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Per-connection buffer turning byte deliveries into frame deliveries.
pub struct StreamReassembler {
    /// Bytes received but not yet part of a complete frame.
    buffer: BytesMut,
    /// Maximum allowed payload size.
    max_payload_size: u32,
    /// Bytes thrown away after malformed headers.
    discarded: u64,
}

impl StreamReassembler {
    /// Create a reassembler with default settings.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a reassembler with a custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY),
            max_payload_size,
            discarded: 0,
        }
    }

    /// Append `chunk` and dispatch every frame that is now complete.
    ///
    /// Frames are handed to `dispatch` in stream order. A trailing partial
    /// frame stays buffered. A malformed header aborts the drain and drops
    /// everything buffered from that header on; frames dispatched before it
    /// are unaffected.
    ///
    /// Returns the number of frames dispatched.
    pub fn on_bytes_received<F>(&mut self, chunk: &[u8], mut dispatch: F) -> usize
    where
        F: FnMut(Frame),
    {
        self.buffer.extend_from_slice(chunk);

        let mut dispatched = 0;
        loop {
            match FrameCodec::frame_boundary(&self.buffer, self.max_payload_size) {
                Ok(Some((header, total))) => {
                    let mut frame_bytes = self.buffer.split_to(total);
                    frame_bytes.advance(HEADER_SIZE);
                    dispatch(Frame::new(header, frame_bytes.freeze()));
                    dispatched += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    let dropped = self.buffer.len();
                    tracing::warn!("{}; discarding {} buffered bytes", e, dropped);
                    self.discarded += dropped as u64;
                    self.buffer.clear();
                    break;
                }
            }
        }

        dispatched
    }

    /// Append `chunk` and collect every frame that is now complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        self.on_bytes_received(chunk, |frame| frames.push(frame));
        frames
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total bytes dropped because of malformed headers.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}
