//! Frame struct and the frame codec.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use corrwire::protocol::{FrameCodec, Struct, Value, DEFAULT_MAX_PAYLOAD_SIZE};
//!
//! let mut request = Struct::new();
//! request.insert("a", 1.0);
//! let bytes = FrameCodec::encode(&Value::from(request), 42).unwrap();
//!
//! let (frame, consumed) = FrameCodec::try_decode_one(&bytes, DEFAULT_MAX_PAYLOAD_SIZE)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(frame.correlation_id(), 42);
//! assert_eq!(consumed, bytes.len());
//! ```

use bytes::Bytes;

use super::schema::{self, Value};
use super::wire_format::{Header, HEADER_SIZE};
use crate::codec::MsgPackCodec;
use crate::error::Result;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the correlation ID.
    #[inline]
    pub fn correlation_id(&self) -> u16 {
        self.header.correlation_id
    }

    /// Decode the payload as a wire value.
    pub fn decode_value(&self) -> Result<Value> {
        FrameCodec::decode_payload(&self.payload)
    }
}

/// Build a complete frame as a single byte vector.
pub fn build_frame(correlation_id: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let header = Header::for_payload(correlation_id, payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Encodes wire values into frames and finds frame boundaries in raw bytes.
pub struct FrameCodec;

impl FrameCodec {
    /// Serialize a wire value and check it against the schema.
    ///
    /// No frame bytes exist until this succeeds.
    pub fn encode_payload(value: &Value) -> Result<Bytes> {
        let payload = MsgPackCodec::encode(value)?;
        schema::verify(value)?;
        Ok(Bytes::from(payload))
    }

    /// Deserialize a payload and check it against the schema.
    ///
    /// Replies and requests pass the same checks as [`FrameCodec::encode_payload`].
    pub fn decode_payload(payload: &[u8]) -> Result<Value> {
        let value = MsgPackCodec::decode(payload)?;
        schema::verify(&value)?;
        Ok(value)
    }

    /// Encode a wire value as a complete frame tagged with `correlation_id`.
    pub fn encode(value: &Value, correlation_id: u16) -> Result<Vec<u8>> {
        let payload = Self::encode_payload(value)?;
        build_frame(correlation_id, &payload)
    }

    /// Look for one complete frame at the start of `buf`.
    ///
    /// Returns the frame and the number of bytes it spans; the caller's
    /// remainder is `buf[consumed..]`. `Ok(None)` means more bytes are
    /// needed. A header whose length cannot describe a payload is
    /// `MalformedFrame`.
    pub fn try_decode_one(buf: &[u8], max_payload_size: u32) -> Result<Option<(Frame, usize)>> {
        Ok(Self::frame_boundary(buf, max_payload_size)?.map(|(header, total)| {
            let payload = Bytes::copy_from_slice(&buf[HEADER_SIZE..total]);
            (Frame::new(header, payload), total)
        }))
    }

    /// Locate the end of the first frame in `buf` without copying it.
    ///
    /// Same outcomes as [`FrameCodec::try_decode_one`], returning the header
    /// and the frame's total length instead of the frame.
    pub fn frame_boundary(buf: &[u8], max_payload_size: u32) -> Result<Option<(Header, usize)>> {
        let header = match Header::decode(buf) {
            Some(header) => header,
            None => return Ok(None),
        };

        let payload_len = header.validate(max_payload_size)?;
        let total = HEADER_SIZE + payload_len;
        if buf.len() < total {
            return Ok(None);
        }

        Ok(Some((header, total)))
    }
}
