//! Wire format encoding and decoding.
//!
//! Implements the 6-byte header format:
//! ```text
//! ┌──────────┬──────────────┬─────────────────┐
//! │ Length   │ Correlation  │ Payload         │
//! │ 4 bytes  │ 2 bytes      │ Length - 2      │
//! │ uint32 BE│ uint16 BE    │ bytes           │
//! └──────────┴──────────────┴─────────────────┘
//! ```
//!
//! The length field counts the correlation id and the payload, but not
//! itself. All multi-byte integers are Big Endian.

use crate::error::{CorrwireError, Result};

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Size of the length prefix.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Size of the correlation id, counted inside the length prefix.
pub const CORRELATION_ID_SIZE: usize = 2;

/// Default maximum payload size (16 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Largest payload the length field can describe.
pub const ABSOLUTE_MAX_PAYLOAD_SIZE: u32 = u32::MAX - CORRELATION_ID_SIZE as u32;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Declared length: payload bytes + 2.
    pub length: u32,
    /// Correlation identifier pairing a response with its request.
    pub correlation_id: u16,
}

impl Header {
    /// Create a header from a raw declared length.
    pub fn new(length: u32, correlation_id: u16) -> Self {
        Self {
            length,
            correlation_id,
        }
    }

    /// Create the header describing a payload of `payload_len` bytes.
    pub fn for_payload(correlation_id: u16, payload_len: usize) -> Result<Self> {
        if payload_len > ABSOLUTE_MAX_PAYLOAD_SIZE as usize {
            return Err(CorrwireError::Validation(format!(
                "Payload size {} exceeds maximum {}",
                payload_len, ABSOLUTE_MAX_PAYLOAD_SIZE
            )));
        }
        Ok(Self::new(
            payload_len as u32 + CORRELATION_ID_SIZE as u32,
            correlation_id,
        ))
    }

    /// Payload length implied by the declared length.
    ///
    /// Returns `None` when the declared length is shorter than the
    /// correlation id itself.
    #[inline]
    pub fn payload_len(&self) -> Option<usize> {
        self.length
            .checked_sub(CORRELATION_ID_SIZE as u32)
            .map(|n| n as usize)
    }

    /// Total bytes this frame occupies on the wire.
    #[inline]
    pub fn frame_len(&self) -> usize {
        LENGTH_FIELD_SIZE + self.length as usize
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use corrwire::protocol::Header;
    ///
    /// let header = Header::for_payload(42, 100).unwrap();
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [0, 0, 0, 102, 0, 42]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (6 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.correlation_id.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            correlation_id: u16::from_be_bytes([buf[4], buf[5]]),
        })
    }

    /// Check the declared length against protocol limits.
    pub fn validate(&self, max_payload_size: u32) -> Result<usize> {
        let payload_len = self.payload_len().ok_or_else(|| {
            CorrwireError::MalformedFrame(format!(
                "declared length {} is shorter than the correlation id",
                self.length
            ))
        })?;

        if payload_len > max_payload_size as usize {
            return Err(CorrwireError::MalformedFrame(format!(
                "Payload size {} exceeds maximum {}",
                payload_len, max_payload_size
            )));
        }

        Ok(payload_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::for_payload(7, 100).unwrap();
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.payload_len(), Some(100));
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(0x01020304, 0x0506);
        let bytes = header.encode();
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_length_counts_correlation_id() {
        let header = Header::for_payload(1, 5).unwrap();
        assert_eq!(header.length, 7);
        assert_eq!(header.frame_len(), 4 + 2 + 5);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[0u8; 5]).is_none());
    }

    #[test]
    fn test_negative_payload_is_malformed() {
        for length in [0, 1] {
            let header = Header::new(length, 9);
            assert_eq!(header.payload_len(), None);
            let err = header.validate(DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
            assert!(matches!(err, CorrwireError::MalformedFrame(_)));
        }
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let header = Header::new(2, 9);
        assert_eq!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE).unwrap(), 0);
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::for_payload(1, 1_000).unwrap();
        let err = header.validate(100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_for_payload_rejects_oversized() {
        let too_big = ABSOLUTE_MAX_PAYLOAD_SIZE as usize + 1;
        assert!(Header::for_payload(1, too_big).is_err());
        assert!(Header::for_payload(1, ABSOLUTE_MAX_PAYLOAD_SIZE as usize).is_ok());
    }

    #[test]
    fn test_encode_into() {
        let header = Header::for_payload(0xBEEF, 3).unwrap();
        let mut buf = [0u8; HEADER_SIZE];
        header.encode_into(&mut buf);
        assert_eq!(Header::decode(&buf).unwrap(), header);
    }
}
