//! Protocol module - wire schema, framing, and reassembly.
//!
//! This module implements the binary protocol:
//! - Tagged-union wire schema for payloads
//! - 6-byte header encoding/decoding
//! - Frame codec and the stream reassembler for partial reads

mod frame;
mod reassembler;
mod schema;
mod wire_format;

pub use frame::{build_frame, Frame, FrameCodec};
pub use reassembler::{StreamReassembler, DEFAULT_BUFFER_CAPACITY};
pub use schema::{verify, ListValue, Struct, Value, MAX_NESTING_DEPTH};
pub use wire_format::{
    Header, ABSOLUTE_MAX_PAYLOAD_SIZE, CORRELATION_ID_SIZE, DEFAULT_MAX_PAYLOAD_SIZE,
    HEADER_SIZE, LENGTH_FIELD_SIZE,
};
