//! Error types for corrwire.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all corrwire operations.
#[derive(Debug, Error)]
pub enum CorrwireError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration and native value conversion).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Value does not conform to the wire schema. Nothing was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Native value has no wire representation. Nothing was sent.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// No response arrived before the deadline.
    #[error("Request {correlation_id} timed out after {after:?}")]
    Timeout { correlation_id: u16, after: Duration },

    /// Frame header declares an impossible length.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Response frame for a correlation id with no pending request.
    #[error("No pending request for correlation id {0}")]
    UnknownCorrelation(u16),

    /// Correlation id is already registered.
    #[error("Correlation id {0} is already in flight")]
    CorrelationInUse(u16),

    /// Every correlation id is in flight.
    #[error("All correlation ids are in flight")]
    TooManyInFlight,

    /// Connection closed before the request settled.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Endpoint address could not be parsed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl serde::ser::Error for CorrwireError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        CorrwireError::UnsupportedType(msg.to_string())
    }
}

/// Result type alias using CorrwireError.
pub type Result<T> = std::result::Result<T, CorrwireError>;
