//! # corrwire
//!
//! Correlated request/response messaging over any ordered byte stream.
//!
//! Each request is a structured value carried in a length-prefixed frame
//! tagged with a 16-bit correlation id. Many requests can be in flight on one
//! connection; replies may arrive in any order and are matched back to their
//! requests by id.
//!
//! ## Architecture
//!
//! - **Codec**: native values ⇄ tagged-union wire values ⇄ MessagePack
//! - **Protocol**: 6-byte header framing and stream reassembly
//! - **Correlation**: pending-request table with per-request timeouts
//! - **Client / Responder**: the two ends of a connection
//!
//! ## Wire format
//!
//! ```text
//! +----------+----------+------------------+
//! | u32 len  | u16 id   | payload          |
//! +----------+----------+------------------+
//!   len = payload bytes + 2, big-endian
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use corrwire::{Client, CorrwireError, Responder};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> corrwire::Result<()> {
//!     let (ours, theirs) = tokio::io::duplex(64 * 1024);
//!     tokio::spawn(Responder::builder().serve(theirs, |v| async move {
//!         Ok::<_, CorrwireError>(v)
//!     }));
//!
//!     let client = Client::connect(ours);
//!     let reply = client.send(&json!({"a": 1, "b": "x"})).await?;
//!     assert_eq!(reply, json!({"a": 1, "b": "x"}));
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod correlation;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod responder;

pub use client::{Client, ClientBuilder, ClientConfig, DEFAULT_READ_BUFFER_SIZE};
pub use codec::DecodeOptions;
pub use error::{CorrwireError, Result};
pub use responder::{Responder, ResponderBuilder, DEFAULT_MAX_CONCURRENT_HANDLERS};
pub use transport::Endpoint;
