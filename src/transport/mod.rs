//! Transport module - byte streams the protocol runs over.
//!
//! Provides:
//! - TCP sockets (`tcp://host:port`)
//! - Unix Domain Sockets (`unix:///path`, Unix only)
//!
//! Any other `AsyncRead + AsyncWrite` stream (e.g. `tokio::io::duplex`) can be
//! handed to the client or responder directly.

mod endpoint;

pub use endpoint::{Endpoint, Listener, Stream};
