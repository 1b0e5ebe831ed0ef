//! Codec module - payload serialization and native value translation.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`)
//! - [`ValueCodec`] - native values to/from the tagged-union wire schema
//! - [`DecodeOptions`] - rendering flags for the schema-object form
//!
//! # Example
//!
//! ```
//! use corrwire::codec::{MsgPackCodec, ValueCodec};
//! use corrwire::protocol::Value;
//! use serde_json::json;
//!
//! let wire = ValueCodec::to_wire(&json!({"a": 1, "b": "x"})).unwrap();
//! let bytes = MsgPackCodec::encode(&wire).unwrap();
//! let back: Value = MsgPackCodec::decode(&bytes).unwrap();
//! assert_eq!(ValueCodec::from_wire(&back).unwrap(), json!({"a": 1, "b": "x"}));
//! ```

mod msgpack;
mod options;
mod value;

pub use msgpack::MsgPackCodec;
pub use options::DecodeOptions;
pub use value::{ValueCodec, MAX_SAFE_INTEGER};
