//! MsgPack codec using `rmp-serde`.
//!
//! Payloads are always written with `to_vec_named`, so the wire schema's
//! `Struct` and `ListValue` records travel as maps keyed by field name
//! (`fields`, `values`) rather than positional arrays. Peers in other
//! languages decode them without knowing Rust field order.
//!
//! # Example
//!
//! ```
//! use corrwire::codec::MsgPackCodec;
//! use corrwire::protocol::Value;
//!
//! let encoded = MsgPackCodec::encode(&Value::from("hello")).unwrap();
//! let decoded: Value = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Value::from("hello"));
//! ```

use crate::error::Result;

/// MessagePack codec for wire payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        // to_vec_named, NOT to_vec
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Struct, Value};

    #[test]
    fn test_encode_decode_nested_value() {
        let mut inner = Struct::new();
        inner.insert("ok", true);
        let mut root = Struct::new();
        root.insert("inner", inner);
        root.insert("list", Value::from(vec![Value::Null, Value::from(3.5)]));
        let original = Value::from(root);

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Value = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_encodes_as_map() {
        let encoded = MsgPackCodec::encode(&Struct::new()).unwrap();
        // fixmap with 1 entry ("fields"), not fixarray
        assert_eq!(encoded[0], 0x81, "Expected fixmap, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Value> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_slot() {
        #[derive(serde::Serialize)]
        enum Foreign {
            #[serde(rename = "bytesValue")]
            Bytes(String),
        }

        let encoded = MsgPackCodec::encode(&Foreign::Bytes("x".into())).unwrap();
        let result: Result<Value> = MsgPackCodec::decode(&encoded);
        assert!(result.is_err());
    }
}
