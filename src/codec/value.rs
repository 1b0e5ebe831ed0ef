//! Conversion between native values and the tagged-union wire schema.
//!
//! Encoding accepts anything implementing `serde::Serialize` and walks it
//! with a dedicated [`serde::Serializer`], so every supported native shape
//! maps to exactly one wire variant and everything else is rejected before
//! a frame is built. Decoding walks the wire enum and produces
//! `serde_json::Value`, the crate's dynamic native form.
//!
//! | native                                   | wire                 |
//! |------------------------------------------|----------------------|
//! | string, char, unit enum variant          | `String`             |
//! | integers within ±2^53, floats            | `Number`             |
//! | bool                                     | `Bool`               |
//! | `()`, unit struct, `None`                | `Null`               |
//! | sequence, tuple, tuple struct            | `List`               |
//! | string-keyed map, struct                 | `Struct`             |
//! | newtype/tuple/struct variant             | `Struct` of one field|
//! | bytes, non-string map keys, i128/u128    | `UnsupportedType`    |

use std::collections::BTreeMap;

use serde::ser::{self, Impossible, Serialize, Serializer};
use serde_json::{Map, Number, Value as JsonValue};

use super::options::DecodeOptions;
use crate::error::{CorrwireError, Result};
use crate::protocol::{ListValue, Struct, Value};

/// Largest integer an `f64` represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

const SLOTS: [&str; 6] = [
    "nullValue",
    "numberValue",
    "stringValue",
    "boolValue",
    "structValue",
    "listValue",
];

/// Converts native values to wire values and back.
pub struct ValueCodec;

impl ValueCodec {
    /// Translate a native value into a wire value.
    ///
    /// # Example
    ///
    /// ```
    /// use corrwire::codec::ValueCodec;
    /// use corrwire::protocol::Value;
    ///
    /// let wire = ValueCodec::to_wire(&vec![1, 2]).unwrap();
    /// assert_eq!(wire, Value::from(vec![Value::Number(1.0), Value::Number(2.0)]));
    /// ```
    pub fn to_wire<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
        value.serialize(WireSerializer)
    }

    /// Translate a native value that must become a `Struct`.
    pub fn to_struct<T: Serialize + ?Sized>(value: &T) -> Result<Struct> {
        match Self::to_wire(value)? {
            Value::Struct(s) => Ok(s),
            other => Err(CorrwireError::Validation(format!(
                "request must be a struct, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Translate a wire value into its native JSON form.
    pub fn from_wire(value: &Value) -> Result<JsonValue> {
        Ok(match value {
            Value::Null => JsonValue::Null,
            Value::Number(n) => JsonValue::Number(number_to_json(*n)?),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Struct(s) => {
                let mut map = Map::with_capacity(s.fields.len());
                for (key, field) in &s.fields {
                    map.insert(key.clone(), Self::from_wire(field)?);
                }
                JsonValue::Object(map)
            }
            Value::List(list) => JsonValue::Array(
                list.values
                    .iter()
                    .map(Self::from_wire)
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }

    /// Translate a wire value into any deserializable native type.
    pub fn from_wire_as<R: serde::de::DeserializeOwned>(value: &Value) -> Result<R> {
        Ok(serde_json::from_value(Self::from_wire(value)?)?)
    }

    /// Render a wire value as its schema object.
    ///
    /// ```
    /// use corrwire::codec::{DecodeOptions, ValueCodec};
    /// use corrwire::protocol::Value;
    /// use serde_json::json;
    ///
    /// let options = DecodeOptions { include_oneof_markers: true, ..Default::default() };
    /// let object = ValueCodec::to_object(&Value::from(true), &options);
    /// assert_eq!(object, json!({"boolValue": true, "kind": "boolValue"}));
    /// ```
    pub fn to_object(value: &Value, options: &DecodeOptions) -> JsonValue {
        let mut object = Map::new();
        let rendered = match value {
            Value::Null if options.enums_as_string => JsonValue::from("NULL_VALUE"),
            Value::Null => JsonValue::from(0),
            Value::Number(n) => match Number::from_f64(*n) {
                Some(number) => JsonValue::Number(number),
                None => JsonValue::String(non_finite_name(*n).to_string()),
            },
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Struct(s) => {
                let mut record = Map::new();
                if !s.fields.is_empty() || options.objects() {
                    let fields = s
                        .fields
                        .iter()
                        .map(|(k, v)| (k.clone(), Self::to_object(v, options)))
                        .collect();
                    record.insert("fields".to_string(), JsonValue::Object(fields));
                }
                JsonValue::Object(record)
            }
            Value::List(list) => {
                let mut record = Map::new();
                if !list.values.is_empty() || options.arrays() {
                    let values = list
                        .values
                        .iter()
                        .map(|v| Self::to_object(v, options))
                        .collect();
                    record.insert("values".to_string(), JsonValue::Array(values));
                }
                JsonValue::Object(record)
            }
        };
        object.insert(value.kind_name().to_string(), rendered);
        if options.include_oneof_markers {
            object.insert("kind".to_string(), JsonValue::from(value.kind_name()));
        }
        JsonValue::Object(object)
    }

    /// Parse a schema object back into a wire value.
    ///
    /// Accepts every rendering [`ValueCodec::to_object`] produces. A bare
    /// record with a `fields` member is a struct and one with a `values`
    /// member is a list; anything else must carry exactly one populated
    /// slot, or a `kind` marker naming it.
    pub fn from_object(object: &JsonValue) -> Result<Value> {
        let map = object
            .as_object()
            .ok_or_else(|| invalid(format!("expected a value object, got {}", object)))?;

        let slot = match map.get("kind") {
            Some(JsonValue::String(kind)) => kind.as_str(),
            Some(other) => return Err(invalid(format!("kind marker must be a string, got {}", other))),
            None => {
                if map.contains_key("fields") {
                    return Ok(Value::Struct(struct_from_record(object)?));
                }
                if map.contains_key("values") {
                    return Ok(Value::List(list_from_record(object)?));
                }
                let mut populated = map.keys().filter(|k| SLOTS.contains(&k.as_str()));
                match (populated.next(), populated.next()) {
                    (Some(slot), None) => slot.as_str(),
                    (None, _) => return Err(invalid("no populated slot".to_string())),
                    (Some(a), Some(b)) => {
                        return Err(invalid(format!("more than one populated slot ({}, {})", a, b)))
                    }
                }
            }
        };

        let inner = map
            .get(slot)
            .ok_or_else(|| invalid(format!("kind names {} but the slot is empty", slot)))?;

        match slot {
            "nullValue" => match inner {
                JsonValue::Null => Ok(Value::Null),
                JsonValue::String(s) if s == "NULL_VALUE" => Ok(Value::Null),
                JsonValue::Number(n) if n.as_u64() == Some(0) => Ok(Value::Null),
                other => Err(invalid(format!("bad nullValue {}", other))),
            },
            "numberValue" => number_from_object(inner).map(Value::Number),
            "stringValue" => inner
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| invalid(format!("bad stringValue {}", inner))),
            "boolValue" => inner
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| invalid(format!("bad boolValue {}", inner))),
            "structValue" => struct_from_record(inner).map(Value::Struct),
            "listValue" => list_from_record(inner).map(Value::List),
            other => Err(invalid(format!("unknown slot {}", other))),
        }
    }
}

fn invalid(msg: String) -> CorrwireError {
    CorrwireError::Validation(msg)
}

fn unsupported(msg: &str) -> CorrwireError {
    CorrwireError::UnsupportedType(msg.to_string())
}

fn number_to_json(n: f64) -> Result<Number> {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 {
        return Ok(if n >= 0.0 {
            Number::from(n as u64)
        } else {
            Number::from(n as i64)
        });
    }
    Number::from_f64(n).ok_or_else(|| invalid(format!("number {} is not finite", n)))
}

fn non_finite_name(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn number_from_object(inner: &JsonValue) -> Result<f64> {
    match inner {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid(format!("bad numberValue {}", n))),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => Err(invalid(format!("bad numberValue {}", s))),
        },
        other => Err(invalid(format!("bad numberValue {}", other))),
    }
}

fn struct_from_record(record: &JsonValue) -> Result<Struct> {
    let map = record
        .as_object()
        .ok_or_else(|| invalid(format!("bad structValue {}", record)))?;
    match map.get("fields") {
        None => Ok(Struct::new()),
        Some(JsonValue::Object(fields)) => fields
            .iter()
            .map(|(k, v)| -> Result<(String, Value)> { Ok((k.clone(), ValueCodec::from_object(v)?)) })
            .collect(),
        Some(other) => Err(invalid(format!("bad fields {}", other))),
    }
}

fn list_from_record(record: &JsonValue) -> Result<ListValue> {
    let map = record
        .as_object()
        .ok_or_else(|| invalid(format!("bad listValue {}", record)))?;
    match map.get("values") {
        None => Ok(ListValue::default()),
        Some(JsonValue::Array(values)) => Ok(ListValue {
            values: values
                .iter()
                .map(ValueCodec::from_object)
                .collect::<Result<Vec<_>>>()?,
        }),
        Some(other) => Err(invalid(format!("bad values {}", other))),
    }
}

fn integer(n: i128) -> Result<Value> {
    if n.unsigned_abs() > MAX_SAFE_INTEGER as u128 {
        return Err(CorrwireError::UnsupportedType(format!(
            "integer {} is not exactly representable as a number",
            n
        )));
    }
    Ok(Value::Number(n as f64))
}

fn single_field(variant: &'static str, value: Value) -> Value {
    let mut s = Struct::new();
    s.insert(variant, value);
    Value::Struct(s)
}

/// Serializer producing wire values.
struct WireSerializer;

impl Serializer for WireSerializer {
    type Ok = Value;
    type Error = CorrwireError;

    type SerializeSeq = SerializeList;
    type SerializeTuple = SerializeList;
    type SerializeTupleStruct = SerializeList;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeFields;
    type SerializeStruct = SerializeFields;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        integer(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        integer(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        integer(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        integer(v.into())
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        integer(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        integer(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        integer(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        integer(v.into())
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Value::Number(v))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Value> {
        Err(unsupported("byte arrays have no wire representation"))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value> {
        Ok(single_field(variant, value.serialize(WireSerializer)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeList> {
        Ok(SerializeList {
            values: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeList> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SerializeList> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeTupleVariant> {
        Ok(SerializeTupleVariant {
            variant,
            values: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeFields> {
        Ok(SerializeFields {
            fields: BTreeMap::new(),
            next_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<SerializeFields> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<SerializeStructVariant> {
        Ok(SerializeStructVariant {
            variant,
            fields: BTreeMap::new(),
        })
    }
}

struct SerializeList {
    values: Vec<Value>,
}

impl SerializeList {
    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.values.push(value.serialize(WireSerializer)?);
        Ok(())
    }

    fn finish(self) -> Value {
        Value::List(ListValue {
            values: self.values,
        })
    }
}

impl ser::SerializeSeq for SerializeList {
    type Ok = Value;
    type Error = CorrwireError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SerializeList {
    type Ok = Value;
    type Error = CorrwireError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SerializeList {
    type Ok = Value;
    type Error = CorrwireError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

struct SerializeTupleVariant {
    variant: &'static str,
    values: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = CorrwireError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.values.push(value.serialize(WireSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(single_field(self.variant, Value::from(self.values)))
    }
}

struct SerializeFields {
    fields: BTreeMap<String, Value>,
    next_key: Option<String>,
}

impl ser::SerializeMap for SerializeFields {
    type Ok = Value;
    type Error = CorrwireError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        self.next_key = Some(key.serialize(MapKeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| unsupported("map value without a key"))?;
        self.fields.insert(key, value.serialize(WireSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Struct(Struct {
            fields: self.fields,
        }))
    }
}

impl ser::SerializeStruct for SerializeFields {
    type Ok = Value;
    type Error = CorrwireError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.fields
            .insert(key.to_string(), value.serialize(WireSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Struct(Struct {
            fields: self.fields,
        }))
    }
}

struct SerializeStructVariant {
    variant: &'static str,
    fields: BTreeMap<String, Value>,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = CorrwireError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.fields
            .insert(key.to_string(), value.serialize(WireSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        let inner = Value::Struct(Struct {
            fields: self.fields,
        });
        Ok(single_field(self.variant, inner))
    }
}

/// Accepts only string-like map keys.
struct MapKeySerializer;

fn key_error() -> CorrwireError {
    unsupported("map keys must be strings")
}

impl Serializer for MapKeySerializer {
    type Ok = String;
    type Error = CorrwireError;

    type SerializeSeq = Impossible<String, CorrwireError>;
    type SerializeTuple = Impossible<String, CorrwireError>;
    type SerializeTupleStruct = Impossible<String, CorrwireError>;
    type SerializeTupleVariant = Impossible<String, CorrwireError>;
    type SerializeMap = Impossible<String, CorrwireError>;
    type SerializeStruct = Impossible<String, CorrwireError>;
    type SerializeStructVariant = Impossible<String, CorrwireError>;

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<String> {
        Err(key_error())
    }

    fn serialize_i8(self, _v: i8) -> Result<String> {
        Err(key_error())
    }

    fn serialize_i16(self, _v: i16) -> Result<String> {
        Err(key_error())
    }

    fn serialize_i32(self, _v: i32) -> Result<String> {
        Err(key_error())
    }

    fn serialize_i64(self, _v: i64) -> Result<String> {
        Err(key_error())
    }

    fn serialize_u8(self, _v: u8) -> Result<String> {
        Err(key_error())
    }

    fn serialize_u16(self, _v: u16) -> Result<String> {
        Err(key_error())
    }

    fn serialize_u32(self, _v: u32) -> Result<String> {
        Err(key_error())
    }

    fn serialize_u64(self, _v: u64) -> Result<String> {
        Err(key_error())
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(key_error())
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(key_error())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(key_error())
    }

    fn serialize_none(self) -> Result<String> {
        Err(key_error())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<String> {
        Err(key_error())
    }

    fn serialize_unit(self) -> Result<String> {
        Err(key_error())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(key_error())
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String> {
        Err(key_error())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(key_error())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(key_error())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(key_error())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(key_error())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(key_error())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(key_error())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(key_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_scalars_to_wire() {
        assert_eq!(ValueCodec::to_wire("x").unwrap(), Value::from("x"));
        assert_eq!(ValueCodec::to_wire(&'c').unwrap(), Value::from("c"));
        assert_eq!(ValueCodec::to_wire(&7u8).unwrap(), Value::Number(7.0));
        assert_eq!(ValueCodec::to_wire(&-3i64).unwrap(), Value::Number(-3.0));
        assert_eq!(ValueCodec::to_wire(&0.5f32).unwrap(), Value::Number(0.5));
        assert_eq!(ValueCodec::to_wire(&true).unwrap(), Value::Bool(true));
        assert_eq!(ValueCodec::to_wire(&()).unwrap(), Value::Null);
        assert_eq!(ValueCodec::to_wire(&None::<i32>).unwrap(), Value::Null);
        assert_eq!(ValueCodec::to_wire(&Some(2)).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_struct_and_list_to_wire() {
        #[derive(Serialize)]
        struct Request {
            name: String,
            tags: Vec<&'static str>,
            limit: Option<u32>,
        }

        let wire = ValueCodec::to_wire(&Request {
            name: "n".into(),
            tags: vec!["a", "b"],
            limit: None,
        })
        .unwrap();

        let s = wire.as_struct().unwrap();
        assert_eq!(s.get("name"), Some(&Value::from("n")));
        assert_eq!(
            s.get("tags"),
            Some(&Value::from(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(s.get("limit"), Some(&Value::Null));
    }

    #[test]
    fn test_enum_variants_to_wire() {
        #[derive(Serialize)]
        enum Op {
            Stop,
            Move(i32),
            Pair(i32, i32),
            Jump { height: u8 },
        }

        assert_eq!(ValueCodec::to_wire(&Op::Stop).unwrap(), Value::from("Stop"));

        let moved = ValueCodec::to_wire(&Op::Move(4)).unwrap();
        assert_eq!(
            moved.as_struct().unwrap().get("Move"),
            Some(&Value::Number(4.0))
        );

        let pair = ValueCodec::to_wire(&Op::Pair(1, 2)).unwrap();
        assert_eq!(
            pair.as_struct().unwrap().get("Pair"),
            Some(&Value::from(vec![Value::Number(1.0), Value::Number(2.0)]))
        );

        let jump = ValueCodec::to_wire(&Op::Jump { height: 3 }).unwrap();
        let inner = jump.as_struct().unwrap().get("Jump").unwrap();
        assert_eq!(inner.as_struct().unwrap().get("height"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_unsupported_types() {
        struct Blob;
        impl Serialize for Blob {
            fn serialize<S: ser::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                s.serialize_bytes(&[1, 2, 3])
            }
        }
        assert!(matches!(
            ValueCodec::to_wire(&Blob),
            Err(CorrwireError::UnsupportedType(_))
        ));

        let mut int_keys = HashMap::new();
        int_keys.insert(1, "one");
        assert!(matches!(
            ValueCodec::to_wire(&int_keys),
            Err(CorrwireError::UnsupportedType(_))
        ));

        assert!(matches!(
            ValueCodec::to_wire(&(MAX_SAFE_INTEGER + 1)),
            Err(CorrwireError::UnsupportedType(_))
        ));
        assert!(ValueCodec::to_wire(&MAX_SAFE_INTEGER).is_ok());

        assert!(matches!(
            ValueCodec::to_wire(&1u128),
            Err(CorrwireError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_to_struct_requires_struct_root() {
        assert!(ValueCodec::to_struct(&json!({"a": 1})).is_ok());

        let err = ValueCodec::to_struct(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, CorrwireError::Validation(_)));
        assert!(err.to_string().contains("listValue"));
    }

    #[test]
    fn test_round_trip_json_values() {
        let samples = vec![
            json!(null),
            json!(true),
            json!("text"),
            json!(0),
            json!(-17),
            json!(2.25),
            json!(MAX_SAFE_INTEGER),
            json!([]),
            json!({}),
            json!({"a": 1, "b": "x", "c": [true, null]}),
            json!({"nested": {"deep": [[1, 2], {"k": -0.5}]}, "empty": {"l": [], "o": {}}}),
        ];

        for sample in samples {
            let wire = ValueCodec::to_wire(&sample).unwrap();
            assert_eq!(ValueCodec::from_wire(&wire).unwrap(), sample);
        }
    }

    #[test]
    fn test_integral_floats_come_back_as_integers() {
        let cases = vec![
            (json!(1.0), json!(1)),
            (json!(-0.0), json!(0)),
            (json!(-4.0), json!(-4)),
            (json!({"a": 2.0}), json!({"a": 2})),
            (json!([3.0, 3.5]), json!([3, 3.5])),
        ];

        for (sample, expected) in cases {
            let wire = ValueCodec::to_wire(&sample).unwrap();
            let back = ValueCodec::from_wire(&wire).unwrap();
            assert_eq!(back, expected);
            assert_ne!(back, sample);
        }

        // Integral floats past 2^53 stay floats.
        let big = json!(1e300);
        let wire = ValueCodec::to_wire(&big).unwrap();
        assert_eq!(ValueCodec::from_wire(&wire).unwrap(), big);
    }

    #[test]
    fn test_from_wire_as_typed() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Point {
            x: i32,
            y: f64,
            label: Option<String>,
        }

        let point = Point {
            x: -4,
            y: 1.5,
            label: Some("p".into()),
        };
        let wire = ValueCodec::to_wire(&point).unwrap();
        let back: Point = ValueCodec::from_wire_as(&wire).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_from_wire_rejects_non_finite() {
        let err = ValueCodec::from_wire(&Value::Number(f64::NAN)).unwrap_err();
        assert!(matches!(err, CorrwireError::Validation(_)));
    }

    #[test]
    fn test_to_object_default_options() {
        let wire = ValueCodec::to_wire(&json!({"a": 1, "l": [], "o": {}, "n": null})).unwrap();
        let object = ValueCodec::to_object(&wire, &DecodeOptions::default());

        assert_eq!(
            object,
            json!({"structValue": {"fields": {
                "a": {"numberValue": 1.0},
                "l": {"listValue": {}},
                "o": {"structValue": {}},
                "n": {"nullValue": 0}
            }}})
        );
    }

    #[test]
    fn test_to_object_all_options() {
        let options = DecodeOptions {
            enums_as_string: true,
            populate_empty_arrays: true,
            populate_empty_objects: true,
            include_oneof_markers: true,
            ..DecodeOptions::default()
        };
        let wire = ValueCodec::to_wire(&json!({"l": [], "o": {}, "n": null})).unwrap();
        let object = ValueCodec::to_object(&wire, &options);

        assert_eq!(
            object,
            json!({"kind": "structValue", "structValue": {"fields": {
                "l": {"kind": "listValue", "listValue": {"values": []}},
                "o": {"kind": "structValue", "structValue": {"fields": {}}},
                "n": {"kind": "nullValue", "nullValue": "NULL_VALUE"}
            }}})
        );
    }

    #[test]
    fn test_object_round_trip_under_every_option() {
        let wire = ValueCodec::to_wire(&json!({"a": 1, "b": "x", "c": [true, null], "d": {}, "e": []}))
            .unwrap();

        for bits in 0u8..64 {
            let options = DecodeOptions {
                enums_as_string: bits & 1 != 0,
                bytes_as_base64: bits & 2 != 0,
                include_defaults: bits & 4 != 0,
                populate_empty_arrays: bits & 8 != 0,
                populate_empty_objects: bits & 16 != 0,
                include_oneof_markers: bits & 32 != 0,
            };
            let object = ValueCodec::to_object(&wire, &options);
            assert_eq!(ValueCodec::from_object(&object).unwrap(), wire, "options {:?}", options);
        }
    }

    #[test]
    fn test_from_object_bare_records() {
        let s = ValueCodec::from_object(&json!({"fields": {"k": {"boolValue": false}}})).unwrap();
        assert_eq!(s.as_struct().unwrap().get("k"), Some(&Value::Bool(false)));

        let l = ValueCodec::from_object(&json!({"values": [{"stringValue": "v"}]})).unwrap();
        assert_eq!(l, Value::from(vec![Value::from("v")]));
    }

    #[test]
    fn test_from_object_non_finite_numbers() {
        let v = ValueCodec::from_object(&json!({"numberValue": "-Infinity"})).unwrap();
        assert_eq!(v, Value::Number(f64::NEG_INFINITY));
        let rendered = ValueCodec::to_object(&v, &DecodeOptions::default());
        assert_eq!(rendered, json!({"numberValue": "-Infinity"}));
    }

    #[test]
    fn test_from_object_rejects_ambiguous_or_empty() {
        assert!(ValueCodec::from_object(&json!({})).is_err());
        assert!(ValueCodec::from_object(&json!({"boolValue": true, "stringValue": "x"})).is_err());
        assert!(ValueCodec::from_object(&json!({"kind": "boolValue"})).is_err());
        assert!(ValueCodec::from_object(&json!({"numberValue": "12"})).is_err());
        assert!(ValueCodec::from_object(&json!(5)).is_err());
    }

    #[test]
    fn test_kind_marker_selects_slot() {
        let object = json!({"kind": "stringValue", "stringValue": "x", "boolValue": true});
        assert_eq!(ValueCodec::from_object(&object).unwrap(), Value::from("x"));
    }
}
