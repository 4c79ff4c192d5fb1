//! Value Codec
//!
//! Converts in-process values to tagged bytes and back. JSON is preferred;
//! values JSON cannot represent (maps keyed by non-strings, NaN or infinite
//! floats) fall back to bincode. The leading tag byte tells `decode` which
//! format to use, so entries written under one codec setting stay readable
//! under another.

use std::fmt;
use std::str::FromStr;

use serde::ser;
use serde::{de::DeserializeOwned, Serialize, Serializer};
use thiserror::Error;

use crate::error::{CacheError, Result};

const TAG_JSON: u8 = b'j';
const TAG_BINARY: u8 = b'b';

// == Codec ==
/// Encoding used when writing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// JSON, falling back to binary when JSON cannot hold the value exactly
    #[default]
    Auto,
    /// JSON only
    Json,
    /// Binary only. Bincode is not self-describing, so values can only be
    /// read back into concrete types: `serde_json::Value` and untagged enums
    /// fail to decode.
    Binary,
}

impl Codec {
    /// Encodes `value` into tagged bytes.
    ///
    /// Fails with `CacheError::Serialization` when no permitted format can
    /// represent the value exactly.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => encode_json(value),
            Codec::Binary => encode_binary(value),
            Codec::Auto => encode_json(value).or_else(|json_err| {
                encode_binary(value).map_err(|bin_err| {
                    CacheError::Serialization(format!("{}; binary fallback: {}", json_err, bin_err))
                })
            }),
        }
    }

    /// Whether values written with this codec can be decoded into
    /// self-describing targets such as `serde_json::Value`.
    pub fn is_self_describing(&self) -> bool {
        !matches!(self, Codec::Binary)
    }

    /// Decodes tagged bytes produced by any codec variant.
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        match bytes.split_first() {
            Some((&TAG_JSON, body)) => Ok(serde_json::from_slice(body)?),
            Some((&TAG_BINARY, body)) => Ok(bincode::deserialize(body)?),
            Some((tag, _)) => Err(CacheError::Serialization(format!(
                "unknown codec tag 0x{:02x}",
                tag
            ))),
            None => Err(CacheError::Serialization("empty payload".to_string())),
        }
    }
}

/// Encodes as JSON, refusing values JSON would silently alter.
fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    // serde_json writes NaN and infinities as `null`
    if let Err(ScanError::NonFinite(v)) = value.serialize(FloatScan) {
        return Err(CacheError::Serialization(format!(
            "JSON cannot represent float {}",
            v
        )));
    }

    let mut buf = vec![TAG_JSON];
    serde_json::to_writer(&mut buf, value)?;
    Ok(buf)
}

fn encode_binary<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let body = bincode::serialize(value)?;
    let mut buf = Vec::with_capacity(body.len() + 1);
    buf.push(TAG_BINARY);
    buf.extend_from_slice(&body);
    Ok(buf)
}

// == Float Scan ==
/// Serializer that walks a value only to find NaN or infinite floats.
#[derive(Clone, Copy)]
struct FloatScan;

#[derive(Debug, Error)]
enum ScanError {
    #[error("non-finite float {0}")]
    NonFinite(f64),
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for ScanError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ScanError::Custom(msg.to_string())
    }
}

type ScanResult = std::result::Result<(), ScanError>;

fn check_float(v: f64) -> ScanResult {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ScanError::NonFinite(v))
    }
}

impl Serializer for FloatScan {
    type Ok = ();
    type Error = ScanError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _v: bool) -> ScanResult {
        Ok(())
    }
    fn serialize_i8(self, _v: i8) -> ScanResult {
        Ok(())
    }
    fn serialize_i16(self, _v: i16) -> ScanResult {
        Ok(())
    }
    fn serialize_i32(self, _v: i32) -> ScanResult {
        Ok(())
    }
    fn serialize_i64(self, _v: i64) -> ScanResult {
        Ok(())
    }
    fn serialize_i128(self, _v: i128) -> ScanResult {
        Ok(())
    }
    fn serialize_u8(self, _v: u8) -> ScanResult {
        Ok(())
    }
    fn serialize_u16(self, _v: u16) -> ScanResult {
        Ok(())
    }
    fn serialize_u32(self, _v: u32) -> ScanResult {
        Ok(())
    }
    fn serialize_u64(self, _v: u64) -> ScanResult {
        Ok(())
    }
    fn serialize_u128(self, _v: u128) -> ScanResult {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> ScanResult {
        check_float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> ScanResult {
        check_float(v)
    }
    fn serialize_char(self, _v: char) -> ScanResult {
        Ok(())
    }
    fn serialize_str(self, _v: &str) -> ScanResult {
        Ok(())
    }
    fn serialize_bytes(self, _v: &[u8]) -> ScanResult {
        Ok(())
    }
    fn serialize_none(self) -> ScanResult {
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> ScanResult {
        value.serialize(self)
    }
    fn serialize_unit(self) -> ScanResult {
        Ok(())
    }
    fn serialize_unit_struct(self, _name: &'static str) -> ScanResult {
        Ok(())
    }
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> ScanResult {
        Ok(())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> ScanResult {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> ScanResult {
        value.serialize(self)
    }
    fn serialize_seq(self, _len: Option<usize>) -> std::result::Result<Self, ScanError> {
        Ok(self)
    }
    fn serialize_tuple(self, _len: usize) -> std::result::Result<Self, ScanError> {
        Ok(self)
    }
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, ScanError> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, ScanError> {
        Ok(self)
    }
    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<Self, ScanError> {
        Ok(self)
    }
    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, ScanError> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, ScanError> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FloatScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(*self)
    }
    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl ser::SerializeTuple for FloatScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(*self)
    }
    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FloatScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(*self)
    }
    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FloatScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(*self)
    }
    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl ser::SerializeMap for FloatScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> ScanResult {
        key.serialize(*self)
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(*self)
    }
    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl ser::SerializeStruct for FloatScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> ScanResult {
        value.serialize(*self)
    }
    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FloatScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> ScanResult {
        value.serialize(*self)
    }
    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Codec::Auto),
            "json" => Ok(Codec::Json),
            "binary" | "bincode" => Ok(Codec::Binary),
            other => Err(format!("unknown codec '{}'", other)),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Codec::Auto => "auto",
            Codec::Json => "json",
            Codec::Binary => "binary",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{ser::Error as _, Deserialize, Serializer};
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        roles: Vec<String>,
        ttl: Option<u32>,
    }

    /// Stands in for a value holding a live resource handle.
    struct SocketHandle;

    impl Serialize for SocketHandle {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("live socket cannot be serialized"))
        }
    }

    #[test]
    fn test_auto_prefers_json() {
        let bytes = Codec::Auto.encode(&serde_json::json!({"user": "ahmet"})).unwrap();
        assert_eq!(bytes[0], TAG_JSON);
        assert_eq!(&bytes[1..], br#"{"user":"ahmet"}"#);
    }

    #[test]
    fn test_struct_roundtrip() {
        let session = Session {
            user: "ahmet".to_string(),
            roles: vec!["admin".to_string()],
            ttl: None,
        };
        let bytes = Codec::Auto.encode(&session).unwrap();
        let decoded: Session = Codec::decode(&bytes).unwrap();
        assert_eq!(decoded, session);
    }

    #[test]
    fn test_auto_falls_back_to_binary_for_tuple_keys() {
        let mut grid: HashMap<(u32, u32), String> = HashMap::new();
        grid.insert((1, 2), "a".to_string());
        grid.insert((3, 4), "b".to_string());

        assert!(Codec::Json.encode(&grid).is_err());

        let bytes = Codec::Auto.encode(&grid).unwrap();
        assert_eq!(bytes[0], TAG_BINARY);
        let decoded: HashMap<(u32, u32), String> = Codec::decode(&bytes).unwrap();
        assert_eq!(decoded, grid);
    }

    #[test]
    fn test_auto_sends_non_finite_floats_to_binary() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let bytes = Codec::Auto.encode(&value).unwrap();
            assert_eq!(bytes[0], TAG_BINARY);
            let decoded: f64 = Codec::decode(&bytes).unwrap();
            assert_eq!(decoded.to_bits(), value.to_bits());
        }

        let finite = Codec::Auto.encode(&1.5f64).unwrap();
        assert_eq!(finite[0], TAG_JSON);
    }

    #[test]
    fn test_nested_non_finite_float_detected() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Reading {
            sensor: String,
            samples: Vec<Option<f32>>,
        }

        let reading = Reading {
            sensor: "hall-7".to_string(),
            samples: vec![Some(0.5), None, Some(f32::INFINITY)],
        };
        let bytes = Codec::Auto.encode(&reading).unwrap();
        assert_eq!(bytes[0], TAG_BINARY);
        let decoded: Reading = Codec::decode(&bytes).unwrap();
        assert_eq!(decoded, reading);
    }

    #[test]
    fn test_json_codec_rejects_non_finite_float() {
        let result = Codec::Json.encode(&vec![1.0, f64::NAN]);
        match result {
            Err(CacheError::Serialization(msg)) => assert!(msg.contains("NaN")),
            other => panic!("expected serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_codec_cannot_feed_self_describing_targets() {
        assert!(Codec::Auto.is_self_describing());
        assert!(Codec::Json.is_self_describing());
        assert!(!Codec::Binary.is_self_describing());

        let bytes = Codec::Binary.encode(&serde_json::json!({"user": "ahmet"})).unwrap();
        let result: Result<serde_json::Value> = Codec::decode(&bytes);
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_binary_codec_roundtrip() {
        let value = vec![1u64, 2, 3];
        let bytes = Codec::Binary.encode(&value).unwrap();
        assert_eq!(bytes[0], TAG_BINARY);
        let decoded: Vec<u64> = Codec::decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_unserializable_value_is_recoverable_error() {
        let result = Codec::Auto.encode(&SocketHandle);
        match result {
            Err(CacheError::Serialization(msg)) => assert!(msg.contains("live socket")),
            other => panic!("expected serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_type_mismatch() {
        let bytes = Codec::Json.encode("just a string").unwrap();
        let result: Result<Session> = Codec::decode(&bytes);
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_decode_unknown_tag_and_empty() {
        assert!(matches!(
            Codec::decode::<String>(b"x123"),
            Err(CacheError::Serialization(_))
        ));
        assert!(matches!(
            Codec::decode::<String>(&[]),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_codec_parse() {
        assert_eq!("JSON".parse::<Codec>(), Ok(Codec::Json));
        assert_eq!("bincode".parse::<Codec>(), Ok(Codec::Binary));
        assert!("xml".parse::<Codec>().is_err());
        assert_eq!(Codec::Auto.to_string(), "auto");
    }
}
