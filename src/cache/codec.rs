//! Value Codec Module
//!
//! Turns arbitrary serializable values into opaque byte payloads and back.

use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::cache::inspect;
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};

// == Value Codec ==
/// Serializes, compresses and armors cache values.
///
/// Values pass through a canonical `serde_json::Value` first, so object keys
/// are always written in sorted order. Equal values therefore encode to equal
/// bytes even when the source type is a `HashMap`, which is what lets the
/// store compare raw payloads to detect unchanged writes.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    compression: bool,
    level: u32,
}

impl ValueCodec {
    // == Constructor ==
    /// Creates a codec. `level` is clamped to zlib's 0..=9 range.
    pub fn new(compression: bool, level: u32) -> Self {
        Self {
            compression,
            level: level.min(9),
        }
    }

    /// Creates a codec from the cache options.
    pub fn from_options(options: &CacheOptions) -> Self {
        Self::new(options.compression, options.compression_level)
    }

    // == Encode ==
    /// Encodes any serializable value into a storable payload.
    ///
    /// Fails with `CacheError::Encode` on NaN or infinite floats, which JSON
    /// cannot represent.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        self.encode_value(&Self::canonicalize(value)?)
    }

    /// Converts a value to its canonical JSON form, rejecting non-finite floats.
    pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
        inspect(value)?;
        Ok(serde_json::to_value(value)?)
    }

    /// Encodes an already canonicalized value.
    pub fn encode_value(&self, value: &Value) -> Result<Vec<u8>> {
        let raw = serde_json::to_vec(value)?;
        if !self.compression {
            return Ok(raw);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(&raw)
            .map_err(|e| CacheError::Encode(format!("compression failed: {}", e)))?;
        let compressed = encoder
            .finish()
            .map_err(|e| CacheError::Encode(format!("compression failed: {}", e)))?;

        Ok(BASE64.encode(compressed).into_bytes())
    }

    // == Decode ==
    /// Decodes a payload produced by [`ValueCodec::encode`].
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T> {
        if !self.compression {
            return serde_json::from_slice(payload).map_err(|e| CacheError::Decode(e.to_string()));
        }

        let compressed = BASE64
            .decode(payload)
            .map_err(|e| CacheError::Decode(format!("invalid base64 payload: {}", e)))?;

        let mut raw = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut raw)
            .map_err(|e| CacheError::Decode(format!("decompression failed: {}", e)))?;

        serde_json::from_slice(&raw).map_err(|e| CacheError::Decode(e.to_string()))
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::from_options(&CacheOptions::default())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Compound {
        chembl_id: String,
        heavy_atoms: u32,
        synonyms: Vec<String>,
        weight: f64,
    }

    #[test]
    fn test_roundtrip_scalars() {
        let codec = ValueCodec::default();

        let encoded = codec.encode(&42i64).unwrap();
        assert_eq!(codec.decode::<i64>(&encoded).unwrap(), 42);

        let encoded = codec.encode("hello").unwrap();
        assert_eq!(codec.decode::<String>(&encoded).unwrap(), "hello");

        let encoded = codec.encode(&true).unwrap();
        assert!(codec.decode::<bool>(&encoded).unwrap());
    }

    #[test]
    fn test_roundtrip_sequences_and_maps() {
        let codec = ValueCodec::default();

        let list = vec![1u8, 2, 3, 255];
        let encoded = codec.encode(&list).unwrap();
        assert_eq!(codec.decode::<Vec<u8>>(&encoded).unwrap(), list);

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);
        let encoded = codec.encode(&map).unwrap();
        assert_eq!(codec.decode::<BTreeMap<String, i32>>(&encoded).unwrap(), map);
    }

    #[test]
    fn test_roundtrip_struct() {
        let codec = ValueCodec::default();
        let compound = Compound {
            chembl_id: "CHEMBL25".to_string(),
            heavy_atoms: 13,
            synonyms: vec!["aspirin".to_string()],
            weight: 180.16,
        };

        let encoded = codec.encode(&compound).unwrap();
        assert_eq!(codec.decode::<Compound>(&encoded).unwrap(), compound);
    }

    #[test]
    fn test_equal_values_encode_identically() {
        let codec = ValueCodec::default();

        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..64 {
            first.insert(format!("key{}", i), i);
        }
        for i in (0..64).rev() {
            second.insert(format!("key{}", i), i);
        }

        assert_eq!(codec.encode(&first).unwrap(), codec.encode(&second).unwrap());
    }

    #[test]
    fn test_compressed_payload_is_base64() {
        let codec = ValueCodec::new(true, 9);
        let encoded = codec.encode(&"x".repeat(1000)).unwrap();

        assert!(encoded.len() < 1000);
        assert!(BASE64.decode(&encoded).is_ok());
    }

    #[test]
    fn test_uncompressed_payload_is_json() {
        let codec = ValueCodec::new(false, 0);
        let encoded = codec.encode(&vec![1, 2, 3]).unwrap();

        assert_eq!(encoded, b"[1,2,3]");
        assert_eq!(codec.decode::<Vec<i32>>(&encoded).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_non_finite_floats_fail_to_encode() {
        for codec in [ValueCodec::default(), ValueCodec::new(false, 0)] {
            assert!(matches!(codec.encode(&f64::NAN), Err(CacheError::Encode(_))));
            assert!(matches!(
                codec.encode(&vec![1.0, f64::INFINITY]),
                Err(CacheError::Encode(_))
            ));
        }

        let codec = ValueCodec::default();
        let encoded = codec.encode(&vec![1.0, -0.5]).unwrap();
        assert_eq!(codec.decode::<Vec<f64>>(&encoded).unwrap(), vec![1.0, -0.5]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = ValueCodec::default();
        let result = codec.decode::<String>(b"!!not base64!!");
        assert!(matches!(result, Err(CacheError::Decode(_))));

        let not_zlib = BASE64.encode(b"plain bytes").into_bytes();
        let result = codec.decode::<String>(&not_zlib);
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_decode_wrong_type_fails() {
        let codec = ValueCodec::default();
        let encoded = codec.encode("text").unwrap();
        let result = codec.decode::<u64>(&encoded);
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }
}
