//! Content hashing primitives
//!
//! Provides [`ContentHash`], a strongly-typed 32-byte Blake3 hash used for the
//! model-card hash of a report, request dedupe keys and weak ETags on cached
//! reads.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 32-byte content hash (Blake3)
///
/// Immutable and cheap to clone (Copy). Serialized as a lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new hash from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    /// Hash the canonical JSON encoding of a value
    ///
    /// Struct fields serialize in declaration order and `serde_json` maps are
    /// ordered, so equal values always hash equally.
    ///
    /// # Errors
    /// Returns error if serialization fails
    #[inline]
    pub fn of_json<T>(value: &T) -> Result<Self, HashError>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_vec(value)?;
        Ok(Self::compute(&json))
    }

    /// Short representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Weak ETag form, e.g. `W/"3f2a9c01d4e5b6a7"`
    #[inline]
    #[must_use]
    pub fn weak_etag(&self) -> String {
        format!("W/\"{}\"", self.short())
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

/// Errors that can occur when working with content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected byte count
        expected: usize,
        /// Decoded byte count
        actual: usize,
    },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compute_is_deterministic() {
        assert_eq!(ContentHash::compute(b"canvas"), ContentHash::compute(b"canvas"));
        assert_ne!(ContentHash::compute(b"a"), ContentHash::compute(b"b"));
    }

    #[test]
    fn display_and_parse() {
        let hash = ContentHash::compute(b"test");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn parse_rejects_short_input() {
        let result = "abcd".parse::<ContentHash>();
        assert!(matches!(
            result,
            Err(HashError::InvalidLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn weak_etag_wraps_short_form() {
        let hash = ContentHash::compute(b"templates");
        let etag = hash.weak_etag();
        assert!(etag.starts_with("W/\""));
        assert!(etag.contains(&hash.short()));
        assert_eq!(hash.short().len(), 16);
    }

    #[test]
    fn of_json_tracks_value_equality() {
        let a = serde_json::json!({"template": "pricing", "seed": 7});
        let b = serde_json::json!({"seed": 7, "template": "pricing"});
        assert_eq!(ContentHash::of_json(&a).unwrap(), ContentHash::of_json(&b).unwrap());
    }

    #[test]
    fn serde_is_hex_string() {
        let hash = ContentHash::compute(b"report");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    proptest! {
        #[test]
        fn json_hash_ignores_key_order(
            entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..12)
        ) {
            let mut forward = serde_json::Map::new();
            for (key, value) in &entries {
                forward.insert(key.clone(), serde_json::Value::from(*value));
            }
            let mut reverse = serde_json::Map::new();
            for (key, value) in entries.iter().rev() {
                reverse.insert(key.clone(), serde_json::Value::from(*value));
            }
            prop_assert_eq!(
                ContentHash::of_json(&forward).unwrap(),
                ContentHash::of_json(&reverse).unwrap()
            );
        }
    }
}
