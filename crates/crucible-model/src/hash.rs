//! Content hashing for skill documents
//!
//! [`ContentHash`] identifies the exact text an agent was shown. Two
//! versions with the same rendering hash equal, which the campaign record
//! uses to prove which document produced which decisions.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte Blake3 content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw bytes
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

    /// Hash arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// First 16 hex characters, for log lines and summaries
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

// Reports are read by people, so the hash always travels as hex.
impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors parsing a content hash
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Wrong number of bytes
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Not hex
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_is_deterministic() {
        assert_eq!(ContentHash::compute(b"rule"), ContentHash::compute(b"rule"));
        assert_ne!(ContentHash::compute(b"rule"), ContentHash::compute(b"rules"));
    }

    #[test]
    fn display_parses_back() {
        let hash = ContentHash::compute(b"skill");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert!(hash.to_string().starts_with(&hash.short()));
    }

    #[test]
    fn rejects_short_hex() {
        let result = "abcd".parse::<ContentHash>();
        assert!(matches!(
            result,
            Err(HashError::InvalidLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn serializes_as_hex_string() {
        let hash = ContentHash::compute(b"skill");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
