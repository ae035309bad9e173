//! Content-addressed object identifiers.
//!
//! A [`Key`] pairs a hash algorithm with its hex digest. Only `sha1` is
//! recognized today; any other algorithm is a hard parse error.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CaskError, Result};

const ALGORITHM: &str = "sha1";
const HEX_LEN: usize = 40;
const PATH_SEGMENTS: usize = 20;

/// An immutable content identifier: `algorithm` + hex `value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    algorithm: String,
    value: String,
}

impl Key {
    /// Parse the canonical `"sha1:<40hex>"` form.
    pub fn from_string(s: &str) -> Result<Self> {
        let mut parts = s.splitn(2, ':');
        let algorithm = parts
            .next()
            .ok_or_else(|| CaskError::InvalidKey(s.to_string()))?;
        let value = parts
            .next()
            .ok_or_else(|| CaskError::InvalidKey(s.to_string()))?;

        if algorithm != ALGORITHM {
            return Err(CaskError::InvalidKey(format!(
                "unsupported algorithm: {algorithm}"
            )));
        }
        if value.len() != HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CaskError::InvalidKey(format!("invalid hash value: {value}")));
        }

        Ok(Key {
            algorithm: algorithm.to_string(),
            value: value.to_ascii_lowercase(),
        })
    }

    /// Reconstruct a key from a backend's on-disk path, e.g.
    /// `.../sha1/ae/28/.../99/data` — the directory holds the algorithm
    /// followed by 20 two-character hex segments.
    pub fn from_path(path: &str) -> Result<Self> {
        let dir = match path.rsplit_once('/') {
            Some((dir, _file)) => dir,
            None => return Err(CaskError::InvalidKey(path.to_string())),
        };
        let parts: Vec<&str> = dir.split('/').collect();
        if parts.len() < PATH_SEGMENTS + 1 {
            return Err(CaskError::InvalidKey(format!(
                "not enough path segments: {path}"
            )));
        }
        let algorithm = parts[parts.len() - PATH_SEGMENTS - 1];
        let value: String = parts[parts.len() - PATH_SEGMENTS..].concat();
        if value.len() != HEX_LEN {
            return Err(CaskError::InvalidKey(format!(
                "invalid hash length: {} ({})",
                value.len(),
                value
            )));
        }
        Self::from_string(&format!("{algorithm}:{value}"))
    }

    /// Compute the key for a byte slice (sha1 is the only supported algorithm).
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(data);
        Key {
            algorithm: ALGORITHM.to_string(),
            value: hex::encode(hasher.finalize()),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The 20 two-character directory segments, joined by `/`.
    pub fn as_path(&self) -> String {
        self.value
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).expect("hex is ascii"))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// `algorithm == "sha1" && value.len() == 40 && value is hex`.
    pub fn valid(&self) -> bool {
        self.algorithm == ALGORITHM
            && self.value.len() == HEX_LEN
            && self.value.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Key::from_string(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_matches_spec_example() {
        let k = Key::from_path(
            "sha1/ae/28/60/5f/0f/fc/34/fe/53/14/34/2f/78/ef/aa/13/ee/45/f6/99/data",
        )
        .unwrap();
        assert_eq!(k.to_string(), "sha1:ae28605f0ffc34fe5314342f78efaa13ee45f699");
    }

    #[test]
    fn string_round_trip() {
        let s = "sha1:ae28605f0ffc34fe5314342f78efaa13ee45f699";
        let k = Key::from_string(s).unwrap();
        assert_eq!(k.to_string(), s);
    }

    #[test]
    fn path_round_trip() {
        let s = "sha1:ae28605f0ffc34fe5314342f78efaa13ee45f699";
        let k = Key::from_string(s).unwrap();
        let path = format!("{}/{}/data", k.algorithm(), k.as_path());
        let reparsed = Key::from_path(&path).unwrap();
        assert_eq!(k, reparsed);
    }

    #[test]
    fn rejects_non_sha1_algorithm() {
        assert!(Key::from_string("md5:ae28605f0ffc34fe5314342f78efaa13ee45f699").is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Key::from_string("sha1:deadbeef").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "sha1:zz28605f0ffc34fe5314342f78efaa13ee45f699";
        assert!(Key::from_string(bad).is_err());
    }

    #[test]
    fn from_bytes_is_deterministic() {
        let a = Key::from_bytes(b"hello world");
        let b = Key::from_bytes(b"hello world");
        assert_eq!(a, b);
        assert!(a.valid());
    }
}
