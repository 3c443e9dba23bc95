use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TypeError;

/// Alphabet for generated ids: URL-safe, no lookalike-sensitive ordering.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Number of alphabet characters in a generated id.
///
/// 12 characters over a 64-symbol alphabet gives 72 bits of randomness,
/// which is collision-free for any practical record count.
const GENERATED_LEN: usize = 12;

/// Opaque short unique identifier for a persisted object.
///
/// Ids are assigned by the collection store at creation time and embedded
/// into the object's payload; callers never supply them. The store treats
/// the contents as opaque — any non-empty string read back from a log is a
/// valid id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..GENERATED_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Construct an id from an existing string (e.g. read back from a log).
    pub fn parse(s: impl Into<String>) -> Result<Self, TypeError> {
        let s = s.into();
        if s.is_empty() {
            return Err(TypeError::EmptyObjectId);
        }
        Ok(Self(s))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_expected_length() {
        let id = ObjectId::generate();
        assert_eq!(id.as_str().len(), GENERATED_LEN);
    }

    #[test]
    fn generated_ids_use_alphabet() {
        let id = ObjectId::generate();
        assert!(id.as_str().bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn generated_ids_are_distinct() {
        let ids: std::collections::HashSet<_> =
            (0..1000).map(|_| ObjectId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(ObjectId::parse(""), Err(TypeError::EmptyObjectId));
    }

    #[test]
    fn parse_accepts_arbitrary_nonempty() {
        let id = ObjectId::parse("legacy-id-7").unwrap();
        assert_eq!(id.as_str(), "legacy-id-7");
    }

    #[test]
    fn display_is_raw_string() {
        let id = ObjectId::parse("abc123").unwrap();
        assert_eq!(format!("{id}"), "abc123");
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn deserialize_rejects_empty_string() {
        assert!(serde_json::from_str::<ObjectId>("\"\"").is_err());
    }
}
