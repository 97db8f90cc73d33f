//! Entity handles.
//!
//! A [`Key`] names one stored document: its [`Kind`] plus a positive 64-bit
//! numeric id. The numeric id is what reply addresses are built from; the
//! encoded form (`Key::encode`) is what clients and stored documents see.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConvoError;

/// Largest id handed out by [`Key::generate`] (2^53 - 1, safe in JSON numbers).
const MAX_GENERATED_ID: i64 = (1 << 53) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    User,
    Thread,
    Event,
    Message,
    Secret,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::User => "User",
            Kind::Thread => "Thread",
            Kind::Event => "Event",
            Kind::Message => "Message",
            Kind::Secret => "Secret",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "User" => Some(Kind::User),
            "Thread" => Some(Kind::Thread),
            "Event" => Some(Kind::Event),
            "Message" => Some(Kind::Message),
            "Secret" => Some(Kind::Secret),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    kind: Kind,
    id: i64,
}

impl Key {
    pub fn new(kind: Kind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Allocate a fresh key with a random, scattered id.
    pub fn generate(kind: Kind) -> Self {
        let id = rand::thread_rng().gen_range(1..=MAX_GENERATED_ID);
        Self { kind, id }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// URL-safe, injective string form of the handle.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.kind, self.id))
    }

    pub fn decode(s: &str) -> Result<Self, ConvoError> {
        let malformed = || ConvoError::Malformed(s.to_string());

        let bytes = URL_SAFE_NO_PAD.decode(s.trim()).map_err(|_| malformed())?;
        let text = String::from_utf8(bytes).map_err(|_| malformed())?;
        let (kind, id) = text.split_once(':').ok_or_else(malformed)?;
        let kind = Kind::parse(kind).ok_or_else(malformed)?;
        let id: i64 = id.parse().map_err(|_| malformed())?;
        if id <= 0 {
            return Err(malformed());
        }

        // Reject non-canonical spellings such as "User:007".
        let key = Self { kind, id };
        if key.encode() != s.trim() {
            return Err(malformed());
        }
        Ok(key)
    }

    /// Decode and check the kind in one step.
    pub fn decode_kind(s: &str, kind: Kind) -> Result<Self, ConvoError> {
        let key = Self::decode(s)?;
        if key.kind != kind {
            return Err(ConvoError::Malformed(s.to_string()));
        }
        Ok(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Key {
    type Err = ConvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Key::decode(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Handle lists
// ---------------------------------------------------------------------------

pub fn contains(keys: &[Key], key: &Key) -> bool {
    keys.iter().any(|k| k == key)
}

/// Remove duplicates, keeping the first occurrence of each handle.
pub fn dedupe(keys: &[Key]) -> Vec<Key> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().filter(|k| seen.insert(**k)).copied().collect()
}

/// Replace every occurrence of `old` with `new`, then dedupe.
pub fn swap(keys: &[Key], old: &Key, new: &Key) -> Vec<Key> {
    let replaced: Vec<Key> = keys
        .iter()
        .map(|k| if k == old { *new } else { *k })
        .collect();
    dedupe(&replaced)
}

/// Remove `key` by moving the last element into its slot.
///
/// Returns the index the key was removed from, if it was present.
pub fn swap_remove(keys: &mut Vec<Key>, key: &Key) -> Option<usize> {
    let idx = keys.iter().position(|k| k == key)?;
    keys.swap_remove(idx);
    Some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> Key {
        Key::new(Kind::User, id)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for kind in [Kind::User, Kind::Thread, Kind::Event, Kind::Message] {
            let key = Key::generate(kind);
            let encoded = key.encode();
            assert!(encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            assert_eq!(Key::decode(&encoded).unwrap(), key);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Key::decode("").is_err());
        assert!(Key::decode("not base64 !!").is_err());
        assert!(Key::decode(&URL_SAFE_NO_PAD.encode("Dog:1")).is_err());
        assert!(Key::decode(&URL_SAFE_NO_PAD.encode("User:-4")).is_err());
        assert!(Key::decode(&URL_SAFE_NO_PAD.encode("User:007")).is_err());
    }

    #[test]
    fn test_decode_kind_mismatch() {
        let key = Key::new(Kind::Thread, 9);
        assert!(Key::decode_kind(&key.encode(), Kind::User).is_err());
        assert_eq!(Key::decode_kind(&key.encode(), Kind::Thread).unwrap(), key);
    }

    #[test]
    fn test_serde_as_string() {
        let key = user(42);
        let json = serde_json::to_value(key).unwrap();
        assert_eq!(json, serde_json::Value::String(key.encode()));
        let back: Key = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_dedupe_is_stable_and_idempotent() {
        let keys = vec![user(3), user(1), user(3), user(2), user(1)];
        let once = dedupe(&keys);
        assert_eq!(once, vec![user(3), user(1), user(2)]);
        assert_eq!(dedupe(&once), once);
    }

    #[test]
    fn test_swap_is_idempotent() {
        let keys = vec![user(1), user(2), user(3), user(2)];
        let once = swap(&keys, &user(2), &user(9));
        assert_eq!(once, vec![user(1), user(9), user(3)]);
        assert_eq!(swap(&once, &user(2), &user(9)), once);
    }

    #[test]
    fn test_swap_merges_into_existing() {
        let keys = vec![user(1), user(2)];
        assert_eq!(swap(&keys, &user(1), &user(2)), vec![user(2)]);
    }

    #[test]
    fn test_swap_remove_moves_last() {
        let mut keys = vec![user(1), user(2), user(3), user(4)];
        assert_eq!(swap_remove(&mut keys, &user(2)), Some(1));
        assert_eq!(keys, vec![user(1), user(4), user(3)]);
        assert_eq!(swap_remove(&mut keys, &user(7)), None);
    }
}
