//! Identifiers for users, battles, matchmaking sessions and submissions.

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DuelError;

type Blake2b128 = Blake2b<U16>;

/// Maximum accepted length of a user identifier, in bytes.
pub const MAX_USER_ID_LEN: usize = 128;

fn digest_parts(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Blake2b128::new();
    for part in parts {
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Opaque user identifier handed to us by the identity collaborator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a raw identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DuelError> {
        let s = raw.into();
        if s.is_empty() || s.len() > MAX_USER_ID_LEN {
            return Err(DuelError::InvalidUserId(s));
        }
        if s.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(DuelError::InvalidUserId(s));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = DuelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl FromStr for UserId {
    type Err = DuelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; 16]);

        impl $name {
            pub fn new(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Derive an identifier from its constituent parts.
            pub fn derive(parts: &[&[u8]]) -> Self {
                Self(digest_parts(parts))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = DuelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|_| DuelError::InvalidId(s.to_string()))?;
                let arr: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| DuelError::InvalidId(s.to_string()))?;
                Ok(Self(arr))
            }
        }

        // Hex in JSON, raw bytes in bincode.
        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    <[u8; 16]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

digest_id!(
    /// Identifier of a battle record.
    BattleId,
    "BattleId"
);

digest_id!(
    /// Identifier of a proof-of-compliance submission.
    SubmissionId,
    "SubmissionId"
);

/// Identifier of a matchmaking session, issued sequentially by the matchmaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty_and_whitespace() {
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("a b").is_err());
        assert!(UserId::parse("x".repeat(MAX_USER_ID_LEN + 1)).is_err());
        assert_eq!(UserId::parse("alice").unwrap().as_str(), "alice");
    }

    #[test]
    fn user_id_deserialization_validates() {
        let ok: Result<UserId, _> = serde_json::from_str("\"bob\"");
        assert!(ok.is_ok());
        let bad: Result<UserId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn battle_id_hex_parse() {
        let id = BattleId::derive(&[b"alice", b"bob", &7u64.to_be_bytes()]);
        let parsed: BattleId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("zz".parse::<BattleId>().is_err());
        assert!("abcd".parse::<BattleId>().is_err());
    }

    #[test]
    fn battle_id_is_hex_in_json() {
        let id = BattleId::new([0xab; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(16)));
        let back: BattleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert_eq!(bincode::serialize(&id).unwrap().len(), 16);
    }

    #[test]
    fn derive_is_boundary_sensitive() {
        let a = BattleId::derive(&[b"ab", b"c"]);
        let b = BattleId::derive(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }
}
