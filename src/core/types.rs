//! Common types used across fedhpo modules.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;

/// Identifier of a federated participant.
pub type ParticipantId = String;

/// Named scalar metrics, ordered by key for stable output.
pub type MetricsMap = BTreeMap<String, f64>;

/// A 256-bit digest (SHA3-256) identifying a feature layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Digest an ordered sequence of parts.
    ///
    /// Parts are newline-terminated so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn of_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha3_256::new();
        for part in parts {
            hasher.update(part.as_ref().as_bytes());
            hasher.update(b"\n");
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&hasher.finalize());
        Self(arr)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
