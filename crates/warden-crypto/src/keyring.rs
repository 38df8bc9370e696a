use serde::{Deserialize, Serialize};

use warden_core::types::{Ed25519PublicKey, TimestampUs};

/// One published verification key and the instant it became valid.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRingEntry {
    pub public_key: Ed25519PublicKey,
    pub valid_from_us: TimestampUs,
}

/// The set of verification keys trusted for ledger signatures.
///
/// Rotation is modeled by adding a new key with a later `valid_from`;
/// verification selects the key whose validity interval covers the entry's
/// timestamp (an interval runs from its `valid_from` to the next key's).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeyRing {
    entries: Vec<KeyRingEntry>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ring with a single key valid from the beginning of time.
    pub fn single(public_key: Ed25519PublicKey) -> Self {
        Self {
            entries: vec![KeyRingEntry {
                public_key,
                valid_from_us: i64::MIN,
            }],
        }
    }

    /// Insert a key, keeping entries sorted by `valid_from_us`.
    pub fn insert(&mut self, public_key: Ed25519PublicKey, valid_from_us: TimestampUs) {
        self.entries.push(KeyRingEntry {
            public_key,
            valid_from_us,
        });
        self.entries.sort_by_key(|e| e.valid_from_us);
    }

    /// The key valid at `timestamp_us`: the newest entry whose `valid_from`
    /// is not after it. None when the ring is empty or every key is newer.
    pub fn key_valid_at(&self, timestamp_us: TimestampUs) -> Option<&Ed25519PublicKey> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.valid_from_us <= timestamp_us)
            .map(|e| &e.public_key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[KeyRingEntry] {
        &self.entries
    }
}
