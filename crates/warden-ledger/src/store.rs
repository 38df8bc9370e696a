use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use warden_core::entry::{LedgerEntry, LedgerTail};
use warden_core::error::WardenError;
use warden_core::types::Seq;

/// Persistent ledger database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   entries — tenant_bytes ‖ 0x00 ‖ seq_be8 → bincode(LedgerEntry)
///   tails   — tenant_bytes                  → bincode(LedgerTail)
///
/// The identifier grammar forbids NUL, so the 0x00 separator is unambiguous.
/// Entry persist and tail advance happen in one sled transaction followed by
/// an explicit flush; that flush is the durability point an append
/// acknowledgement stands on.
pub struct LedgerDb {
    db: sled::Db,
    entries: sled::Tree,
    tails: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> WardenError {
    WardenError::Storage(e.to_string())
}

fn entry_key(tenant: &str, seq: Seq) -> Vec<u8> {
    let mut key = Vec::with_capacity(tenant.len() + 9);
    key.extend_from_slice(tenant.as_bytes());
    key.push(0);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

impl LedgerDb {
    /// Open or create the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WardenError> {
        let db = sled::open(path).map_err(storage_err)?;
        let entries = db.open_tree("entries").map_err(storage_err)?;
        let tails = db.open_tree("tails").map_err(storage_err)?;
        Ok(Self { db, entries, tails })
    }

    /// In-memory database for tests and ephemeral runs.
    pub fn open_temporary() -> Result<Self, WardenError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        let entries = db.open_tree("entries").map_err(storage_err)?;
        let tails = db.open_tree("tails").map_err(storage_err)?;
        Ok(Self { db, entries, tails })
    }

    // ── Entries ──────────────────────────────────────────────────────────────

    pub fn get_entry(&self, tenant: &str, seq: Seq) -> Result<Option<LedgerEntry>, WardenError> {
        match self
            .entries
            .get(entry_key(tenant, seq))
            .map_err(storage_err)?
        {
            Some(bytes) => {
                let entry = bincode::deserialize(&bytes)
                    .map_err(|e| WardenError::Serialization(e.to_string()))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Raw write of a single entry. Normal appends go through `commit_entry`;
    /// this exists for recovery tooling and tamper tests.
    pub fn put_entry(&self, entry: &LedgerEntry) -> Result<(), WardenError> {
        let bytes =
            bincode::serialize(entry).map_err(|e| WardenError::Serialization(e.to_string()))?;
        self.entries
            .insert(entry_key(&entry.tenant_id, entry.seq), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    // ── Tails ────────────────────────────────────────────────────────────────

    pub fn get_tail(&self, tenant: &str) -> Result<Option<LedgerTail>, WardenError> {
        match self.tails.get(tenant.as_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let tail = bincode::deserialize(&bytes)
                    .map_err(|_| WardenError::TailCorrupt(tenant.to_string()))?;
                Ok(Some(tail))
            }
            None => Ok(None),
        }
    }

    /// Every tenant that owns a chain, with its tail.
    pub fn iter_tails(&self) -> Result<Vec<(String, LedgerTail)>, WardenError> {
        let mut out = Vec::new();
        for item in self.tails.iter() {
            let (key, bytes) = item.map_err(storage_err)?;
            let tenant = String::from_utf8(key.to_vec())
                .map_err(|e| WardenError::Serialization(e.to_string()))?;
            let tail = bincode::deserialize(&bytes)
                .map_err(|_| WardenError::TailCorrupt(tenant.clone()))?;
            out.push((tenant, tail));
        }
        Ok(out)
    }

    // ── Atomic append commit ─────────────────────────────────────────────────

    /// Persist `entry` and advance the tenant tail in one transaction, then
    /// flush. Returns only after the write is durable; on failure neither
    /// the entry nor the tail advance is visible.
    pub fn commit_entry(&self, entry: &LedgerEntry) -> Result<(), WardenError> {
        let entry_bytes =
            bincode::serialize(entry).map_err(|e| WardenError::Serialization(e.to_string()))?;
        let tail = LedgerTail {
            seq: entry.seq,
            entry_hash: entry.entry_hash,
            timestamp_us: entry.timestamp_us,
        };
        let tail_bytes =
            bincode::serialize(&tail).map_err(|e| WardenError::Serialization(e.to_string()))?;

        let key = entry_key(&entry.tenant_id, entry.seq);
        let tenant_key = entry.tenant_id.as_bytes().to_vec();

        (&self.entries, &self.tails)
            .transaction(|(entries, tails)| {
                entries.insert(key.as_slice(), entry_bytes.as_slice())?;
                tails.insert(tenant_key.as_slice(), tail_bytes.as_slice())?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| storage_err(format!("append transaction: {e:?}")))?;

        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), WardenError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}
