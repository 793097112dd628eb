//! The key/value storage substrate beneath the MVCC layer: an [`Engine`]
//! trait with a plain in-memory implementation ([`memory::MemoryEngine`]) for
//! tests and a persistent LSM-tree implementation ([`lsm::LsmEngine`]).

pub mod lsm;
pub mod memory;

use crate::error::Result;

/// Engine-reported size/shape statistics, surfaced for observability.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Status {
    pub name: String,
    pub keys: u64,
    pub size: u64,
    pub total_disk_size: u64,
    pub live_disk_size: u64,
    pub garbage_disk_size: u64,
}

/// A key/value storage engine over arbitrary byte-string keys and values,
/// stored in lexicographical key order.
///
/// Every method takes `&self`: concurrency, if any, is the implementation's
/// problem (the LSM engine serializes writers internally and lets readers
/// run lock-free against immutable data), which is what lets [`crate::tx_store::TxStore`]
/// share one engine across many transactions without wrapping it itself.
pub trait Engine: Send + Sync {
    /// Gets the value for a key, if present.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Sets a value for a key, replacing any existing value.
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Deletes a key. Idempotent: deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Iterates, in key order, over every entry whose key starts with
    /// `prefix`.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>>;

    /// Engine status, for diagnostics.
    fn status(&self) -> Result<Status>;

    /// Debugging dump of the whole substrate; not on any hot path.
    fn to_map(&self) -> Result<std::collections::BTreeMap<Vec<u8>, Vec<u8>>> {
        Ok(self.scan_prefix(&[])?.collect())
    }
}
