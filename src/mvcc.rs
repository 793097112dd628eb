//! MVCC visibility helpers shared by [`crate::store::Store`] and
//! [`crate::tx_store::TxStore`]. Grounded on
//! `examples/original_source/internal` (`FindLatestCommitted`/`FindExact`) and
//! on spec.md §4.3.

use crate::bvalue::Value;
use crate::error::Result;
use crate::key::{Key, KeyType};
use crate::storage::Engine;
use crate::txid::TxId;

/// Finds the committed version of `(ns, field, value)` visible to
/// `viewer_id`.
///
/// Every committed key for the same logical row shares the prefix
/// `rec_com_{ns}_{field}_{value}_`, differing only in `xmin`/`xmax`. Among
/// the versions that existed by the time `viewer_id` was issued (`xmin <=
/// viewer_id`), the one with the greatest `xmin` is the most recent; it is
/// visible only if it had not yet been superseded by a delete (`xmax <=
/// viewer_id` means it was).
pub fn find_latest_committed(
    engine: &dyn Engine,
    ktype: KeyType,
    ns: &str,
    field: &str,
    value: &Value,
    viewer_id: TxId,
) -> Result<Option<(Key, Vec<u8>)>> {
    let prefix = Key::committed_prefix(ktype, ns, field, value);
    let mut best: Option<(Key, Vec<u8>)> = None;

    for (raw_key, raw_value) in engine.scan_prefix(prefix.as_bytes())? {
        let key_str = String::from_utf8_lossy(&raw_key);
        let parsed = Key::parse(&key_str)?;
        if !parsed.xmin.less(viewer_id) {
            continue;
        }
        let supersedes = match &best {
            Some((current, _)) => parsed.xmin.as_u64() > current.xmin.as_u64(),
            None => true,
        };
        if supersedes {
            best = Some((parsed, raw_value));
        }
    }

    Ok(match best {
        Some((key, _)) if key.xmax.as_u64() <= viewer_id.as_u64() => None,
        found => found,
    })
}

/// Looks a single fully-formed key up directly, with no visibility logic.
pub fn find_exact(engine: &dyn Engine, key: &Key) -> Result<Option<Vec<u8>>> {
    engine.get(key.format().as_bytes())
}
