//! A single read/write transaction over one namespace, grounded on
//! `examples/original_source/collection/collection.go`'s `Tx`/`tx.Store`
//! machinery and spec.md §4.4.
//!
//! Writes made inside a transaction land as `unc` keys tagged with the
//! transaction's own id, invisible to everyone else until [`TxStore::commit`]
//! promotes them to `com` keys. A delete of a row the transaction itself
//! inserted removes that insert and replaces it with a tombstone carrying the
//! same payload, so the payload is still around at commit time to become the
//! final dead committed version.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::bvalue::Value;
use crate::codec::Codec;
use crate::error::Result;
use crate::key::{Key, KeyType};
use crate::mvcc;
use crate::storage::Engine;
use crate::txid::TxId;

pub struct TxStore<R, C> {
    ns: String,
    engine: Arc<dyn Engine>,
    codec: C,
    tx_id: TxId,
    _marker: PhantomData<R>,
}

impl<R, C: Codec<R>> TxStore<R, C> {
    pub(crate) fn new(ns: String, engine: Arc<dyn Engine>, codec: C, tx_id: TxId) -> Self {
        TxStore { ns, engine, codec, tx_id, _marker: PhantomData }
    }

    pub fn id(&self) -> TxId {
        self.tx_id
    }

    /// The `unc` key this transaction's own, not-yet-committed insert of
    /// `pk` lives at.
    fn own_insert_key(&self, pk: &Value) -> Result<Key> {
        Key::uncommitted(KeyType::Rec, self.ns.as_str(), "pk", pk.clone(), self.tx_id, TxId::MAX)
    }

    /// The `unc` key a delete of `pk` by this transaction records its
    /// tombstone at: `xmin == xmax == tx_id` marks it as a deletion rather
    /// than an insert.
    fn own_tombstone_key(&self, pk: &Value) -> Result<Key> {
        Key::uncommitted(KeyType::Rec, self.ns.as_str(), "pk", pk.clone(), self.tx_id, self.tx_id)
    }

    /// Reads `pk` as this transaction would see it: its own uncommitted
    /// writes take precedence over whatever was committed before the
    /// transaction started.
    pub fn find(&self, pk: &Value) -> Result<Option<R>> {
        if let Some(bytes) = mvcc::find_exact(self.engine.as_ref(), &self.own_insert_key(pk)?)? {
            return Ok(Some(self.codec.decode(&bytes)?));
        }
        if mvcc::find_exact(self.engine.as_ref(), &self.own_tombstone_key(pk)?)?.is_some() {
            return Ok(None);
        }
        match mvcc::find_latest_committed(
            self.engine.as_ref(),
            KeyType::Rec,
            &self.ns,
            "pk",
            pk,
            self.tx_id,
        )? {
            Some((_, bytes)) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stages an insert/update under this transaction's own `unc` key.
    /// Invisible to every other reader until [`TxStore::commit`].
    pub fn upsert(&self, pk: Value, record: &R) -> Result<()> {
        let key = self.own_insert_key(&pk)?;
        let bytes = self.codec.encode(record)?;
        self.engine.set(key.format().as_bytes(), bytes)
    }

    /// Stages a delete: records a tombstone carrying the row's current
    /// payload (its own pending insert if any, else the latest committed
    /// version), without touching the committed row itself.
    pub fn delete(&self, pk: &Value) -> Result<()> {
        let own_key = self.own_insert_key(pk)?;
        let payload = if let Some(bytes) = mvcc::find_exact(self.engine.as_ref(), &own_key)? {
            self.engine.delete(own_key.format().as_bytes())?;
            Some(bytes)
        } else {
            mvcc::find_latest_committed(
                self.engine.as_ref(),
                KeyType::Rec,
                &self.ns,
                "pk",
                pk,
                self.tx_id,
            )?
            .map(|(_, bytes)| bytes)
        };

        if let Some(bytes) = payload {
            let tombstone = self.own_tombstone_key(pk)?;
            self.engine.set(tombstone.format().as_bytes(), bytes)?;
        }
        Ok(())
    }

    /// Promotes every `unc` key this transaction wrote to its `com`
    /// counterpart, under `end_id`. Inserts become committed rows born at
    /// `end_id`; tombstones become committed rows that lived from their
    /// `xmin` (== `tx_id`) until `end_id`. The promoted `unc` keys are left
    /// in place rather than removed, matching the reference implementation.
    pub fn commit(self, end_id: TxId) -> Result<()> {
        let insert_prefix =
            Key::uncommitted_tx_prefix(KeyType::Rec, &self.ns, self.tx_id, TxId::MAX);
        for (raw_key, raw_value) in self.engine.scan_prefix(insert_prefix.as_bytes())? {
            let unc = Key::parse(&String::from_utf8_lossy(&raw_key))?;
            let com = Key::committed(unc.ktype, unc.ns, unc.field, unc.value, end_id, TxId::MAX)?;
            self.engine.set(com.format().as_bytes(), raw_value)?;
        }

        let tombstone_prefix =
            Key::uncommitted_tx_prefix(KeyType::Rec, &self.ns, self.tx_id, self.tx_id);
        for (raw_key, raw_value) in self.engine.scan_prefix(tombstone_prefix.as_bytes())? {
            let unc = Key::parse(&String::from_utf8_lossy(&raw_key))?;
            let com = Key::committed(unc.ktype, unc.ns, unc.field, unc.value, unc.xmin, end_id)?;
            self.engine.set(com.format().as_bytes(), raw_value)?;
        }

        Ok(())
    }

    /// Discards every `unc` key this transaction wrote. Safe to call more
    /// than once: deleting an absent key is not an error.
    pub fn rollback(self) -> Result<()> {
        let insert_prefix =
            Key::uncommitted_tx_prefix(KeyType::Rec, &self.ns, self.tx_id, TxId::MAX);
        for (raw_key, _) in self.engine.scan_prefix(insert_prefix.as_bytes())? {
            self.engine.delete(&raw_key)?;
        }

        let tombstone_prefix =
            Key::uncommitted_tx_prefix(KeyType::Rec, &self.ns, self.tx_id, self.tx_id);
        for (raw_key, _) in self.engine.scan_prefix(tombstone_prefix.as_bytes())? {
            self.engine.delete(&raw_key)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::storage::memory::MemoryEngine;
    use crate::txid::{Issuer, MutexIssuer};
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        note: String,
    }

    fn engine() -> Arc<dyn Engine> {
        Arc::new(MemoryEngine::new())
    }

    #[test]
    fn own_writes_are_visible_before_commit() {
        let engine = engine();
        let issuer = MutexIssuer::new();
        let tx_id = issuer.issue();
        let txs = TxStore::new("users".into(), engine, JsonCodec::new(), tx_id);

        let pk = Value::from("1");
        txs.upsert(pk.clone(), &Row { note: "a".into() }).unwrap();
        assert_eq!(txs.find(&pk).unwrap(), Some(Row { note: "a".into() }));
    }

    #[test]
    fn uncommitted_write_is_invisible_to_a_fresh_reader() {
        let engine = engine();
        let issuer = MutexIssuer::new();
        let tx_id = issuer.issue();
        let txs = TxStore::new("users".into(), engine.clone(), JsonCodec::new(), tx_id);
        let pk = Value::from("1");
        txs.upsert(pk.clone(), &Row { note: "a".into() }).unwrap();

        let viewer = issuer.issue();
        let seen = mvcc::find_latest_committed(
            engine.as_ref(),
            KeyType::Rec,
            "users",
            "pk",
            &pk,
            viewer,
        )
        .unwrap();
        assert!(seen.is_none());
    }

    #[test]
    fn commit_promotes_inserts_to_committed_rows() {
        let engine = engine();
        let issuer = MutexIssuer::new();
        let tx_id = issuer.issue();
        let txs = TxStore::new("users".into(), engine.clone(), JsonCodec::new(), tx_id);
        let pk = Value::from("1");
        txs.upsert(pk.clone(), &Row { note: "a".into() }).unwrap();
        let end_id = issuer.issue();
        txs.commit(end_id).unwrap();

        let viewer = issuer.issue();
        let (_, bytes) = mvcc::find_latest_committed(
            engine.as_ref(),
            KeyType::Rec,
            "users",
            "pk",
            &pk,
            viewer,
        )
        .unwrap()
        .unwrap();
        let decoded: Row = JsonCodec::new().decode(&bytes).unwrap();
        assert_eq!(decoded, Row { note: "a".into() });
    }

    #[test]
    fn rollback_discards_every_staged_write() {
        let engine = engine();
        let issuer = MutexIssuer::new();
        let tx_id = issuer.issue();
        let txs = TxStore::new("users".into(), engine.clone(), JsonCodec::new(), tx_id);
        let pk = Value::from("1");
        txs.upsert(pk.clone(), &Row { note: "a".into() }).unwrap();
        txs.rollback().unwrap();

        assert!(engine.to_map().unwrap().is_empty());
    }

    #[test]
    fn commit_of_delete_makes_row_invisible_afterward() {
        let engine = engine();
        let issuer = MutexIssuer::new();
        let codec = JsonCodec::new();
        let pk = Value::from("1");

        let tx1 = issuer.issue();
        let insert = TxStore::new("users".into(), engine.clone(), codec.clone(), tx1);
        insert.upsert(pk.clone(), &Row { note: "a".into() }).unwrap();
        let end1 = issuer.issue();
        insert.commit(end1).unwrap();

        let tx2 = issuer.issue();
        let delete = TxStore::new("users".into(), engine.clone(), codec.clone(), tx2);
        delete.delete(&pk).unwrap();
        let end2 = issuer.issue();
        delete.commit(end2).unwrap();

        let viewer = issuer.issue();
        let seen = mvcc::find_latest_committed(
            engine.as_ref(),
            KeyType::Rec,
            "users",
            "pk",
            &pk,
            viewer,
        )
        .unwrap();
        assert!(seen.is_none());
    }
}
