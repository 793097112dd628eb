//! Non-transactional access to one namespace: every call commits
//! immediately, grounded on `examples/original_source/collection/collection.go`'s
//! `Store[R]` (`Upsert`/`Delete`/`Find`/`Tx`).
//!
//! Unlike [`crate::tx_store::TxStore`], writes here go straight to `com`
//! keys -- there is no staging period, and so no commit/rollback step.
//! [`Store::tx`] is the bridge to the transactional API: it issues the
//! transaction's start id, builds a [`crate::tx_store::TxStore`], runs the
//! caller's closure, and commits or rolls back depending on whether the
//! closure returned `Ok`.

use std::sync::Arc;

use crate::bvalue::Value;
use crate::codec::Codec;
use crate::error::Result;
use crate::key::{Key, KeyType};
use crate::mvcc;
use crate::storage::Engine;
use crate::tx_store::TxStore;
use crate::txid::{Issuer, TxId};

pub struct Store<R, C> {
    ns: String,
    engine: Arc<dyn Engine>,
    codec: C,
    issuer: Arc<dyn Issuer>,
    _marker: std::marker::PhantomData<R>,
}

impl<R, C: Codec<R>> Store<R, C> {
    pub fn new(
        ns: impl Into<String>,
        engine: Arc<dyn Engine>,
        codec: C,
        issuer: Arc<dyn Issuer>,
    ) -> Self {
        Store { ns: ns.into(), engine, codec, issuer, _marker: std::marker::PhantomData }
    }

    pub fn name(&self) -> &str {
        &self.ns
    }

    /// Reads the latest committed version of `pk`, as seen by a snapshot
    /// taken right now.
    pub fn find(&self, pk: &Value) -> Result<Option<R>> {
        let viewer = self.issuer.issue();
        match mvcc::find_latest_committed(
            self.engine.as_ref(),
            KeyType::Rec,
            &self.ns,
            "pk",
            pk,
            viewer,
        )? {
            Some((_, bytes)) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Writes `record` as the committed row for `pk`, born now and never
    /// (yet) deleted.
    pub fn upsert(&self, pk: Value, record: &R) -> Result<()> {
        let id = self.issuer.issue();
        let key = Key::committed(KeyType::Rec, self.ns.as_str(), "pk", pk, id, TxId::MAX)?;
        let bytes = self.codec.encode(record)?;
        self.engine.set(key.format().as_bytes(), bytes)
    }

    /// Finds the latest committed row for `pk` and re-writes it with
    /// `xmax` set to a freshly issued id, leaving the old version in place
    /// (it remains visible to readers who started before this delete).
    pub fn delete(&self, pk: &Value) -> Result<()> {
        let id = self.issuer.issue();
        if let Some((key, bytes)) =
            mvcc::find_latest_committed(self.engine.as_ref(), KeyType::Rec, &self.ns, "pk", pk, id)?
        {
            let mut dead = key.clone();
            dead.xmax = id;
            self.engine.set(dead.format().as_bytes(), bytes)?;
            self.engine.delete(key.format().as_bytes())?;
        }
        Ok(())
    }

    /// Runs `body` against a fresh [`TxStore`]: commits on `Ok`, rolls back
    /// on `Err`.
    pub fn tx<F, E>(&self, body: F) -> std::result::Result<(), E>
    where
        F: FnOnce(&TxStore<R, C>) -> std::result::Result<(), E>,
        E: From<crate::error::Error>,
    {
        let start_id = self.issuer.issue();
        let txs = TxStore::new(self.ns.clone(), self.engine.clone(), self.codec.clone(), start_id);

        match body(&txs) {
            Ok(()) => {
                let end_id = self.issuer.issue();
                txs.commit(end_id).map_err(E::from)
            }
            Err(err) => {
                txs.rollback().map_err(E::from)?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::storage::memory::MemoryEngine;
    use crate::txid::MutexIssuer;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        note: String,
    }

    fn store() -> Store<Row, JsonCodec> {
        Store::new(
            "users",
            Arc::new(MemoryEngine::new()),
            JsonCodec::new(),
            Arc::new(MutexIssuer::new()),
        )
    }

    #[test]
    fn upsert_is_immediately_visible() {
        let s = store();
        let pk = Value::from("1");
        s.upsert(pk.clone(), &Row { note: "a".into() }).unwrap();
        assert_eq!(s.find(&pk).unwrap(), Some(Row { note: "a".into() }));
    }

    #[test]
    fn upsert_overwrites_without_a_transaction() {
        let s = store();
        let pk = Value::from("1");
        s.upsert(pk.clone(), &Row { note: "a".into() }).unwrap();
        s.upsert(pk.clone(), &Row { note: "b".into() }).unwrap();
        assert_eq!(s.find(&pk).unwrap(), Some(Row { note: "b".into() }));
    }

    #[test]
    fn delete_makes_row_not_found() {
        let s = store();
        let pk = Value::from("1");
        s.upsert(pk.clone(), &Row { note: "a".into() }).unwrap();
        s.delete(&pk).unwrap();
        assert_eq!(s.find(&pk).unwrap(), None);
    }

    #[test]
    fn delete_of_absent_row_is_a_no_op() {
        let s = store();
        let pk = Value::from("absent");
        assert!(s.delete(&pk).is_ok());
    }

    #[test]
    fn tx_commits_on_ok() {
        let s = store();
        let pk = Value::from("1");
        let result: std::result::Result<(), crate::error::Error> = s.tx(|txs| {
            txs.upsert(pk.clone(), &Row { note: "a".into() })?;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(s.find(&pk).unwrap(), Some(Row { note: "a".into() }));
    }

    #[test]
    fn tx_rolls_back_on_err() {
        let s = store();
        let pk = Value::from("1");
        let result: std::result::Result<(), crate::error::Error> = s.tx(|txs| {
            txs.upsert(pk.clone(), &Row { note: "a".into() })?;
            Err(crate::error::Error::UserAborted("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(s.find(&pk).unwrap(), None);
    }
}
