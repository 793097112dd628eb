//! Database-level glue: opens an [`Engine`] and hands out namespaced
//! [`Store`]s over it, each sharing the same engine and id issuer. There is
//! no registry of namespaces to manage -- a `Store` is just a thin,
//! disposable view over the shared substrate.

use std::path::Path;
use std::sync::Arc;

use crate::codec::{Codec, JsonCodec};
use crate::error::Result;
use crate::storage::lsm::{LsmEngine, Options};
use crate::storage::memory::MemoryEngine;
use crate::storage::Engine;
use crate::store::Store;
use crate::txid::{Issuer, MutexIssuer};

/// An open database: one shared [`Engine`] and one shared [`Issuer`].
pub struct Database {
    engine: Arc<dyn Engine>,
    issuer: Arc<dyn Issuer>,
}

impl Database {
    /// Opens a persistent, LSM-backed database rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>, cfg: Options) -> Result<Self> {
        let engine: Arc<dyn Engine> = Arc::new(LsmEngine::open(dir, cfg)?);
        Ok(Database { engine, issuer: Arc::new(MutexIssuer::new()) })
    }

    /// Opens a purely in-memory database; useful for tests and
    /// short-lived embeddings that don't need durability.
    pub fn open_in_memory() -> Self {
        Database { engine: Arc::new(MemoryEngine::new()), issuer: Arc::new(MutexIssuer::new()) }
    }

    /// Builds a [`Store`] for one namespace using the default JSON codec.
    pub fn use_collection<R>(&self, ns: impl Into<String>) -> Store<R, JsonCodec>
    where
        JsonCodec: Codec<R>,
    {
        Store::new(ns, self.engine.clone(), JsonCodec::new(), self.issuer.clone())
    }

    /// Builds a [`Store`] for one namespace using a caller-supplied codec.
    pub fn use_collection_with_codec<R, C: Codec<R>>(
        &self,
        ns: impl Into<String>,
        codec: C,
    ) -> Store<R, C> {
        Store::new(ns, self.engine.clone(), codec, self.issuer.clone())
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }
}
