//! A plain in-memory `Engine`, backed by a `BTreeMap` under a
//! `parking_lot::RwLock` so it satisfies the same `&self` contract as
//! [`super::lsm::LsmEngine`].

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::{Engine, Status};

#[derive(Default)]
pub struct MemoryEngine {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.data.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>> {
        let prefix = prefix.to_vec();
        let data = self.data.read();
        let matches: Vec<_> = data
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(matches.into_iter()))
    }

    fn status(&self) -> Result<Status> {
        let data = self.data.read();
        Ok(Status {
            name: "memory".to_string(),
            keys: data.len() as u64,
            size: data.iter().fold(0, |n, (k, v)| n + k.len() as u64 + v.len() as u64),
            total_disk_size: 0,
            live_disk_size: 0,
            garbage_disk_size: 0,
        })
    }
}
