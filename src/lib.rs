//! `kv` is an embeddable, single-process key-value database with MVCC
//! transactions layered over an LSM-tree storage engine.
//!
//! Records are grouped into namespaces ([`store::Store`]), each backed by a
//! shared [`storage::Engine`]. Keys carry their own versioning
//! (`xmin`/`xmax`), so a single engine substrate serves both a
//! non-transactional [`store::Store`] and a transactional
//! [`tx_store::TxStore`] without any separate locking layer.
//!
//! ## Getting started
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use kv::bvalue::Value;
//! use kv::db::Database;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     name: String,
//! }
//!
//! fn main() -> Result<(), kv::error::Error> {
//!     let db = Database::open_in_memory();
//!     let users = db.use_collection::<User>("users");
//!
//!     let pk = Value::from("1");
//!     users.upsert(pk.clone(), &User { name: "ada".to_string() })?;
//!     assert_eq!(users.find(&pk)?.map(|u| u.name), Some("ada".to_string()));
//!
//!     users.tx(|tx| -> Result<(), kv::error::Error> {
//!         tx.delete(&pk)?;
//!         Ok(())
//!     })?;
//!     assert_eq!(users.find(&pk)?, None);
//!
//!     Ok(())
//! }
//! ```

pub mod bvalue;
pub mod codec;
pub mod db;
pub mod error;
pub mod key;
pub mod mvcc;
pub mod store;
pub mod storage;
pub mod tx_store;
pub mod txid;
