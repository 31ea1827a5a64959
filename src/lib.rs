//! # unikv
//!
//! One key-value contract over many storage engines. Calling code talks to a
//! [`Store`](store::Store) and never depends on the backend behind it.
//!
//! The crate is built from three pieces:
//!
//! - [`codec`]: turns any [`Value`](value::Value) into a tagged scalar a
//!   bytes-only backend can hold, or passes strings and bytes through as-is in
//!   strict mode.
//! - [`query`]: gives every backend the same pattern and field-condition scan
//!   semantics, evaluated client-side unless the backend can narrow the scan.
//! - [`scoped`]: lets backends without a durable handle (single-file
//!   databases) be opened and released around every call.
//!
//! ## Backends
//!
//! | store | backend | access |
//! |---|---|---|
//! | `MemoryStore` | insertion-ordered map | always open |
//! | `DirectoryStore` | one file per entry | always open |
//! | `SledStore` | sled tree (feature `sled`) | always open |
//! | `RedbStore` | redb file (feature `redb`) | scoped |
//!
//! ## Quick Start
//!
//! ```rust
//! use unikv::prelude::*;
//!
//! let mut store = MemoryStore::memory(CodecConfig::default());
//! store.set("answer", 42)?;
//! store.update([("a", 1), ("b", 2)])?;
//!
//! assert_eq!(store.get("answer")?, Some(Value::from(42)));
//! assert_eq!(store.get_or("missing", "d")?, Value::from("d"));
//! assert_eq!(store.len()?, 3);
//!
//! let small: Vec<Value> = store
//!     .items(&Filter::value(1), None)?
//!     .map(|entry| entry.map(|(key, _)| key))
//!     .collect::<UnikvResult<_>>()?;
//! assert_eq!(small, vec![Value::from("a")]);
//! # Ok::<(), unikv::errors::UnikvError>(())
//! ```

pub mod codec;
pub mod config;
pub mod databases;
pub mod errors;
pub mod prelude;
pub mod query;
pub mod scoped;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod value;
