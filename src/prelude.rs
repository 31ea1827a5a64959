//! Prelude module for convenient imports.
//!
//! ```rust
//! use unikv::prelude::*;
//! ```

pub use crate::codec::Codec;
pub use crate::config::{CodecConfig, FileConfig, Form, MemoryConfig, Mode};
pub use crate::databases::directory::{DirectoryBackend, DirectoryStore};
pub use crate::databases::memory::{MemoryBackend, MemoryStore};
pub use crate::errors::{UnikvError, UnikvResult};
pub use crate::query::{Field, Filter, WHOLE_VALUE_FIELD};
pub use crate::scoped::{Open, Scoped, ScopedStore};
pub use crate::store::Store;
pub use crate::traits::{Access, Backend, IntoEntries, Persistent};
pub use crate::value::{Value, ValueKind};

#[cfg(feature = "redb")]
pub use crate::databases::redb_store::{RedbBackend, RedbOpener, RedbStore};

#[cfg(feature = "sled")]
pub use crate::databases::sled_store::{SledBackend, SledStore};
