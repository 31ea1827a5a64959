//! Primitive driver surface every storage adapter supplies.
//!
//! Adapters only deal in raw scalars (`&[u8]`). Encoding, filtering, batching
//! semantics and snapshots are layered on top once, in [`crate::store`].

use std::path::PathBuf;

use crate::errors::UnikvResult;

/// One stored `(key, value)` pair, both already encoded.
pub type RawEntry = (Vec<u8>, Vec<u8>);

/// Lazy, forward-only sequence over a backend's stored pairs.
pub type RawEntries<'a> = Box<dyn Iterator<Item = UnikvResult<RawEntry>> + 'a>;

/// How a backend keeps its bytes on disk, when it can be copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLayout {
    /// A single database file.
    File(PathBuf),
    /// A directory holding one file per entry.
    Directory(PathBuf),
}

/// Core primitive operations for a single key space.
///
/// Only `name`, `get`, `put`, `remove`, `entries` and `count` are required.
/// The remaining methods have element-wise defaults; adapters override them
/// when the underlying store offers a native bulk or prefix primitive.
pub trait Backend {
    /// Short identifier used in logs and snapshot headers.
    fn name(&self) -> &'static str;

    fn get(&self, key: &[u8]) -> UnikvResult<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> UnikvResult<()>;

    /// Returns whether the key was present.
    fn remove(&mut self, key: &[u8]) -> UnikvResult<bool>;

    fn contains(&self, key: &[u8]) -> UnikvResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn entries(&self) -> UnikvResult<RawEntries<'_>>;

    /// Number of live entries. May be cached or computed by scanning.
    fn count(&self) -> UnikvResult<usize>;

    /// Upsert many pairs. Later pairs win over earlier ones with the same key.
    fn bulk_put(&mut self, pairs: Vec<RawEntry>) -> UnikvResult<()> {
        for (key, value) in pairs {
            self.put(&key, &value)?;
        }
        Ok(())
    }

    /// Native scan over keys starting with `prefix`, if the backend has one.
    fn scan_prefix(&self, _prefix: &[u8]) -> Option<UnikvResult<RawEntries<'_>>> {
        None
    }

    /// Remove every entry and return how many were removed.
    fn truncate(&mut self) -> UnikvResult<usize> {
        let keys = self
            .entries()?
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<UnikvResult<Vec<_>>>()?;
        let mut removed = 0;
        for key in keys {
            if self.remove(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Location of the raw storage when it can be copied byte for byte.
    fn layout(&self) -> Option<RawLayout> {
        None
    }

    /// Make pending writes durable.
    fn sync(&mut self) -> UnikvResult<()> {
        Ok(())
    }
}

/// Backends whose handle can be turned into an iterator that owns it.
///
/// Scoped handles are opened per operation, so a lazy scan must carry the
/// handle with it instead of borrowing it.
pub trait IntoEntries: Backend + Sized {
    fn into_entries(self) -> UnikvResult<RawEntries<'static>>;

    /// Owning counterpart of [`Backend::scan_prefix`].
    fn into_scan_prefix(self, _prefix: &[u8]) -> UnikvResult<Option<RawEntries<'static>>> {
        Ok(None)
    }
}
