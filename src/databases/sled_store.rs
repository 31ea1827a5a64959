//! Sled backend: an always-open embedded tree.
//!
//! Bulk writes go through one `sled::Batch`, pattern scans with a literal
//! prefix use the tree's native `scan_prefix`, and `count` is the tree's own
//! length.

use std::time::Instant;

use log::debug;

use crate::config::{CodecConfig, FileConfig};
use crate::errors::UnikvResult;
use crate::store::Store;
use crate::traits::access::Persistent;
use crate::traits::backend::{Backend, IntoEntries, RawEntries, RawEntry, RawLayout};

pub type SledStore = Store<Persistent<SledBackend>>;

#[derive(Debug, Clone)]
pub struct SledBackend {
    db: sled::Db,
    use_fsync: bool,
}

fn owned(item: sled::Result<(sled::IVec, sled::IVec)>) -> UnikvResult<RawEntry> {
    let (key, value) = item?;
    Ok((key.to_vec(), value.to_vec()))
}

impl SledBackend {
    pub fn open(config: &FileConfig) -> UnikvResult<Self> {
        let start = Instant::now();
        debug!("SledBackend: Opening database at {}", config.path.display());

        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_size_mb as u64 * 1024 * 1024)
            .open()?;
        let mut backend = Self {
            db,
            use_fsync: config.use_fsync,
        };
        if config.truncate {
            backend.truncate()?;
        }

        debug!("SledBackend: Opened in {:?}", start.elapsed());
        Ok(backend)
    }

    /// A database that lives in a temporary directory and is removed on drop.
    pub fn temporary() -> UnikvResult<Self> {
        let start = Instant::now();
        debug!("SledBackend: Creating temporary database");

        let db = sled::Config::new().temporary(true).open()?;

        debug!("SledBackend: Created temporary in {:?}", start.elapsed());
        Ok(Self {
            db,
            use_fsync: false,
        })
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }
}

impl Backend for SledBackend {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn get(&self, key: &[u8]) -> UnikvResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> UnikvResult<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> UnikvResult<bool> {
        Ok(self.db.remove(key)?.is_some())
    }

    fn contains(&self, key: &[u8]) -> UnikvResult<bool> {
        Ok(self.db.contains_key(key)?)
    }

    fn entries(&self) -> UnikvResult<RawEntries<'_>> {
        Ok(Box::new(self.db.iter().map(owned)))
    }

    fn count(&self) -> UnikvResult<usize> {
        Ok(self.db.len())
    }

    fn bulk_put(&mut self, pairs: Vec<RawEntry>) -> UnikvResult<()> {
        let mut batch = sled::Batch::default();
        for (key, value) in pairs {
            batch.insert(key, value);
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Option<UnikvResult<RawEntries<'_>>> {
        Some(Ok(Box::new(self.db.scan_prefix(prefix).map(owned))))
    }

    fn truncate(&mut self) -> UnikvResult<usize> {
        let removed = self.db.len();
        self.db.clear()?;
        Ok(removed)
    }

    fn layout(&self) -> Option<RawLayout> {
        // sled keeps several files and a lock; a live copy is not consistent
        None
    }

    fn sync(&mut self) -> UnikvResult<()> {
        if self.use_fsync {
            self.db.flush()?;
        }
        Ok(())
    }
}

impl IntoEntries for SledBackend {
    fn into_entries(self) -> UnikvResult<RawEntries<'static>> {
        Ok(Box::new(self.db.iter().map(owned)))
    }
}

impl Store<Persistent<SledBackend>> {
    pub fn sled(config: FileConfig, codec: CodecConfig) -> UnikvResult<Self> {
        let backend = SledBackend::open(&config)?;
        Ok(Store::new(Persistent::new(backend), codec).with_read_only(config.read_only))
    }

    pub fn sled_temporary(codec: CodecConfig) -> UnikvResult<Self> {
        Ok(Store::new(Persistent::new(SledBackend::temporary()?), codec))
    }
}
