//! Redb backend: a single-file database opened per operation.
//!
//! redb holds an exclusive lock on its file while a `Database` is alive, so
//! this backend is used through [`Scoped`]: [`RedbOpener`] opens the file for
//! each logical call and the handle is dropped, releasing the lock, when the
//! call ends. Every write is one transaction; batches share a single one.
//!
//! Scans page through the table in short read transactions, so an iterator
//! owns the database and never borrows a transaction.

use std::borrow::Borrow;
use std::collections::VecDeque;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::debug;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition, TableError,
};

use crate::config::{CodecConfig, FileConfig};
use crate::errors::{DecodeError, UnikvResult};
use crate::scoped::{Open, Scoped, ScopedStore};
use crate::store::Store;
use crate::traits::backend::{Backend, IntoEntries, RawEntries, RawEntry, RawLayout};

const MAIN_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("unikv");

/// Entries fetched per read transaction while scanning.
const PAGE_SIZE: usize = 256;

pub type RedbStore = ScopedStore<RedbOpener>;

/// Opens the redb file named by a [`FileConfig`].
#[derive(Debug, Clone)]
pub struct RedbOpener {
    config: FileConfig,
}

impl RedbOpener {
    /// Honours `truncate` once, here, rather than on every open.
    pub fn new(config: FileConfig) -> UnikvResult<Self> {
        let opener = Self { config };
        if opener.config.truncate {
            opener.open()?.truncate()?;
        }
        Ok(opener)
    }
}

impl Open for RedbOpener {
    type Handle = RedbBackend;

    fn open(&self) -> UnikvResult<RedbBackend> {
        let path = &self.config.path;
        let start = Instant::now();
        let db = if self.config.create_if_missing {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Database::builder()
                .set_cache_size(self.config.cache_size_mb * 1024 * 1024)
                .create(path)?
        } else {
            Database::builder()
                .set_cache_size(self.config.cache_size_mb * 1024 * 1024)
                .open(path)?
        };
        debug!("RedbBackend: Opened {} in {:?}", path.display(), start.elapsed());
        Ok(RedbBackend {
            db,
            path: path.clone(),
        })
    }

    fn location(&self) -> &Path {
        &self.config.path
    }

    fn verify(&self, path: &Path) -> UnikvResult<()> {
        let not_redb = |e: &dyn std::fmt::Display| {
            DecodeError::Snapshot(format!("{} is not a redb database: {e}", path.display()))
        };
        let db = Database::open(path).map_err(|e| not_redb(&e))?;
        let txn = db.begin_read().map_err(|e| not_redb(&e))?;
        let table = txn.open_table(MAIN_TABLE);
        match table {
            Ok(_) | Err(TableError::TableDoesNotExist(_)) => Ok(()),
            Err(e) => Err(not_redb(&e).into()),
        }
    }
}

/// An open redb file.
pub struct RedbBackend {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish()
    }
}

impl RedbBackend {
    fn write_txn<R>(
        &self,
        op: impl FnOnce(&mut redb::Table<'_, &'static [u8], &'static [u8]>) -> UnikvResult<R>,
    ) -> UnikvResult<R> {
        let txn = self.db.begin_write()?;
        let result = {
            let mut table = txn.open_table(MAIN_TABLE)?;
            op(&mut table)?
        };
        txn.commit()?;
        Ok(result)
    }
}

impl Backend for RedbBackend {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn get(&self, key: &[u8]) -> UnikvResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(MAIN_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> UnikvResult<()> {
        self.write_txn(|table| {
            table.insert(key, value)?;
            Ok(())
        })
    }

    fn remove(&mut self, key: &[u8]) -> UnikvResult<bool> {
        self.write_txn(|table| Ok(table.remove(key)?.is_some()))
    }

    fn entries(&self) -> UnikvResult<RawEntries<'_>> {
        Ok(Box::new(Pages::new(&self.db, None)))
    }

    fn count(&self) -> UnikvResult<usize> {
        let txn = self.db.begin_read()?;
        match txn.open_table(MAIN_TABLE) {
            Ok(table) => Ok(table.len()? as usize),
            Err(TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn bulk_put(&mut self, pairs: Vec<RawEntry>) -> UnikvResult<()> {
        self.write_txn(|table| {
            for (key, value) in &pairs {
                table.insert(key.as_slice(), value.as_slice())?;
            }
            Ok(())
        })
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Option<UnikvResult<RawEntries<'_>>> {
        Some(Ok(Box::new(Pages::new(&self.db, Some(prefix.to_vec())))))
    }

    fn truncate(&mut self) -> UnikvResult<usize> {
        let removed = self.count()?;
        let txn = self.db.begin_write()?;
        txn.delete_table(MAIN_TABLE)?;
        txn.commit()?;
        Ok(removed)
    }

    fn layout(&self) -> Option<RawLayout> {
        Some(RawLayout::File(self.path.clone()))
    }
}

impl IntoEntries for RedbBackend {
    fn into_entries(self) -> UnikvResult<RawEntries<'static>> {
        Ok(Box::new(Pages::new(self.db, None)))
    }

    fn into_scan_prefix(self, prefix: &[u8]) -> UnikvResult<Option<RawEntries<'static>>> {
        Ok(Some(Box::new(Pages::new(self.db, Some(prefix.to_vec())))))
    }
}

/// Forward scan that refills from a fresh read transaction each page,
/// resuming after the last key it returned.
struct Pages<D> {
    db: D,
    prefix: Option<Vec<u8>>,
    last: Option<Vec<u8>>,
    buffer: VecDeque<RawEntry>,
    done: bool,
}

impl<D: Borrow<Database>> Pages<D> {
    fn new(db: D, prefix: Option<Vec<u8>>) -> Self {
        Self {
            db,
            prefix,
            last: None,
            buffer: VecDeque::with_capacity(PAGE_SIZE),
            done: false,
        }
    }

    fn refill(&mut self) -> UnikvResult<()> {
        let db: &Database = self.db.borrow();
        let txn = db.begin_read()?;
        let table = match txn.open_table(MAIN_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                self.done = true;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let start = match (&self.last, &self.prefix) {
            (Some(last), _) => Bound::Excluded(last.as_slice()),
            (None, Some(prefix)) => Bound::Included(prefix.as_slice()),
            (None, None) => Bound::Unbounded,
        };
        let mut page = Vec::with_capacity(PAGE_SIZE);
        for item in table.range::<&[u8]>((start, Bound::Unbounded))?.take(PAGE_SIZE) {
            let (key, value) = item?;
            let key = key.value().to_vec();
            if self.prefix.as_ref().is_some_and(|p| !key.starts_with(p)) {
                self.done = true;
                break;
            }
            page.push((key, value.value().to_vec()));
        }

        if page.len() < PAGE_SIZE {
            self.done = true;
        }
        self.last = page.last().map(|(key, _)| key.clone());
        self.buffer.extend(page);
        Ok(())
    }
}

impl<D: Borrow<Database>> Iterator for Pages<D> {
    type Item = UnikvResult<RawEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl Store<Scoped<RedbOpener>> {
    pub fn redb(config: FileConfig, codec: CodecConfig) -> UnikvResult<Self> {
        let read_only = config.read_only;
        Ok(Store::scoped(RedbOpener::new(config)?, codec).with_read_only(read_only))
    }
}
