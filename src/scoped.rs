//! Per-call resource acquisition for backends without a durable handle.
//!
//! [`Scoped`] opens the backend through an [`Open`] implementation at the
//! start of every operation and closes it when the operation ends, whether it
//! returned a value, an error, or unwound. Batch operations on a
//! [`ScopedStore`] run inside a single [`Access::write`] call and therefore
//! open the handle once per batch.
//!
//! At most one lease is live per `Scoped`. Trying to acquire a second one (for
//! example calling `get` while iterating `keys()` of the same store) fails
//! with [`BackendError::HandleBusy`] instead of blocking. Cross-process
//! exclusion is whatever the backend's own open call provides.

use std::cell::Cell;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, trace, warn};

use crate::config::CodecConfig;
use crate::errors::{BackendError, UnikvError, UnikvResult};
use crate::store::Store;
use crate::traits::access::Access;
use crate::traits::backend::{Backend, IntoEntries, RawEntries, RawEntry};

/// Opens a fresh backend handle on demand.
pub trait Open {
    type Handle: Backend + IntoEntries;

    fn open(&self) -> UnikvResult<Self::Handle>;

    /// Where the backend lives; used for diagnostics and raw snapshots.
    fn location(&self) -> &Path;

    /// Check that the file at `path` is a database this opener can read.
    /// Raw restores are refused unless this succeeds.
    fn verify(&self, path: &Path) -> UnikvResult<()> {
        Err(UnikvError::Unsupported(format!(
            "raw restore of {} into {}",
            path.display(),
            self.location().display()
        )))
    }
}

/// A store whose backend handle is opened and released around every call.
pub type ScopedStore<O> = Store<Scoped<O>>;

/// Access strategy that leases a freshly opened handle per operation.
#[derive(Debug)]
pub struct Scoped<O> {
    opener: O,
    held: Cell<bool>,
}

/// Marks the handle as leased; clears the mark when dropped.
#[derive(Debug)]
struct HeldGuard<'a> {
    held: &'a Cell<bool>,
}

impl Drop for HeldGuard<'_> {
    fn drop(&mut self) {
        self.held.set(false);
        trace!("Scoped: lease released");
    }
}

/// An open handle plus the guard that releases it.
///
/// `handle` is declared first so it is closed before the guard clears.
pub struct Lease<'a, H> {
    handle: H,
    _guard: HeldGuard<'a>,
}

impl<H> Deref for Lease<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H> DerefMut for Lease<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut self.handle
    }
}

struct LeasedEntries<'a> {
    inner: RawEntries<'static>,
    _guard: HeldGuard<'a>,
}

impl Iterator for LeasedEntries<'_> {
    type Item = UnikvResult<RawEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<O: Open> Scoped<O> {
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            held: Cell::new(false),
        }
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Whether a lease is currently live.
    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    fn acquire(&self) -> UnikvResult<HeldGuard<'_>> {
        if self.held.replace(true) {
            return Err(BackendError::HandleBusy(self.opener.location().display().to_string()).into());
        }
        trace!("Scoped: lease acquired for {}", self.opener.location().display());
        Ok(HeldGuard { held: &self.held })
    }

    /// Open the backend and hold it until the returned lease is dropped.
    pub fn lease(&self) -> UnikvResult<Lease<'_, O::Handle>> {
        let guard = self.acquire()?;
        let start = Instant::now();
        let handle = self.opener.open()?;
        debug!(
            "Scoped: opened {} in {:?}",
            self.opener.location().display(),
            start.elapsed()
        );
        Ok(Lease {
            handle,
            _guard: guard,
        })
    }
}

impl<O: Open> Access for Scoped<O> {
    type Backend = O::Handle;

    fn read<R>(&self, op: impl FnOnce(&O::Handle) -> UnikvResult<R>) -> UnikvResult<R> {
        let lease = self.lease()?;
        op(&lease.handle)
    }

    fn write<R>(&mut self, op: impl FnOnce(&mut O::Handle) -> UnikvResult<R>) -> UnikvResult<R> {
        let mut lease = self.lease()?;
        let result = op(&mut lease.handle)?;
        lease.handle.sync()?;
        Ok(result)
    }

    fn entries(&self) -> UnikvResult<RawEntries<'_>> {
        let Lease { handle, _guard } = self.lease()?;
        let inner = handle.into_entries()?;
        Ok(Box::new(LeasedEntries { inner, _guard }))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> UnikvResult<Option<RawEntries<'_>>> {
        let Lease { handle, _guard } = self.lease()?;
        Ok(handle
            .into_scan_prefix(prefix)?
            .map(|inner| Box::new(LeasedEntries { inner, _guard }) as RawEntries<'_>))
    }

    fn restore_raw(&mut self, source: &Path) -> UnikvResult<bool> {
        if !source.is_file() {
            return Ok(false);
        }
        let _guard = self.acquire()?;
        let target = self.opener.location();
        if fs::canonicalize(target).ok() == Some(fs::canonicalize(source)?) {
            return Ok(true);
        }

        // the live file is only replaced once the copy is known to be readable
        let staged = staged_path(target);
        fs::copy(source, &staged)?;
        if let Err(e) = self.opener.verify(&staged) {
            warn!("Scoped: refused to restore {}: {e}", source.display());
            fs::remove_file(&staged)?;
            return Err(e);
        }
        fs::rename(&staged, target)?;
        debug!(
            "Scoped: restored {} from {}",
            target.display(),
            source.display()
        );
        Ok(true)
    }
}

fn staged_path(target: &Path) -> PathBuf {
    let mut staged = target.as_os_str().to_owned();
    staged.push(".restore");
    PathBuf::from(staged)
}

impl<O: Open> Store<Scoped<O>> {
    /// Build a store that opens the backend through `opener` on every call.
    pub fn scoped(opener: O, codec: CodecConfig) -> Self {
        Store::new(Scoped::new(opener), codec)
    }
}
