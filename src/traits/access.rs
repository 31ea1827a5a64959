//! Resource acquisition strategies.
//!
//! A [`Store`](crate::store::Store) never touches a backend directly. It asks
//! its [`Access`] for the handle, once per logical operation, and the
//! strategy decides whether that means borrowing a connection that is always
//! open ([`Persistent`]) or opening and closing one around the call
//! ([`Scoped`](crate::scoped::Scoped)).

use std::path::Path;

use crate::errors::UnikvResult;
use crate::traits::backend::{Backend, RawEntries};

pub trait Access {
    type Backend: Backend;

    /// Run `op` against a handle held for the duration of the call.
    fn read<R>(&self, op: impl FnOnce(&Self::Backend) -> UnikvResult<R>) -> UnikvResult<R>;

    /// Run `op` against a mutable handle held for the duration of the call.
    fn write<R>(&mut self, op: impl FnOnce(&mut Self::Backend) -> UnikvResult<R>) -> UnikvResult<R>;

    /// Lazy scan over every stored pair. The handle stays acquired until the
    /// returned iterator is dropped.
    fn entries(&self) -> UnikvResult<RawEntries<'_>>;

    /// Native prefix scan, `None` when the backend has no such primitive.
    fn scan_prefix(&self, prefix: &[u8]) -> UnikvResult<Option<RawEntries<'_>>>;

    /// Replace the backend's raw storage with a verbatim copy from `source`.
    /// Returns `false` when the strategy cannot do this safely.
    fn restore_raw(&mut self, _source: &Path) -> UnikvResult<bool> {
        Ok(false)
    }
}

/// Access strategy for backends with a durable open handle.
#[derive(Debug)]
pub struct Persistent<B> {
    backend: B,
}

impl<B: Backend> Persistent<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_inner(self) -> B {
        self.backend
    }
}

impl<B: Backend> Access for Persistent<B> {
    type Backend = B;

    fn read<R>(&self, op: impl FnOnce(&B) -> UnikvResult<R>) -> UnikvResult<R> {
        op(&self.backend)
    }

    fn write<R>(&mut self, op: impl FnOnce(&mut B) -> UnikvResult<R>) -> UnikvResult<R> {
        let result = op(&mut self.backend)?;
        self.backend.sync()?;
        Ok(result)
    }

    fn entries(&self) -> UnikvResult<RawEntries<'_>> {
        self.backend.entries()
    }

    fn scan_prefix(&self, prefix: &[u8]) -> UnikvResult<Option<RawEntries<'_>>> {
        self.backend.scan_prefix(prefix).transpose()
    }
}
