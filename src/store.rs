//! The backend-independent key-value contract.
//!
//! [`Store`] composes a [`Codec`] with an [`Access`] strategy. Every operation
//! encodes its arguments, runs the primitive backend calls inside a single
//! acquisition of the handle, and decodes the results after the handle is
//! released. Scans are lazy and hold the handle until the iterator is dropped.
//!
//! Reads that take a default never fail on a missing key. [`Store::require`]
//! is the indexed access that does, with [`UnikvError::KeyNotFound`].

use log::{debug, trace};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::Codec;
use crate::config::CodecConfig;
use crate::errors::{UnikvError, UnikvResult};
use crate::query::{CompiledFilter, EntryScan, Filter, KeyPattern, KeyScan};
use crate::traits::access::Access;
use crate::traits::backend::{Backend, RawEntries, RawEntry};
use crate::value::Value;

/// A key-value store over any backend.
#[derive(Debug)]
pub struct Store<A> {
    access: A,
    codec: Codec,
    read_only: bool,
}

impl<A: Access> Store<A> {
    pub fn new(access: A, codec: CodecConfig) -> Self {
        Self {
            access,
            codec: Codec::new(codec),
            read_only: false,
        }
    }

    /// Reject every mutating call with [`UnikvError::Unsupported`].
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub(crate) fn access_mut(&mut self) -> &mut A {
        &mut self.access
    }

    pub fn backend_name(&self) -> UnikvResult<&'static str> {
        self.access.read(|backend| Ok(backend.name()))
    }

    pub(crate) fn ensure_writable(&self, op: &str) -> UnikvResult<()> {
        if self.read_only {
            return Err(UnikvError::Unsupported(format!(
                "{op} on a read-only store"
            )));
        }
        Ok(())
    }

    pub fn get(&self, key: impl Into<Value>) -> UnikvResult<Option<Value>> {
        let raw_key = self.codec.encode_key(&key.into())?;
        match self.access.read(|backend| backend.get(&raw_key))? {
            Some(raw) => Ok(Some(self.codec.decode_value(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_or(&self, key: impl Into<Value>, default: impl Into<Value>) -> UnikvResult<Value> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// Indexed access: a missing key is an error.
    pub fn require(&self, key: impl Into<Value>) -> UnikvResult<Value> {
        let key = key.into();
        let missing = key.to_string();
        self.get(key)?.ok_or(UnikvError::KeyNotFound(missing))
    }

    pub fn set(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> UnikvResult<()> {
        self.ensure_writable("set")?;
        let raw_key = self.codec.encode_key(&key.into())?;
        let raw_value = self.codec.encode_value(&value.into())?;
        self.access.write(|backend| backend.put(&raw_key, &raw_value))
    }

    /// Remove `key` if present. Deleting a missing key is not an error.
    pub fn delete(&mut self, key: impl Into<Value>) -> UnikvResult<()> {
        self.ensure_writable("delete")?;
        let raw_key = self.codec.encode_key(&key.into())?;
        self.access.write(|backend| backend.remove(&raw_key))?;
        Ok(())
    }

    /// Remove `key` and return what it held.
    pub fn pop(&mut self, key: impl Into<Value>) -> UnikvResult<Option<Value>> {
        self.ensure_writable("pop")?;
        let raw_key = self.codec.encode_key(&key.into())?;
        let prior = self.access.write(|backend| {
            let prior = backend.get(&raw_key)?;
            if prior.is_some() {
                backend.remove(&raw_key)?;
            }
            Ok(prior)
        })?;
        prior.map(|raw| self.codec.decode_value(&raw)).transpose()
    }

    pub fn pop_or(&mut self, key: impl Into<Value>, default: impl Into<Value>) -> UnikvResult<Value> {
        Ok(self.pop(key)?.unwrap_or_else(|| default.into()))
    }

    pub fn contains(&self, key: impl Into<Value>) -> UnikvResult<bool> {
        let raw_key = self.codec.encode_key(&key.into())?;
        self.access.read(|backend| backend.contains(&raw_key))
    }

    pub fn len(&self) -> UnikvResult<usize> {
        self.access.read(|backend| backend.count())
    }

    pub fn is_empty(&self) -> UnikvResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Raw pairs, narrowed by the backend's prefix scan when the pattern is a
    /// plain prefix and keys are stored as native text.
    fn raw_entries(&self, pattern: Option<&KeyPattern>) -> UnikvResult<RawEntries<'_>> {
        if let Some(prefix) = pattern.and_then(KeyPattern::literal_prefix) {
            if self.codec.keys_are_native_text() {
                if let Some(entries) = self.access.scan_prefix(prefix.as_bytes())? {
                    trace!("Store: prefix scan pushed down for {prefix:?}");
                    return Ok(entries);
                }
            }
        }
        self.access.entries()
    }

    /// Keys whose stringified form matches `pattern` at its start.
    pub fn keys(
        &self,
        pattern: Option<&str>,
        limit: Option<usize>,
    ) -> UnikvResult<KeyScan<'_, RawEntries<'_>>> {
        let pattern = pattern.map(KeyPattern::new).transpose()?;
        let entries = self.raw_entries(pattern.as_ref())?;
        Ok(KeyScan::new(entries, &self.codec, pattern, limit))
    }

    pub fn values(
        &self,
        limit: Option<usize>,
    ) -> UnikvResult<impl Iterator<Item = UnikvResult<Value>> + '_> {
        Ok(self
            .items(&Filter::All, limit)?
            .map(|entry| entry.map(|(_, value)| value)))
    }

    /// Values for `keys`, positionally aligned with them; missing keys yield
    /// `default`. The handle is acquired once for the whole lookup.
    pub fn values_of<I, K>(
        &self,
        keys: I,
        limit: Option<usize>,
        default: impl Into<Value>,
    ) -> UnikvResult<Vec<Value>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Value>,
    {
        let default = default.into();
        let raw_keys = keys
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|key| self.codec.encode_key(&key.into()))
            .collect::<UnikvResult<Vec<_>>>()?;
        let found = self.access.read(|backend| {
            raw_keys
                .iter()
                .map(|key| backend.get(key))
                .collect::<UnikvResult<Vec<_>>>()
        })?;
        found
            .into_iter()
            .map(|raw| match raw {
                Some(raw) => self.codec.decode_value(&raw),
                None => Ok(default.clone()),
            })
            .collect()
    }

    /// Entries whose values pass `filter`, up to `limit` of them.
    pub fn items(
        &self,
        filter: &Filter,
        limit: Option<usize>,
    ) -> UnikvResult<EntryScan<'_, RawEntries<'_>>> {
        let compiled = filter.compile()?;
        Ok(EntryScan::new(self.access.entries()?, &self.codec, None, compiled, limit))
    }

    /// Entries whose keys match `pattern`, up to `limit` of them.
    pub fn scan(
        &self,
        pattern: &str,
        limit: Option<usize>,
    ) -> UnikvResult<EntryScan<'_, RawEntries<'_>>> {
        let pattern = KeyPattern::new(pattern)?;
        let entries = self.raw_entries(Some(&pattern))?;
        Ok(EntryScan::new(
            entries,
            &self.codec,
            Some(pattern),
            CompiledFilter::default(),
            limit,
        ))
    }

    fn encode_pairs<I, K, V>(&self, entries: I) -> UnikvResult<Vec<RawEntry>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        entries
            .into_iter()
            .map(|(key, value)| {
                Ok((
                    self.codec.encode_key(&key.into())?,
                    self.codec.encode_value(&value.into())?,
                ))
            })
            .collect()
    }

    /// Bulk upsert through the backend's batch primitive. Later pairs win.
    pub fn update<I, K, V>(&mut self, entries: I) -> UnikvResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        self.ensure_writable("update")?;
        let pairs = self.encode_pairs(entries)?;
        let count = pairs.len();
        self.access.write(|backend| backend.bulk_put(pairs))?;
        debug!("Store: updated {count} entries");
        Ok(self)
    }

    pub fn get_batch<I, K>(&self, keys: I, default: impl Into<Value>) -> UnikvResult<Vec<Value>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Value>,
    {
        self.values_of(keys, None, default)
    }

    /// Positional bulk upsert: `keys[i]` gets `values[i]`.
    pub fn set_batch<IK, IV, K, V>(&mut self, keys: IK, values: IV) -> UnikvResult<bool>
    where
        IK: IntoIterator<Item = K>,
        IV: IntoIterator<Item = V>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let keys: Vec<Value> = keys.into_iter().map(Into::into).collect();
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if keys.len() != values.len() {
            return Err(UnikvError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        self.update(keys.into_iter().zip(values))?;
        Ok(true)
    }

    /// Remove and return one entry, the first one the backend yields.
    pub fn popitem(&mut self) -> UnikvResult<(Value, Value)> {
        self.ensure_writable("popitem")?;
        let first = self.access.entries()?.next().transpose()?;
        let (raw_key, raw_value) = first.ok_or(UnikvError::EmptyStore)?;
        let popped = (
            self.codec.decode_key(&raw_key)?,
            self.codec.decode_value(&raw_value)?,
        );
        self.access.write(|backend| backend.remove(&raw_key))?;
        Ok(popped)
    }

    /// Remove every entry and return how many were removed.
    pub fn flush(&mut self) -> UnikvResult<usize> {
        self.ensure_writable("flush")?;
        let removed = self.access.write(|backend| backend.truncate())?;
        debug!("Store: flushed {removed} entries");
        Ok(removed)
    }

    /// Replace the contents with already-decoded entries in one write.
    pub(crate) fn replace_with(&mut self, entries: Vec<(Value, Value)>) -> UnikvResult<usize> {
        self.ensure_writable("load")?;
        let pairs = self.encode_pairs(entries)?;
        let count = pairs.len();
        self.access.write(|backend| {
            backend.truncate()?;
            backend.bulk_put(pairs)
        })?;
        Ok(count)
    }

    /// Make this store hold exactly the entries of `other`, re-encoded with
    /// this store's codec. Returns the number of entries copied.
    pub fn copy_from<B: Access>(&mut self, other: &Store<B>) -> UnikvResult<usize> {
        let entries = other
            .items(&Filter::All, None)?
            .collect::<UnikvResult<Vec<_>>>()?;
        self.replace_with(entries)
    }

    /// Same cardinality and, for every key here, an identical decoded value
    /// in `other`. Order does not matter.
    pub fn equals<B: Access>(&self, other: &Store<B>) -> UnikvResult<bool> {
        if self.len()? != other.len()? {
            return Ok(false);
        }
        let entries = self
            .items(&Filter::All, None)?
            .collect::<UnikvResult<Vec<_>>>()?;
        for (key, value) in entries {
            if other.get(key)?.as_ref() != Some(&value) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Store any serde-serializable value.
    pub fn set_as<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<Value>,
        value: &T,
    ) -> UnikvResult<()> {
        let value = Value::from_serialize(value)?;
        self.set(key, value)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: impl Into<Value>) -> UnikvResult<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(value.deserialize_into()?)),
            None => Ok(None),
        }
    }
}

/// Stores that cannot be compared (a backend error) are not equal.
impl<A: Access, B: Access> PartialEq<Store<B>> for Store<A> {
    fn eq(&self, other: &Store<B>) -> bool {
        self.equals(other).unwrap_or(false)
    }
}
