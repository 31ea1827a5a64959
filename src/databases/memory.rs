//! In-process backend that keeps entries in insertion order.

use std::collections::HashMap;

use crate::config::{CodecConfig, MemoryConfig};
use crate::errors::UnikvResult;
use crate::store::Store;
use crate::traits::access::Persistent;
use crate::traits::backend::{Backend, IntoEntries, RawEntries, RawEntry};

/// Store over an in-process map. Not shared between threads or processes.
pub type MemoryStore = Store<Persistent<MemoryBackend>>;

/// Tombstones are compacted away once they outnumber live slots by this much.
const COMPACT_SLACK: usize = 64;

/// Insertion-ordered map of raw entries.
///
/// Removal leaves a tombstone so iteration order of the remaining entries is
/// stable; re-inserting a removed key appends it at the end.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    slots: Vec<Option<RawEntry>>,
    index: HashMap<Vec<u8>, usize>,
}

impl MemoryBackend {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.initial_capacity),
            index: HashMap::with_capacity(config.initial_capacity),
        }
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (pos, slot) in self.slots.iter().enumerate() {
            if let Some((key, _)) = slot {
                self.index.insert(key.clone(), pos);
            }
        }
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &[u8]) -> UnikvResult<Option<Vec<u8>>> {
        Ok(self
            .index
            .get(key)
            .and_then(|&pos| self.slots[pos].as_ref())
            .map(|(_, value)| value.clone()))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> UnikvResult<()> {
        match self.index.get(key) {
            Some(&pos) => {
                if let Some((_, stored)) = self.slots[pos].as_mut() {
                    *stored = value.to_vec();
                }
            }
            None => {
                self.index.insert(key.to_vec(), self.slots.len());
                self.slots.push(Some((key.to_vec(), value.to_vec())));
            }
        }
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> UnikvResult<bool> {
        let Some(pos) = self.index.remove(key) else {
            return Ok(false);
        };
        self.slots[pos] = None;
        if self.slots.len() - self.index.len() > self.index.len() + COMPACT_SLACK {
            self.compact();
        }
        Ok(true)
    }

    fn contains(&self, key: &[u8]) -> UnikvResult<bool> {
        Ok(self.index.contains_key(key))
    }

    fn entries(&self) -> UnikvResult<RawEntries<'_>> {
        Ok(Box::new(self.slots.iter().flatten().cloned().map(Ok)))
    }

    fn count(&self) -> UnikvResult<usize> {
        Ok(self.index.len())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Option<UnikvResult<RawEntries<'_>>> {
        let prefix = prefix.to_vec();
        let matching = self
            .slots
            .iter()
            .flatten()
            .filter(move |(key, _)| key.starts_with(&prefix))
            .cloned()
            .map(Ok);
        Some(Ok(Box::new(matching)))
    }

    fn truncate(&mut self) -> UnikvResult<usize> {
        let removed = self.index.len();
        self.slots.clear();
        self.index.clear();
        Ok(removed)
    }
}

impl IntoEntries for MemoryBackend {
    fn into_entries(self) -> UnikvResult<RawEntries<'static>> {
        Ok(Box::new(self.slots.into_iter().flatten().map(Ok)))
    }
}

impl Store<Persistent<MemoryBackend>> {
    pub fn memory(codec: CodecConfig) -> Self {
        Self::memory_with(MemoryConfig::default(), codec)
    }

    pub fn memory_with(config: MemoryConfig, codec: CodecConfig) -> Self {
        Store::new(Persistent::new(MemoryBackend::new(config)), codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(backend: &MemoryBackend) -> Vec<Vec<u8>> {
        backend
            .entries()
            .unwrap()
            .map(|e| e.unwrap().0)
            .collect()
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut backend = MemoryBackend::default();
        for key in [b"c", b"a", b"b"] {
            backend.put(key, b"v").unwrap();
        }
        backend.put(b"a", b"updated").unwrap();
        assert_eq!(keys(&backend), vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(backend.get(b"a").unwrap(), Some(b"updated".to_vec()));
    }

    #[test]
    fn reinserted_key_moves_to_the_end() {
        let mut backend = MemoryBackend::default();
        backend.put(b"a", b"1").unwrap();
        backend.put(b"b", b"2").unwrap();
        assert!(backend.remove(b"a").unwrap());
        assert!(!backend.remove(b"a").unwrap());
        backend.put(b"a", b"3").unwrap();
        assert_eq!(keys(&backend), vec![b"b".to_vec(), b"a".to_vec()]);
        assert_eq!(backend.count().unwrap(), 2);
    }

    #[test]
    fn compaction_keeps_lookups_valid() {
        let mut backend = MemoryBackend::default();
        for i in 0u32..500 {
            backend.put(&i.to_be_bytes(), &i.to_le_bytes()).unwrap();
        }
        for i in 0u32..450 {
            backend.remove(&i.to_be_bytes()).unwrap();
        }
        assert_eq!(backend.count().unwrap(), 50);
        assert!(backend.slots.len() < 500);
        assert_eq!(
            backend.get(&499u32.to_be_bytes()).unwrap(),
            Some(499u32.to_le_bytes().to_vec())
        );
        assert_eq!(keys(&backend).first(), Some(&450u32.to_be_bytes().to_vec()));
    }

    #[test]
    fn prefix_scan_and_truncate() {
        let mut backend = MemoryBackend::default();
        backend.put(b"user_1", b"a").unwrap();
        backend.put(b"item_1", b"b").unwrap();
        backend.put(b"user_2", b"c").unwrap();
        let hits: Vec<_> = backend
            .scan_prefix(b"user_")
            .unwrap()
            .unwrap()
            .map(|e| e.unwrap().1)
            .collect();
        assert_eq!(hits, vec![b"a".to_vec(), b"c".to_vec()]);
        assert_eq!(backend.truncate().unwrap(), 3);
        assert_eq!(backend.count().unwrap(), 0);
    }
}
