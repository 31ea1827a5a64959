//! Bucket-style backend: one file per entry inside a directory.
//!
//! Keys of up to [`INLINE_KEY_LIMIT`] bytes are named `key_` plus their
//! lowercase hex and the `.ukv` extension, so any short byte string (the empty
//! one included) is a valid name. Longer keys would overflow the file name
//! limit; they are named `long_` plus the blake3 digest of the key, and the
//! file starts with the key itself:
//!
//! ```text
//! u32 LE key length ++ key ++ value
//! ```
//!
//! The entry count lives in a reserved `__count__` file that is adjusted on
//! every insert and delete instead of listing the directory. `__codec__` holds
//! the codec configuration the entries were written with.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, warn};

use crate::config::{CodecConfig, FileConfig};
use crate::errors::{BackendError, DecodeError, EncodeError, UnikvError, UnikvResult};
use crate::store::Store;
use crate::traits::access::Persistent;
use crate::traits::backend::{Backend, IntoEntries, RawEntries, RawEntry, RawLayout};

pub type DirectoryStore = Store<Persistent<DirectoryBackend>>;

pub const COUNTER_FILE: &str = "__count__";
pub const CODEC_FILE: &str = "__codec__";

/// Longest key stored under its hex name. `key_` + 200 hex digits + `.ukv`
/// stays well under the 255 byte name limit of common filesystems.
pub const INLINE_KEY_LIMIT: usize = 100;

const ENTRY_PREFIX: &str = "key_";
const LONG_ENTRY_PREFIX: &str = "long_";
const ENTRY_EXTENSION: &str = "ukv";
const KEY_LENGTH_BYTES: usize = 4;

#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    root: PathBuf,
    count: usize,
    use_fsync: bool,
}

impl DirectoryBackend {
    pub fn open(config: &FileConfig) -> UnikvResult<Self> {
        let start = Instant::now();
        debug!("DirectoryBackend: Opening {}", config.path.display());

        if config.create_if_missing {
            fs::create_dir_all(&config.path)?;
        } else if !config.path.is_dir() {
            return Err(BackendError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{} is not a directory", config.path.display()),
            ))
            .into());
        }

        let mut backend = Self {
            root: config.path.clone(),
            count: 0,
            use_fsync: config.use_fsync,
        };
        backend.count = match fs::read_to_string(backend.counter_path()) {
            Ok(text) => text.trim().parse().map_err(|_| {
                BackendError::Corrupted(format!("unreadable counter {:?}", text.trim()))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let listed = backend.entry_paths()?.len();
                if listed > 0 {
                    warn!("DirectoryBackend: counter missing, recounted {listed} entries");
                }
                listed
            }
            Err(e) => return Err(e.into()),
        };
        if config.truncate {
            backend.truncate()?;
        }

        debug!("DirectoryBackend: Opened in {:?}", start.elapsed());
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record the codec configuration the entries are written with.
    pub fn write_codec(&self, codec: &CodecConfig) -> UnikvResult<()> {
        let json = serde_json::to_vec_pretty(codec)
            .map_err(|e| EncodeError::Unrepresentable(e.to_string()))?;
        self.write_file(&self.root.join(CODEC_FILE), &json)
    }

    /// The recorded codec configuration, if the directory carries one.
    pub fn read_codec(&self) -> UnikvResult<Option<CodecConfig>> {
        match fs::read(self.root.join(CODEC_FILE)) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                UnikvError::from(DecodeError::Snapshot(format!("unreadable {CODEC_FILE}: {e}")))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear_codec(&self) -> UnikvResult<()> {
        match fs::remove_file(self.root.join(CODEC_FILE)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn counter_path(&self) -> PathBuf {
        self.root.join(COUNTER_FILE)
    }

    fn entry_path(&self, key: &[u8]) -> PathBuf {
        let name = if is_long(key) {
            format!("{LONG_ENTRY_PREFIX}{}.{ENTRY_EXTENSION}", blake3::hash(key).to_hex())
        } else {
            format!("{ENTRY_PREFIX}{}.{ENTRY_EXTENSION}", hex::encode(key))
        };
        self.root.join(name)
    }

    /// Entry files sorted by name, so iteration order is stable.
    fn entry_paths(&self) -> UnikvResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let path = dirent?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> UnikvResult<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(contents)?;
        if self.use_fsync {
            file.sync_all()?;
        }
        Ok(())
    }

    fn write_entry(&self, path: &Path, key: &[u8], value: &[u8]) -> UnikvResult<()> {
        if !is_long(key) {
            return self.write_file(path, value);
        }
        let length = u32::try_from(key.len())
            .map_err(|_| EncodeError::Unrepresentable(format!("key of {} bytes", key.len())))?;
        let mut contents = Vec::with_capacity(KEY_LENGTH_BYTES + key.len() + value.len());
        contents.extend_from_slice(&length.to_le_bytes());
        contents.extend_from_slice(key);
        contents.extend_from_slice(value);
        self.write_file(path, &contents)
    }

    fn store_count(&mut self, count: usize) -> UnikvResult<()> {
        self.count = count;
        self.write_file(&self.counter_path(), count.to_string().as_bytes())
    }
}

fn is_long(key: &[u8]) -> bool {
    key.len() > INLINE_KEY_LIMIT
}

/// Split a `long_` entry file into its stored key and value.
fn split_long_entry(path: &Path, mut contents: Vec<u8>) -> UnikvResult<RawEntry> {
    let corrupted = || BackendError::Corrupted(format!("truncated entry {}", path.display()));
    let length: [u8; KEY_LENGTH_BYTES] = contents
        .get(..KEY_LENGTH_BYTES)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(corrupted)?;
    let key_end = KEY_LENGTH_BYTES + u32::from_le_bytes(length) as usize;
    if contents.len() < key_end {
        return Err(corrupted().into());
    }
    let value = contents.split_off(key_end);
    contents.drain(..KEY_LENGTH_BYTES);
    Ok((contents, value))
}

fn read_entry(path: &Path) -> UnikvResult<RawEntry> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| BackendError::Corrupted(format!("bad entry name {}", path.display())))?;
    if let Some(hex_key) = stem.strip_prefix(ENTRY_PREFIX) {
        let key = hex::decode(hex_key)
            .map_err(|e| BackendError::Corrupted(format!("bad entry name {stem}: {e}")))?;
        Ok((key, fs::read(path)?))
    } else if stem.starts_with(LONG_ENTRY_PREFIX) {
        split_long_entry(path, fs::read(path)?)
    } else {
        Err(BackendError::Corrupted(format!("bad entry name {}", path.display())).into())
    }
}

impl Backend for DirectoryBackend {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn get(&self, key: &[u8]) -> UnikvResult<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !is_long(key) {
            return Ok(Some(contents));
        }
        let (stored, value) = split_long_entry(&path, contents)?;
        Ok((stored == key).then_some(value))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> UnikvResult<()> {
        let path = self.entry_path(key);
        let is_new = !path.exists();
        self.write_entry(&path, key, value)?;
        if is_new {
            self.store_count(self.count + 1)?;
        }
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> UnikvResult<bool> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => {
                self.store_count(self.count.saturating_sub(1))?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, key: &[u8]) -> UnikvResult<bool> {
        if is_long(key) {
            return Ok(self.get(key)?.is_some());
        }
        Ok(self.entry_path(key).is_file())
    }

    fn entries(&self) -> UnikvResult<RawEntries<'_>> {
        Ok(Box::new(self.entry_paths()?.into_iter().map(|p| read_entry(&p))))
    }

    fn count(&self) -> UnikvResult<usize> {
        Ok(self.count)
    }

    fn bulk_put(&mut self, pairs: Vec<RawEntry>) -> UnikvResult<()> {
        let mut count = self.count;
        for (key, value) in pairs {
            let path = self.entry_path(&key);
            if !path.exists() {
                count += 1;
            }
            self.write_entry(&path, &key, &value)?;
        }
        self.store_count(count)
    }

    fn truncate(&mut self) -> UnikvResult<usize> {
        let paths = self.entry_paths()?;
        for path in &paths {
            fs::remove_file(path)?;
        }
        self.store_count(0)?;
        Ok(paths.len())
    }

    fn layout(&self) -> Option<RawLayout> {
        Some(RawLayout::Directory(self.root.clone()))
    }
}

impl IntoEntries for DirectoryBackend {
    fn into_entries(self) -> UnikvResult<RawEntries<'static>> {
        Ok(Box::new(self.entry_paths()?.into_iter().map(|p| read_entry(&p))))
    }
}

impl Store<Persistent<DirectoryBackend>> {
    pub fn directory(config: FileConfig, codec: CodecConfig) -> UnikvResult<Self> {
        let backend = DirectoryBackend::open(&config)?;
        if !config.read_only {
            backend.write_codec(&codec)?;
        }
        Ok(Store::new(Persistent::new(backend), codec).with_read_only(config.read_only))
    }
}
