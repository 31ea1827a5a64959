//! Whole-store export and import.
//!
//! `save` copies the backend's raw storage verbatim when it has a copyable
//! layout (a directory of entry files, or a single database file). Any other
//! backend is written as a snapshot blob:
//!
//! ```text
//! b"UKVSNAP1" ++ bincode(SnapshotBlob)
//! ```
//!
//! The blob carries the stored (still encoded) pairs together with the codec
//! configuration that produced them, so it can be loaded into a store with a
//! different codec.
//!
//! A directory copy carries its codec configuration in a `__codec__` file,
//! which `load` honours the same way.
//!
//! `load` reads every source entry before touching the target, so loading a
//! store from its own snapshot location is safe.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use bincode::config::standard;
use chrono::{DateTime, TimeZone, Utc};
use log::debug;

use crate::codec::Codec;
use crate::config::{CodecConfig, FileConfig};
use crate::databases::directory::DirectoryBackend;
use crate::errors::{DecodeError, UnikvError, UnikvResult};
use crate::store::Store;
use crate::traits::access::Access;
use crate::traits::backend::{Backend, RawEntry, RawLayout};
use crate::value::Value;

pub const SNAPSHOT_MAGIC: &[u8; 8] = b"UKVSNAP1";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, bincode::Encode, bincode::Decode)]
struct SnapshotBlob {
    version: u32,
    created_at_ms: i64,
    backend: String,
    codec: CodecConfig,
    entries: Vec<RawEntry>,
}

/// Summary of a snapshot blob, readable without a store.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub backend: String,
    pub codec: CodecConfig,
    pub entries: usize,
}

/// Whether `path` is a file starting with the snapshot magic.
pub fn is_snapshot_blob(path: &Path) -> UnikvResult<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let mut magic = [0u8; SNAPSHOT_MAGIC.len()];
    let mut file = fs::File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == SNAPSHOT_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_blob(path: &Path) -> UnikvResult<SnapshotBlob> {
    let bytes = fs::read(path)?;
    let payload = bytes
        .strip_prefix(SNAPSHOT_MAGIC.as_slice())
        .ok_or_else(|| DecodeError::Snapshot(format!("{} has no snapshot header", path.display())))?;
    let (blob, _) = bincode::decode_from_slice::<SnapshotBlob, _>(payload, standard())?;
    if blob.version != SNAPSHOT_VERSION {
        return Err(DecodeError::Snapshot(format!("unsupported snapshot version {}", blob.version)).into());
    }
    Ok(blob)
}

/// Read the header of a snapshot blob.
pub fn inspect(path: impl AsRef<Path>) -> UnikvResult<SnapshotInfo> {
    let blob = read_blob(path.as_ref())?;
    let created_at = Utc
        .timestamp_millis_opt(blob.created_at_ms)
        .single()
        .ok_or_else(|| DecodeError::Snapshot(format!("bad timestamp {}", blob.created_at_ms)))?;
    Ok(SnapshotInfo {
        version: blob.version,
        created_at,
        backend: blob.backend,
        codec: blob.codec,
        entries: blob.entries.len(),
    })
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy a directory-layout store into `target`, replacing what was there.
fn copy_directory(source: &Path, target: &Path) -> UnikvResult<()> {
    if same_location(source, target) {
        return Ok(());
    }
    let mut existing = DirectoryBackend::open(&FileConfig::new(target))?;
    existing.truncate()?;
    existing.clear_codec()?;
    for dirent in fs::read_dir(source)? {
        let dirent = dirent?;
        if dirent.file_type()?.is_file() {
            fs::copy(dirent.path(), target.join(dirent.file_name()))?;
        }
    }
    Ok(())
}

fn copy_file(source: &Path, target: &Path) -> UnikvResult<()> {
    if same_location(source, target) {
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, target)?;
    Ok(())
}

fn decode_all<I>(entries: I, codec: &Codec) -> UnikvResult<Vec<(Value, Value)>>
where
    I: IntoIterator<Item = UnikvResult<RawEntry>>,
{
    entries
        .into_iter()
        .map(|entry| {
            let (key, value) = entry?;
            Ok((codec.decode_key(&key)?, codec.decode_value(&value)?))
        })
        .collect()
}

impl<A: Access> Store<A> {
    /// Export the whole store to `target`.
    pub fn save(&self, target: impl AsRef<Path>) -> UnikvResult<()> {
        let target = target.as_ref();
        let start = Instant::now();

        // copied once the handle is closed, so a single-file database is clean
        let layout = self.access().read(|backend| Ok(backend.layout()))?;
        if let Some(layout) = layout {
            match layout {
                RawLayout::Directory(dir) => copy_directory(&dir, target)?,
                RawLayout::File(file) => copy_file(&file, target)?,
            }
            debug!("Store: raw copy saved to {} in {:?}", target.display(), start.elapsed());
            return Ok(());
        }

        let blob = SnapshotBlob {
            version: SNAPSHOT_VERSION,
            created_at_ms: Utc::now().timestamp_millis(),
            backend: self.backend_name()?.to_owned(),
            codec: *self.codec().config(),
            entries: self.access().entries()?.collect::<UnikvResult<Vec<_>>>()?,
        };
        let count = blob.entries.len();
        let mut bytes = SNAPSHOT_MAGIC.to_vec();
        bytes.extend(bincode::encode_to_vec(&blob, standard())?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, bytes)?;

        debug!(
            "Store: saved {count} entries to snapshot {} in {:?}",
            target.display(),
            start.elapsed()
        );
        Ok(())
    }

    /// Replace the store's contents with the snapshot at `source`.
    pub fn load(&mut self, source: impl AsRef<Path>) -> UnikvResult<&mut Self> {
        let source = source.as_ref();
        self.ensure_writable("load")?;
        let start = Instant::now();

        let entries = if source.is_dir() {
            let config = FileConfig::builder()
                .path(source)
                .create_if_missing(false)
                .build();
            let dir = DirectoryBackend::open(&config)?;
            let codec = dir.read_codec()?.map(Codec::new);
            decode_all(dir.entries()?, codec.as_ref().unwrap_or(self.codec()))?
        } else if is_snapshot_blob(source)? {
            let blob = read_blob(source)?;
            decode_all(blob.entries.into_iter().map(Ok), &Codec::new(blob.codec))?
        } else if self.access_mut().restore_raw(source)? {
            debug!(
                "Store: restored raw file {} in {:?}",
                source.display(),
                start.elapsed()
            );
            return Ok(self);
        } else {
            return Err(UnikvError::Unsupported(format!(
                "{} is not a snapshot this store can load",
                source.display()
            )));
        };

        let count = self.replace_with(entries)?;
        debug!(
            "Store: loaded {count} entries from {} in {:?}",
            source.display(),
            start.elapsed()
        );
        Ok(self)
    }
}
