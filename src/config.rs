//! Unified configuration for the codec and all backends.
//!
//! Every configuration struct uses the builder pattern via `typed-builder`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use typed_builder::TypedBuilder;

/// Whether keys or values pass through the codec.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    AsRefStr,
    EnumString,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Every key/value is tagged and serialized; any `Value` round-trips.
    #[default]
    Managed,
    /// Keys/values are handed to the backend as-is (strict mode).
    Native,
}

/// Shape of the stored scalar.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    AsRefStr,
    EnumString,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[strum(serialize_all = "lowercase")]
pub enum Form {
    /// Magic-prefixed binary payload; native scalars read back as bytes.
    #[default]
    Binary,
    /// Printable tag plus base64 payload; native scalars read back as strings.
    Text,
}

/// Codec configuration, fixed for the lifetime of a store.
///
/// # Examples
///
/// ```
/// use unikv::config::{CodecConfig, Form, Mode};
///
/// let config = CodecConfig::builder()
///     .key_mode(Mode::Native)
///     .form(Form::Text)
///     .build();
/// assert_eq!(config.value_mode, Mode::Managed);
/// assert!(config.accept_raw);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TypedBuilder, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[builder(doc)]
pub struct CodecConfig {
    #[builder(default)]
    pub key_mode: Mode,

    #[builder(default)]
    pub value_mode: Mode,

    #[builder(default)]
    pub form: Form,

    /// Read untagged scalars in managed mode as raw native values instead of
    /// failing. Lets a store read entries written before it was managed.
    #[builder(default = true)]
    pub accept_raw: bool,
}

impl CodecConfig {
    /// Keys and values bypass the codec entirely.
    pub fn strict() -> Self {
        Self::builder()
            .key_mode(Mode::Native)
            .value_mode(Mode::Native)
            .build()
    }

    /// Strict mode for text-native backends.
    pub fn strict_text() -> Self {
        Self::builder()
            .key_mode(Mode::Native)
            .value_mode(Mode::Native)
            .form(Form::Text)
            .build()
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configuration for file-backed backends (directory, sled, redb).
///
/// # Examples
///
/// ```
/// use unikv::config::FileConfig;
///
/// let config = FileConfig::builder()
///     .path("/data/store.redb")
///     .use_fsync(false)
///     .build();
/// assert!(config.create_if_missing);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct FileConfig {
    /// Path to the database file or directory
    #[builder(setter(into))]
    pub path: PathBuf,

    /// Cache size in megabytes (backend-specific interpretation)
    #[builder(default = 64)]
    pub cache_size_mb: usize,

    #[builder(default = true)]
    pub create_if_missing: bool,

    /// Remove existing contents when opening
    #[builder(default = false)]
    pub truncate: bool,

    /// Reject every write with `Unsupported`
    #[builder(default = false)]
    pub read_only: bool,

    /// Flush to durable storage after every write
    #[builder(default = true)]
    pub use_fsync: bool,
}

impl FileConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::builder().path(path).build()
    }
}

/// Configuration for the in-memory backend.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct MemoryConfig {
    /// Initial capacity hint for the underlying storage
    #[builder(default = 1000)]
    pub initial_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
