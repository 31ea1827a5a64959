use thiserror::Error;

use crate::value::ValueKind;

pub type UnikvResult<T> = Result<T, UnikvError>;

/// Errors surfaced by every store operation, whatever backend sits behind it.
#[derive(Error, Debug)]
pub enum UnikvError {
    /// Indexed access (`Store::require`) on a key that is not stored.
    #[error("Key Not Found: {0}")]
    KeyNotFound(String),

    #[error("Empty Store: popitem() called on a store with no entries")]
    EmptyStore,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The backend resource could not be acquired or the driver failed.
    /// Never retried by the facade.
    #[error("Backend Unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    #[error("Unsupported Operation: {0}")]
    Unsupported(String),

    #[error("Invalid Filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("Batch Length Mismatch: {keys} keys, {values} values")]
    LengthMismatch { keys: usize, values: usize },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Bincode Encode Error: {0}")]
    Bincode(#[from] bincode::error::EncodeError),

    /// Native (strict) mode only stores values the backend understands as-is.
    #[error("Value of kind {0} cannot be stored natively; use managed mode")]
    NotNative(ValueKind),

    #[error("Unrepresentable Value: {0}")]
    Unrepresentable(String),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Bincode Decode Error: {0}")]
    Bincode(#[from] bincode::error::DecodeError),

    #[error("Base64 Decode Error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Stored scalar carries no codec tag")]
    Untagged,

    #[error("Encoded payload has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("Stored text is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Value does not match the requested type: {0}")]
    Mismatch(String),

    #[error("Malformed snapshot: {0}")]
    Snapshot(String),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sled")]
    #[error("Sled Error: {0}")]
    Sled(#[from] sled::Error),

    #[cfg(feature = "redb")]
    #[error(transparent)]
    Redb(#[from] RedbError),

    /// The scoped handle is already leased by another live operation.
    #[error("Handle Busy: {0}")]
    HandleBusy(String),

    #[error("Corrupted Storage: {0}")]
    Corrupted(String),
}

#[cfg(feature = "redb")]
#[derive(Error, Debug)]
pub enum RedbError {
    #[error(transparent)]
    Database(#[from] redb::DatabaseError),
    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),
    #[error(transparent)]
    Table(#[from] redb::TableError),
    #[error(transparent)]
    Commit(#[from] redb::CommitError),
    #[error(transparent)]
    Storage(#[from] redb::StorageError),
}

macro_rules! impl_from_backend {
    ($($(#[$meta:meta])* $err:ty => $variant:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            impl From<$err> for UnikvError {
                fn from(err: $err) -> Self {
                    UnikvError::BackendUnavailable(BackendError::$variant(err.into()))
                }
            }
        )*
    };
}

impl_from_backend!(
    std::io::Error => Io,
    #[cfg(feature = "sled")]
    sled::Error => Sled,
    #[cfg(feature = "redb")]
    redb::DatabaseError => Redb,
    #[cfg(feature = "redb")]
    redb::TransactionError => Redb,
    #[cfg(feature = "redb")]
    redb::TableError => Redb,
    #[cfg(feature = "redb")]
    redb::CommitError => Redb,
    #[cfg(feature = "redb")]
    redb::StorageError => Redb,
);

impl From<bincode::error::EncodeError> for UnikvError {
    fn from(err: bincode::error::EncodeError) -> Self {
        UnikvError::Encode(EncodeError::Bincode(err))
    }
}

impl From<bincode::error::DecodeError> for UnikvError {
    fn from(err: bincode::error::DecodeError) -> Self {
        UnikvError::Decode(DecodeError::Bincode(err))
    }
}
