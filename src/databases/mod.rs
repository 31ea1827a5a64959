pub mod directory;
pub mod memory;

#[cfg(feature = "redb")]
pub mod redb_store;

#[cfg(feature = "sled")]
pub mod sled_store;
