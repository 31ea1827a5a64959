pub mod access;
pub mod backend;

// Re-export commonly used types
pub use access::{Access, Persistent};
pub use backend::{Backend, IntoEntries, RawEntries, RawEntry, RawLayout};
