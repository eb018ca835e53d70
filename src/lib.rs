//! TuneVault library core
//!
//! This library exposes the internal modules for the binary and for testing.

pub mod config;
pub mod library_store;
pub mod sqlite_persistence;
pub mod sync;
pub mod tags;

// Re-export commonly used types for convenience
pub use library_store::{LibraryError, LibraryResult, LibraryStore, LibraryStoreOptions};
pub use tags::{LoftyTagCodec, NullTagCodec, TagCodec};
