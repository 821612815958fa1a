//! Storage layer for booth sync
//!
//! Provides:
//! - The object-store client contract and two implementations
//!   (filesystem-backed bucket, in-memory)
//! - Crash-safe atomic file writes
//! - Loading, persisting, fetching and publishing manifests

pub mod atomic;
pub mod errors;
pub mod fs_store;
pub mod manifest_store;
pub mod memory;
pub mod object_store;

pub use atomic::{write_atomic, AtomicWriteResult, AtomicWriter};
pub use errors::{Result, StoreError};
pub use fs_store::FsObjectStore;
pub use manifest_store::{FetchedManifest, ManifestStore, RemoteOrigin, MANIFEST_KEY};
pub use memory::InMemoryObjectStore;
pub use object_store::{validate_key, ObjectStore};
