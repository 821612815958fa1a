//! Data model for booth configuration sync
//!
//! This crate holds the leaf types every other crate builds on:
//! - Content hashing (BLAKE3, hex encoded in manifests)
//! - Sync items and their kind-specific payloads
//! - Sync manifests (local and remote views)
//! - Booth identity generation

pub mod errors;
pub mod hash;
pub mod identity;
pub mod item;
pub mod manifest;

pub use errors::{ManifestError, Result};
pub use hash::ContentHash;
pub use identity::BoothId;
pub use item::{ItemKey, ItemPayload, SyncItem, SyncKind, EVENTS_TABLE};
pub use manifest::{SyncManifest, MANIFEST_FORMAT_VERSION, REMOTE_BOOTH_ID};
