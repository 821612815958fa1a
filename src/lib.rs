//! Boothsync workspace root
//!
//! Re-exports the member crates and hosts end-to-end tests that run several
//! booths against one shared store.

pub use booth_manifest as manifest;
pub use booth_store as store;
pub use booth_sync as sync;
