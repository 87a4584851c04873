//! In-memory access token cache with single-flight refresh
//!
//! Holds access tokens keyed by resource and scope, and guarantees at most
//! one outstanding refresh per key. Entries live only in process memory and
//! are never persisted.
//!
//! Lookup lifecycle for a key:
//! 1. Unexpired entry present → returned immediately, no refresh
//! 2. Refresh already in flight → caller joins it and shares its result
//! 3. Otherwise → stale entry evicted, refresh started and registered
//! 4. Refresh settles → entry stored (on success), in-flight marker removed
//! 5. `clear()` drops everything; refreshes started before it never repopulate

pub mod cache;
pub mod entry;

pub use cache::AccessTokenCache;
pub use entry::{AccessTokenEntry, AccessTokenKey};
