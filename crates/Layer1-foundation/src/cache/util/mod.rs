//! Cache utilities
//!
//! Provides caching primitives for recall:
//! - `OrderedMap`: hash map with O(1) move-to-back / pop-front
//! - canonical JSON serialization and SHA-256 fingerprints
//! - non-finite float detection ahead of JSON conversion

mod finite;
mod hash;
mod lru;

pub use finite::{ensure_finite, NonFiniteError};
pub use hash::{canonical_json, hash_json, sha256_hex};
pub use lru::{Iter, OrderedMap};
