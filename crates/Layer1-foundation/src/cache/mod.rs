//! # Response Cache
//!
//! Memoizes generated artifacts (model responses, tool results) by a
//! fingerprint of the request that produced them.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   key    ┌───────────────┐  PersistJob  ┌──────────────┐
//! │ KeyDeriver │ ───────▶ │ ResponseCache │ ───────────▶ │ storage      │
//! └────────────┘          │ (LRU/TTL/B)   │              │ worker       │
//!                         └───────▲───────┘              └──────────────┘
//!                                 │ cleanup_expired
//!                         ┌───────┴───────┐
//!                         │    Janitor    │
//!                         └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recall_foundation::cache::{CachedArtifact, KeyDeriver, ResponseCache};
//! use recall_foundation::config::ResponseCacheConfig;
//!
//! let deriver = KeyDeriver::new();
//! let cache = ResponseCache::new(ResponseCacheConfig::default());
//!
//! let key = deriver.derive(&request)?;
//! if let Some(hit) = cache.get(&key) {
//!     return Ok(hit.content);
//! }
//! cache.put(key, CachedArtifact::text(generated))?;
//! ```
//!
//! ## Modules
//!
//! - [`key`] - Request fingerprinting
//! - [`artifact`] - Cached artifact types
//! - [`response`] - The cache itself
//! - [`janitor`] - Periodic expiry sweep
//! - [`util`] - Utilities (ordered map, hashing)

pub mod artifact;
pub mod janitor;
pub mod key;
pub mod response;
pub mod util;

pub use artifact::{ArtifactKind, CachedArtifact, ToolCall};
pub use janitor::Janitor;
pub use key::{CacheKey, KeyDerivationError, KeyDeriver, DEFAULT_VOLATILE_FIELDS, KEY_LENGTH};
pub use response::{ResponseCache, ResponseCacheStats};
pub use util::{canonical_json, hash_json, sha256_hex, OrderedMap};
