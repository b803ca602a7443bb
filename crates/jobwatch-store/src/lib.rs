//! # jobwatch-store
//!
//! Persistence adapters for jobwatch.
//!
//! - [`RedisStore`]: durable seen-set (one hash per search) and registry mirror.
//! - [`MemorySeenStore`] / [`MemorySearchRepository`]: in-process equivalents
//!   with failure injection, used by tests and the non-durable `memory://` target.
//!
//! ## Example
//!
//! ```ignore
//! use jobwatch_store::RedisStore;
//! use jobwatch_core::{SearchKey, SeenStore};
//!
//! let store = RedisStore::connect("redis://localhost:6379").await?;
//! let key = SearchKey::from("python developer:warszawa");
//! if !store.has(&key, "1002345").await? {
//!     store.mark_seen(&key, "1002345").await?;
//! }
//! ```

pub mod memory;
pub mod redis_store;

pub use memory::{MemorySearchRepository, MemorySeenStore};
pub use redis_store::RedisStore;

/// URL scheme selecting the in-memory store.
pub const MEMORY_URL_SCHEME: &str = "memory://";

/// Whether a store target selects the non-durable in-memory backend.
pub fn is_memory_url(url: &str) -> bool {
    url.starts_with(MEMORY_URL_SCHEME)
}
