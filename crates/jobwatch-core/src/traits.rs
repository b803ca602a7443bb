//! Core traits for jobwatch abstractions.
//!
//! These traits define the seams between the monitor engine and its
//! collaborators, enabling pluggable backends and testability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{DeliveryError, FetchError, Result};
use crate::models::{Posting, SearchDefinition, SearchKey};

// =============================================================================
// SOURCES
// =============================================================================

/// Returns the postings currently visible on a job board for a search.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    /// Short name of the source, used in logs.
    fn source_name(&self) -> &str;

    /// Fetch the current postings, in the order the source lists them.
    async fn fetch(&self, search: &SearchDefinition) -> std::result::Result<Vec<Posting>, FetchError>;
}

/// Delivers a human-readable alert for a newly observed posting.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name of the channel, used in logs.
    fn channel_name(&self) -> &str;

    /// Attempt delivery. The search is passed so the alert can name it.
    async fn send(
        &self,
        search: &SearchDefinition,
        posting: &Posting,
    ) -> std::result::Result<(), DeliveryError>;
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Persistent per-search record of posting ids already notified.
///
/// Implementations must be safe to call concurrently for different searches.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Whether the posting was already marked for this search.
    ///
    /// Fails with [`Error::StoreUnavailable`](crate::Error::StoreUnavailable)
    /// when the backend cannot be reached.
    async fn has(&self, search: &SearchKey, posting_id: &str) -> Result<bool>;

    /// Mark the posting as seen. Marking an already-seen id is a no-op success
    /// and keeps the original first-seen timestamp.
    async fn mark_seen(&self, search: &SearchKey, posting_id: &str) -> Result<()>;

    /// First-seen timestamp of a marked posting, `None` if unmarked.
    async fn first_seen(&self, search: &SearchKey, posting_id: &str)
        -> Result<Option<DateTime<Utc>>>;

    /// Number of postings marked for a search.
    async fn count(&self, search: &SearchKey) -> Result<u64>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Durable mirror of the search registry.
#[async_trait]
pub trait SearchRepository: Send + Sync {
    /// Load every persisted search definition.
    async fn load_all(&self) -> Result<Vec<SearchDefinition>>;

    /// Persist a definition. Saving an existing definition is a no-op.
    async fn save(&self, search: &SearchDefinition) -> Result<()>;

    /// Remove a definition by key. Returns whether it existed.
    async fn delete(&self, key: &SearchKey) -> Result<bool>;
}
