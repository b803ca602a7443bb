//! In-memory store implementations.
//!
//! Same semantics as the Redis store, without durability. Failure injection
//! switches let tests simulate an unreachable backend for reads and writes
//! independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobwatch_core::{Error, Result, SearchDefinition, SearchKey, SearchRepository, SeenStore};

type SeenMap = HashMap<SearchKey, HashMap<String, DateTime<Utc>>>;

/// In-memory seen-set store.
#[derive(Clone, Default)]
pub struct MemorySeenStore {
    seen: Arc<Mutex<SeenMap>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `has`, `first_seen`, `count` and `ping` fail with `StoreUnavailable`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `mark_seen` fail with `StoreUnavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Posting ids marked for a search, sorted.
    pub fn seen_ids(&self, search: &SearchKey) -> Vec<String> {
        let seen = self.lock();
        let mut ids: Vec<String> = seen
            .get(search)
            .map(|ids| ids.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SeenMap> {
        // A poisoned map still holds consistent single-key writes.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("injected read failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn has(&self, search: &SearchKey, posting_id: &str) -> Result<bool> {
        self.check_reads()?;
        Ok(self
            .lock()
            .get(search)
            .is_some_and(|ids| ids.contains_key(posting_id)))
    }

    async fn mark_seen(&self, search: &SearchKey, posting_id: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("injected write failure".into()));
        }
        self.lock()
            .entry(search.clone())
            .or_default()
            .entry(posting_id.to_string())
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn first_seen(
        &self,
        search: &SearchKey,
        posting_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.check_reads()?;
        Ok(self
            .lock()
            .get(search)
            .and_then(|ids| ids.get(posting_id).copied()))
    }

    async fn count(&self, search: &SearchKey) -> Result<u64> {
        self.check_reads()?;
        Ok(self.lock().get(search).map_or(0, |ids| ids.len() as u64))
    }

    async fn ping(&self) -> Result<()> {
        self.check_reads()
    }
}

/// In-memory search registry mirror.
#[derive(Clone, Default)]
pub struct MemorySearchRepository {
    searches: Arc<Mutex<BTreeMap<SearchKey, SearchDefinition>>>,
}

impl MemorySearchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<SearchKey, SearchDefinition>> {
        self.searches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SearchRepository for MemorySearchRepository {
    async fn load_all(&self) -> Result<Vec<SearchDefinition>> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn save(&self, search: &SearchDefinition) -> Result<()> {
        self.lock()
            .entry(search.key())
            .or_insert_with(|| search.clone());
        Ok(())
    }

    async fn delete(&self, key: &SearchKey) -> Result<bool> {
        Ok(self.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SearchKey {
        SearchKey::from("python developer:warszawa")
    }

    #[tokio::test]
    async fn test_mark_then_has() {
        let store = MemorySeenStore::new();
        assert!(!store.has(&key(), "P1").await.unwrap());
        store.mark_seen(&key(), "P1").await.unwrap();
        assert!(store.has(&key(), "P1").await.unwrap());
        assert_eq!(store.count(&key()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_seen_is_idempotent_and_keeps_first_seen() {
        let store = MemorySeenStore::new();
        store.mark_seen(&key(), "P1").await.unwrap();
        let first = store.first_seen(&key(), "P1").await.unwrap().unwrap();

        store.mark_seen(&key(), "P1").await.unwrap();
        let again = store.first_seen(&key(), "P1").await.unwrap().unwrap();

        assert_eq!(first, again);
        assert_eq!(store.count(&key()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_namespaces_are_partitioned() {
        let store = MemorySeenStore::new();
        let other = SearchKey::from("devops engineer");
        store.mark_seen(&key(), "P1").await.unwrap();

        assert!(!store.has(&other, "P1").await.unwrap());
        assert_eq!(store.count(&other).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_injected_read_failure() {
        let store = MemorySeenStore::new();
        store.set_fail_reads(true);
        let err = store.has(&key(), "P1").await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(store.ping().await.is_err());

        store.set_fail_reads(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_write_failure_leaves_state_untouched() {
        let store = MemorySeenStore::new();
        store.set_fail_writes(true);
        assert!(store.mark_seen(&key(), "P1").await.is_err());
        assert!(store.seen_ids(&key()).is_empty());
    }

    #[tokio::test]
    async fn test_search_repository_save_delete() {
        let repo = MemorySearchRepository::new();
        let search = SearchDefinition::new("Python Developer", Some("Warszawa")).unwrap();

        repo.save(&search).await.unwrap();
        repo.save(&search).await.unwrap();
        assert_eq!(repo.load_all().await.unwrap(), vec![search.clone()]);

        assert!(repo.delete(&search.key()).await.unwrap());
        assert!(!repo.delete(&search.key()).await.unwrap());
        assert!(repo.load_all().await.unwrap().is_empty());
    }
}
