//! Registry of the searches the monitor polls.
//!
//! The registry is held in memory for the hot path (the monitor reads it at the
//! start of every tick) and optionally mirrored to a [`SearchRepository`] so
//! runtime additions survive restarts. Removing a search never touches its
//! seen-set: re-adding it later resumes with the same history.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use jobwatch_core::{Result, SearchDefinition, SearchKey, SearchRepository};

/// Thread-safe, cloneable search registry.
#[derive(Clone, Default)]
pub struct SearchRegistry {
    searches: Arc<RwLock<BTreeMap<SearchKey, SearchDefinition>>>,
    repository: Option<Arc<dyn SearchRepository>>,
}

impl SearchRegistry {
    /// Create an in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry mirrored to a durable repository.
    pub fn with_repository(repository: Arc<dyn SearchRepository>) -> Self {
        Self {
            searches: Arc::default(),
            repository: Some(repository),
        }
    }

    /// Load persisted searches; register `defaults` when none are persisted.
    ///
    /// Returns the number of searches registered afterwards.
    pub async fn hydrate(&self, defaults: &[SearchDefinition]) -> Result<usize> {
        let persisted = match &self.repository {
            Some(repository) => repository.load_all().await?,
            None => Vec::new(),
        };

        if persisted.is_empty() {
            debug!(count = defaults.len(), "No persisted searches, registering defaults");
            for search in defaults {
                self.insert(search.clone()).await;
            }
        } else {
            let mut searches = self.searches.write().await;
            for search in persisted {
                searches.entry(search.key()).or_insert(search);
            }
            info!(count = searches.len(), "Loaded persisted searches");
        }

        Ok(self.len().await)
    }

    /// Register a search. Adding an already-registered identity returns the
    /// existing definition.
    ///
    /// Fails with `InvalidSearch` for an empty query.
    pub async fn add(&self, query: &str, location: Option<&str>) -> Result<SearchDefinition> {
        let search = SearchDefinition::new(query, location)?;
        Ok(self.insert(search).await)
    }

    async fn insert(&self, search: SearchDefinition) -> SearchDefinition {
        let key = search.key();
        {
            let mut searches = self.searches.write().await;
            if let Some(existing) = searches.get(&key) {
                debug!(search = %key, "Search already registered");
                return existing.clone();
            }
            searches.insert(key.clone(), search.clone());
        }

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save(&search).await {
                warn!(search = %key, error = %e, "Failed to persist search, kept in memory only");
            }
        }

        info!(search = %key, "Added search");
        search
    }

    /// Stop scheduling a search. Returns whether it was registered.
    ///
    /// The search's seen-set is left untouched.
    pub async fn remove(&self, key: &SearchKey) -> bool {
        let removed = self.searches.write().await.remove(key).is_some();

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.delete(key).await {
                warn!(search = %key, error = %e, "Failed to remove persisted search");
            }
        }

        if removed {
            info!(search = %key, "Removed search");
        }
        removed
    }

    /// Snapshot of registered searches, ordered by key.
    pub async fn list(&self) -> Vec<SearchDefinition> {
        self.searches.read().await.values().cloned().collect()
    }

    pub async fn get(&self, key: &SearchKey) -> Option<SearchDefinition> {
        self.searches.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.searches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.searches.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_core::Error;
    use jobwatch_store::MemorySearchRepository;

    #[tokio::test]
    async fn test_add_and_list() {
        let registry = SearchRegistry::new();
        registry.add("Python Developer", Some("Warszawa")).await.unwrap();
        registry.add("DevOps Engineer", None).await.unwrap();

        let keys: Vec<_> = registry
            .list()
            .await
            .iter()
            .map(|s| s.key().to_string())
            .collect();
        assert_eq!(keys, vec!["devops engineer", "python developer:warszawa"]);
    }

    #[tokio::test]
    async fn test_add_rejects_empty_query() {
        let registry = SearchRegistry::new();
        let err = registry.add("", Some("Warszawa")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSearch(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let registry = SearchRegistry::new();
        let first = registry.add("Python Developer", Some("Warszawa")).await.unwrap();
        let second = registry.add("python developer", Some("WARSZAWA")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.query, "Python Developer");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = SearchRegistry::new();
        let search = registry.add("Cloud Engineer", Some("Warszawa")).await.unwrap();

        assert!(registry.remove(&search.key()).await);
        assert!(!registry.remove(&search.key()).await);
        assert!(registry.get(&search.key()).await.is_none());
    }

    #[tokio::test]
    async fn test_mutations_are_mirrored() {
        let repository = MemorySearchRepository::new();
        let registry = SearchRegistry::with_repository(Arc::new(repository.clone()));

        let search = registry.add("Rust Developer", None).await.unwrap();
        assert_eq!(repository.load_all().await.unwrap(), vec![search.clone()]);

        registry.remove(&search.key()).await;
        assert!(repository.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hydrate_prefers_persisted_searches() {
        let repository = MemorySearchRepository::new();
        let persisted = SearchDefinition::new("Rust Developer", Some("Gdańsk")).unwrap();
        repository.save(&persisted).await.unwrap();

        let registry = SearchRegistry::with_repository(Arc::new(repository));
        let defaults = vec![SearchDefinition::new("DevOps Engineer", None).unwrap()];

        assert_eq!(registry.hydrate(&defaults).await.unwrap(), 1);
        assert_eq!(registry.list().await, vec![persisted]);
    }

    #[tokio::test]
    async fn test_hydrate_falls_back_to_defaults() {
        let repository = MemorySearchRepository::new();
        let registry = SearchRegistry::with_repository(Arc::new(repository.clone()));
        let defaults = vec![
            SearchDefinition::new("DevOps Engineer", Some("Wroclaw")).unwrap(),
            SearchDefinition::new("DevOps Engineer", None).unwrap(),
        ];

        assert_eq!(registry.hydrate(&defaults).await.unwrap(), 2);
        assert_eq!(repository.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hydrate_without_repository_or_defaults_is_empty() {
        let registry = SearchRegistry::new();
        assert_eq!(registry.hydrate(&[]).await.unwrap(), 0);
    }
}
