//! Scripted collaborators for deterministic testing.
//!
//! ## Usage
//!
//! ```rust
//! use jobwatch_core::{DeliveryError, FetchError, Posting, SearchDefinition};
//! use jobwatch_sources::mock::{RecordingNotifier, ScriptedFetcher};
//!
//! let search = SearchDefinition::new("Python Developer", Some("Warszawa")).unwrap();
//! let fetcher = ScriptedFetcher::new();
//! fetcher.push(&search, Err(FetchError::Transient("HTTP 503".into())));
//! fetcher.push(&search, Ok(vec![Posting::new("P1", "Dev", "https://example.com/P1")]));
//!
//! let notifier = RecordingNotifier::new();
//! notifier.fail_times("P1", DeliveryError::Transient("HTTP 502".into()), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use jobwatch_core::{
    DeliveryError, FetchError, ListingFetcher, Notifier, Posting, SearchDefinition, SearchKey,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type FetchResult = Result<Vec<Posting>, FetchError>;

/// Fetcher that replays scripted responses per search.
///
/// Responses are consumed in order; the last one keeps repeating. Searches
/// without a script return no postings.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    scripts: Arc<Mutex<HashMap<SearchKey, VecDeque<FetchResult>>>>,
    calls: Arc<Mutex<Vec<SearchKey>>>,
    latency: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch, to exercise concurrency and shutdown paths.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Append a response to the script of a search.
    pub fn push(&self, search: &SearchDefinition, response: FetchResult) {
        lock(&self.scripts)
            .entry(search.key())
            .or_default()
            .push_back(response);
    }

    /// Every search key fetched so far, in call order.
    pub fn calls(&self) -> Vec<SearchKey> {
        lock(&self.calls).clone()
    }

    /// Number of fetches made for one search.
    pub fn call_count(&self, search: &SearchDefinition) -> usize {
        let key = search.key();
        lock(&self.calls).iter().filter(|k| **k == key).count()
    }

    fn next_response(&self, key: &SearchKey) -> FetchResult {
        let mut scripts = lock(&self.scripts);
        match scripts.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| Ok(Vec::new())),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Ok(Vec::new())),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ListingFetcher for ScriptedFetcher {
    fn source_name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, search: &SearchDefinition) -> FetchResult {
        let key = search.key();
        lock(&self.calls).push(key.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_response(&key)
    }
}

/// A delivery attempt seen by the [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub search: SearchKey,
    pub posting_id: String,
    pub succeeded: bool,
}

/// Notifier that records every attempt and fails on request.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    attempts: Arc<Mutex<Vec<Delivery>>>,
    /// posting id -> (error, remaining failures; `None` = forever)
    failures: Arc<Mutex<HashMap<String, (DeliveryError, Option<u32>)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery of a posting until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, posting_id: &str, error: DeliveryError) {
        lock(&self.failures).insert(posting_id.to_string(), (error, None));
    }

    /// Fail the next `times` deliveries of a posting.
    pub fn fail_times(&self, posting_id: &str, error: DeliveryError, times: u32) {
        lock(&self.failures).insert(posting_id.to_string(), (error, Some(times)));
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// All attempts, successful or not, in call order.
    pub fn attempts(&self) -> Vec<Delivery> {
        lock(&self.attempts).clone()
    }

    /// Posting ids successfully delivered, in delivery order.
    pub fn delivered(&self) -> Vec<String> {
        lock(&self.attempts)
            .iter()
            .filter(|d| d.succeeded)
            .map(|d| d.posting_id.clone())
            .collect()
    }

    /// Posting ids successfully delivered for one search.
    pub fn delivered_for(&self, search: &SearchDefinition) -> Vec<String> {
        let key = search.key();
        lock(&self.attempts)
            .iter()
            .filter(|d| d.succeeded && d.search == key)
            .map(|d| d.posting_id.clone())
            .collect()
    }

    fn take_failure(&self, posting_id: &str) -> Option<DeliveryError> {
        let mut failures = lock(&self.failures);
        let (error, remaining) = failures.get(posting_id).cloned()?;
        match remaining {
            None => Some(error),
            Some(0) => {
                failures.remove(posting_id);
                None
            }
            Some(1) => {
                failures.remove(posting_id);
                Some(error)
            }
            Some(n) => {
                failures.insert(posting_id.to_string(), (error.clone(), Some(n - 1)));
                Some(error)
            }
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel_name(&self) -> &str {
        "recording"
    }

    async fn send(&self, search: &SearchDefinition, posting: &Posting) -> Result<(), DeliveryError> {
        let failure = self.take_failure(&posting.id);
        lock(&self.attempts).push(Delivery {
            search: search.key(),
            posting_id: posting.id.clone(),
            succeeded: failure.is_none(),
        });
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search() -> SearchDefinition {
        SearchDefinition::new("Python Developer", Some("Warszawa")).unwrap()
    }

    fn posting(id: &str) -> Posting {
        Posting::new(id, "Dev", format!("https://example.com/{id}"))
    }

    #[tokio::test]
    async fn test_scripted_fetcher_replays_then_repeats_last() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push(&search(), Err(FetchError::Transient("down".into())));
        fetcher.push(&search(), Ok(vec![posting("P1")]));

        assert!(fetcher.fetch(&search()).await.is_err());
        assert_eq!(fetcher.fetch(&search()).await.unwrap().len(), 1);
        assert_eq!(fetcher.fetch(&search()).await.unwrap().len(), 1);
        assert_eq!(fetcher.call_count(&search()), 3);
    }

    #[tokio::test]
    async fn test_scripted_fetcher_unscripted_search_is_empty() {
        let fetcher = ScriptedFetcher::new();
        assert!(fetcher.fetch(&search()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_notifier_fail_times() {
        let notifier = RecordingNotifier::new();
        notifier.fail_times("P1", DeliveryError::Transient("502".into()), 2);

        assert!(notifier.send(&search(), &posting("P1")).await.is_err());
        assert!(notifier.send(&search(), &posting("P1")).await.is_err());
        assert!(notifier.send(&search(), &posting("P1")).await.is_ok());

        assert_eq!(notifier.attempts().len(), 3);
        assert_eq!(notifier.delivered(), vec!["P1"]);
    }

    #[tokio::test]
    async fn test_recording_notifier_fail_always() {
        let notifier = RecordingNotifier::new();
        notifier.fail_always("P1", DeliveryError::Permanent("bad chat".into()));
        for _ in 0..5 {
            assert!(notifier.send(&search(), &posting("P1")).await.is_err());
        }
        notifier.clear_failures();
        assert!(notifier.send(&search(), &posting("P1")).await.is_ok());
    }
}
