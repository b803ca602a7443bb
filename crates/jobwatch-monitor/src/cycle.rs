//! One fetch, diff and notify pass for a single search.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use jobwatch_core::{
    DeliveryError, FetchError, ListingFetcher, Notifier, Posting, SearchDefinition, SearchKey,
    SeenStore,
};

use crate::monitor::MonitorEvent;

/// Counts reported by a completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Postings returned by the fetcher.
    pub fetched: usize,
    /// Postings skipped because they were already in the seen-set.
    pub already_seen: usize,
    /// Postings delivered in this cycle.
    pub notified: usize,
    /// Deliveries that failed and were left unmarked.
    pub delivery_failures: usize,
    /// Postings marked seen after repeated permanent delivery failures.
    pub abandoned: usize,
    /// Deliveries that succeeded but could not be recorded.
    pub mark_failures: usize,
}

/// Why a cycle produced no report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleFailure {
    /// The fetcher failed; no posting was considered.
    Fetch(FetchError),
    /// The seen-set could not be read; the rest of the cycle was skipped.
    StoreUnavailable(String),
}

impl std::fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleFailure::Fetch(e) => write!(f, "{e}"),
            CycleFailure::StoreUnavailable(msg) => write!(f, "Store unavailable: {msg}"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type FailureCounts = Arc<Mutex<HashMap<(SearchKey, String), u32>>>;

/// Collaborators and bookkeeping shared by every cycle.
///
/// Cheap to clone so each spawned cycle task owns its references.
#[derive(Clone)]
pub(crate) struct CycleRunner {
    fetcher: Arc<dyn ListingFetcher>,
    store: Arc<dyn SeenStore>,
    notifier: Arc<dyn Notifier>,
    event_tx: broadcast::Sender<MonitorEvent>,
    max_permanent_failures: u32,
    store_alert_threshold: u32,
    /// Consecutive permanent delivery failures per (search, posting).
    permanent_failures: FailureCounts,
    /// Consecutive cycles per search that could not read the store.
    store_failures: Arc<Mutex<HashMap<SearchKey, u32>>>,
}

enum Delivery {
    Notified,
    Failed,
    Abandoned,
}

impl CycleRunner {
    pub(crate) fn new(
        fetcher: Arc<dyn ListingFetcher>,
        store: Arc<dyn SeenStore>,
        notifier: Arc<dyn Notifier>,
        event_tx: broadcast::Sender<MonitorEvent>,
        max_permanent_failures: u32,
        store_alert_threshold: u32,
    ) -> Self {
        Self {
            fetcher,
            store,
            notifier,
            event_tx,
            max_permanent_failures,
            store_alert_threshold: store_alert_threshold.max(1),
            permanent_failures: Arc::default(),
            store_failures: Arc::default(),
        }
    }

    /// Run one cycle. Every failure is contained here; nothing propagates to
    /// other searches.
    pub(crate) async fn run(&self, search: &SearchDefinition) -> Result<CycleReport, CycleFailure> {
        let start = Instant::now();
        let key = search.key();

        let postings = match self.fetcher.fetch(search).await {
            Ok(postings) => postings,
            Err(e) => {
                self.report_fetch_failure(&key, &e);
                return Err(CycleFailure::Fetch(e));
            }
        };

        let mut report = CycleReport {
            fetched: postings.len(),
            ..CycleReport::default()
        };
        let mut handled: HashSet<&str> = HashSet::with_capacity(postings.len());

        for posting in &postings {
            if !handled.insert(posting.id.as_str()) {
                debug!(search = %key, posting_id = %posting.id, "Duplicate posting in listing, skipping");
                continue;
            }

            match self.store.has(&key, &posting.id).await {
                Ok(true) => {
                    report.already_seen += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    let message = e.to_string();
                    self.report_store_failure(&key, &message);
                    return Err(CycleFailure::StoreUnavailable(message));
                }
            }

            match self.deliver(search, &key, posting, &mut report).await {
                Delivery::Notified => report.notified += 1,
                Delivery::Failed => report.delivery_failures += 1,
                Delivery::Abandoned => report.abandoned += 1,
            }
        }

        lock(&self.store_failures).remove(&key);
        self.prune_failure_counts(&key, &handled);

        info!(
            search = %key,
            source = self.fetcher.source_name(),
            fetched = report.fetched,
            already_seen = report.already_seen,
            notified = report.notified,
            delivery_failures = report.delivery_failures,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cycle completed"
        );
        let _ = self.event_tx.send(MonitorEvent::CycleCompleted {
            search: key,
            fetched: report.fetched,
            notified: report.notified,
        });

        Ok(report)
    }

    /// Deliver a new posting and record it only once delivery is done.
    async fn deliver(
        &self,
        search: &SearchDefinition,
        key: &SearchKey,
        posting: &Posting,
        report: &mut CycleReport,
    ) -> Delivery {
        let tracker_key = (key.clone(), posting.id.clone());

        match self.notifier.send(search, posting).await {
            Ok(()) => {
                lock(&self.permanent_failures).remove(&tracker_key);
                debug!(search = %key, posting_id = %posting.id, "Posting notified");
                if !self.mark_seen(key, &posting.id).await {
                    report.mark_failures += 1;
                }
                let _ = self.event_tx.send(MonitorEvent::PostingNotified {
                    search: key.clone(),
                    posting_id: posting.id.clone(),
                });
                Delivery::Notified
            }
            Err(e @ DeliveryError::Transient(_)) => {
                lock(&self.permanent_failures).remove(&tracker_key);
                warn!(
                    search = %key,
                    posting_id = %posting.id,
                    channel = self.notifier.channel_name(),
                    error = %e,
                    "Delivery failed, will retry next cycle"
                );
                self.emit_delivery_failure(key, posting, &e);
                Delivery::Failed
            }
            Err(e @ DeliveryError::Permanent(_)) => {
                let attempts = {
                    let mut counts = lock(&self.permanent_failures);
                    let attempts = counts.entry(tracker_key.clone()).or_insert(0);
                    *attempts += 1;
                    *attempts
                };
                self.emit_delivery_failure(key, posting, &e);

                if self.max_permanent_failures == 0 || attempts < self.max_permanent_failures {
                    error!(
                        search = %key,
                        posting_id = %posting.id,
                        channel = self.notifier.channel_name(),
                        attempts,
                        error = %e,
                        "Delivery rejected"
                    );
                    return Delivery::Failed;
                }

                if !self.mark_seen(key, &posting.id).await {
                    report.mark_failures += 1;
                    return Delivery::Failed;
                }
                lock(&self.permanent_failures).remove(&tracker_key);
                error!(
                    search = %key,
                    posting_id = %posting.id,
                    attempts,
                    error = %e,
                    "Delivery rejected repeatedly, posting abandoned"
                );
                let _ = self.event_tx.send(MonitorEvent::PostingAbandoned {
                    search: key.clone(),
                    posting_id: posting.id.clone(),
                    attempts,
                });
                Delivery::Abandoned
            }
        }
    }

    async fn mark_seen(&self, key: &SearchKey, posting_id: &str) -> bool {
        match self.store.mark_seen(key, posting_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    search = %key,
                    posting_id,
                    error = %e,
                    "Failed to record posting as seen, it may be notified again"
                );
                let _ = self.event_tx.send(MonitorEvent::MarkFailed {
                    search: key.clone(),
                    posting_id: posting_id.to_string(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    fn emit_delivery_failure(&self, key: &SearchKey, posting: &Posting, e: &DeliveryError) {
        let _ = self.event_tx.send(MonitorEvent::DeliveryFailed {
            search: key.clone(),
            posting_id: posting.id.clone(),
            permanent: !e.is_transient(),
            error: e.message().to_string(),
        });
    }

    fn report_fetch_failure(&self, key: &SearchKey, e: &FetchError) {
        let source = self.fetcher.source_name();
        if e.is_transient() {
            warn!(search = %key, source, error = %e, "Fetch failed, will retry next tick");
        } else {
            error!(search = %key, source, error = %e, "Fetch failed permanently");
        }
        let _ = self.event_tx.send(MonitorEvent::FetchFailed {
            search: key.clone(),
            permanent: !e.is_transient(),
            error: e.message().to_string(),
        });
    }

    fn report_store_failure(&self, key: &SearchKey, message: &str) {
        let consecutive_failures = {
            let mut failures = lock(&self.store_failures);
            let count = failures.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };

        warn!(
            search = %key,
            consecutive_failures,
            error = message,
            "Seen-set unavailable, skipping cycle"
        );
        let _ = self.event_tx.send(MonitorEvent::StoreUnavailable {
            search: key.clone(),
            consecutive_failures,
            error: message.to_string(),
        });

        if consecutive_failures == self.store_alert_threshold {
            error!(
                search = %key,
                consecutive_failures,
                error = message,
                "Seen-set unavailable for consecutive cycles"
            );
            let _ = self.event_tx.send(MonitorEvent::StoreDegraded {
                search: key.clone(),
                consecutive_failures,
            });
        }
    }

    /// Forget failure counts for postings that left the listing.
    fn prune_failure_counts(&self, key: &SearchKey, listed: &HashSet<&str>) {
        lock(&self.permanent_failures)
            .retain(|(search, posting_id), _| search != key || listed.contains(posting_id.as_str()));
    }

    #[cfg(test)]
    fn pending_failures(&self, key: &SearchKey, posting_id: &str) -> Option<u32> {
        lock(&self.permanent_failures)
            .get(&(key.clone(), posting_id.to_string()))
            .copied()
    }
}
