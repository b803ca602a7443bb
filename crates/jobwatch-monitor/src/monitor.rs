//! Fixed-interval monitor loop and its control handle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use jobwatch_core::defaults::{
    CHECK_INTERVAL_SECS, EVENT_BUS_CAPACITY, MONITOR_MAX_CONCURRENT,
    MONITOR_MAX_PERMANENT_FAILURES, MONITOR_SEARCH_SPACING_MS, MONITOR_SHUTDOWN_GRACE_SECS,
    MONITOR_STORE_ALERT_THRESHOLD,
};
use jobwatch_core::{
    Error, ListingFetcher, Notifier, Result, SearchDefinition, SearchKey, SeenStore,
};

use crate::cycle::{CycleFailure, CycleReport, CycleRunner};
use crate::registry::SearchRegistry;

/// Configuration for the monitor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Seconds between tick starts.
    pub interval_secs: u64,
    /// Maximum number of cycles running at once within a tick.
    pub max_concurrent_searches: usize,
    /// Delay between consecutive cycle launches within a tick.
    pub search_spacing_ms: u64,
    /// Permanent delivery failures before a posting is abandoned (0 = never).
    pub max_permanent_failures: u32,
    /// Grace period for in-flight cycles on shutdown.
    pub shutdown_grace_secs: u64,
    /// Consecutive store failures for a search before escalation.
    pub store_alert_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: CHECK_INTERVAL_SECS,
            max_concurrent_searches: MONITOR_MAX_CONCURRENT,
            search_spacing_ms: MONITOR_SEARCH_SPACING_MS,
            max_permanent_failures: MONITOR_MAX_PERMANENT_FAILURES,
            shutdown_grace_secs: MONITOR_SHUTDOWN_GRACE_SECS,
            store_alert_threshold: MONITOR_STORE_ALERT_THRESHOLD,
        }
    }
}

impl MonitorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CHECK_INTERVAL_SECS` | `300` | Seconds between ticks (must be > 0) |
    /// | `MONITOR_MAX_CONCURRENT` | `4` | Parallel cycles per tick |
    /// | `MONITOR_SEARCH_SPACING_MS` | `1000` | Delay between cycle launches |
    /// | `MONITOR_MAX_PERMANENT_FAILURES` | `3` | Abandonment threshold, 0 = never |
    /// | `MONITOR_SHUTDOWN_GRACE_SECS` | `10` | Grace for in-flight cycles |
    /// | `MONITOR_STORE_ALERT_THRESHOLD` | `5` | Store failures before escalation |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config through a variable lookup function.
    ///
    /// Unparseable values are configuration errors rather than silently
    /// replaced by defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let interval_secs = parse_var(&lookup, "CHECK_INTERVAL_SECS", defaults.interval_secs)?;
        if interval_secs == 0 {
            return Err(Error::Config(
                "CHECK_INTERVAL_SECS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            interval_secs,
            max_concurrent_searches: parse_var(
                &lookup,
                "MONITOR_MAX_CONCURRENT",
                defaults.max_concurrent_searches,
            )?
            .max(1),
            search_spacing_ms: parse_var(
                &lookup,
                "MONITOR_SEARCH_SPACING_MS",
                defaults.search_spacing_ms,
            )?,
            max_permanent_failures: parse_var(
                &lookup,
                "MONITOR_MAX_PERMANENT_FAILURES",
                defaults.max_permanent_failures,
            )?,
            shutdown_grace_secs: parse_var(
                &lookup,
                "MONITOR_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace_secs,
            )?,
            store_alert_threshold: parse_var(
                &lookup,
                "MONITOR_STORE_ALERT_THRESHOLD",
                defaults.store_alert_threshold,
            )?
            .max(1),
        })
    }

    /// Set the tick interval in seconds.
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Set maximum concurrent cycles per tick.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_searches = max;
        self
    }

    /// Set the delay between cycle launches.
    pub fn with_search_spacing_ms(mut self, ms: u64) -> Self {
        self.search_spacing_ms = ms;
        self
    }

    /// Set the abandonment threshold (0 disables abandonment).
    pub fn with_max_permanent_failures(mut self, max: u32) -> Self {
        self.max_permanent_failures = max;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.shutdown_grace_secs = secs;
        self
    }

    /// Set the store failure escalation threshold (at least 1).
    pub fn with_store_alert_threshold(mut self, threshold: u32) -> Self {
        self.store_alert_threshold = threshold.max(1);
        self
    }

    /// Tick interval, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{value}'"))),
        _ => Ok(default),
    }
}

/// Event emitted by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Monitor loop started.
    MonitorStarted { searches: usize },
    /// A tick started for a snapshot of the registry.
    TickStarted { tick_id: Uuid, searches: usize },
    /// Every cycle of a tick finished.
    TickCompleted {
        tick_id: Uuid,
        succeeded: usize,
        failed: usize,
    },
    /// A cycle ran to completion.
    CycleCompleted {
        search: SearchKey,
        fetched: usize,
        notified: usize,
    },
    /// The fetcher failed for a search.
    FetchFailed {
        search: SearchKey,
        permanent: bool,
        error: String,
    },
    /// The seen-set could not be read during a cycle.
    StoreUnavailable {
        search: SearchKey,
        consecutive_failures: u32,
        error: String,
    },
    /// Store failures for a search reached the alert threshold.
    StoreDegraded {
        search: SearchKey,
        consecutive_failures: u32,
    },
    /// A posting was delivered.
    PostingNotified { search: SearchKey, posting_id: String },
    /// A delivery failed and the posting stays unmarked.
    DeliveryFailed {
        search: SearchKey,
        posting_id: String,
        permanent: bool,
        error: String,
    },
    /// A posting was marked seen after repeated permanent failures.
    PostingAbandoned {
        search: SearchKey,
        posting_id: String,
        attempts: u32,
    },
    /// A delivered posting could not be recorded as seen.
    MarkFailed {
        search: SearchKey,
        posting_id: String,
        error: String,
    },
    /// Monitor loop stopped.
    MonitorStopped,
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick_id: Uuid,
    /// Cycles that completed.
    pub succeeded: usize,
    /// Cycles that failed on fetch or store access.
    pub failed: usize,
    /// Postings delivered across all cycles.
    pub notified: usize,
}

/// Handle for controlling a running monitor.
pub struct MonitorHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<MonitorEvent>,
    registry: SearchRegistry,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the monitor to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for monitor events.
    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_rx.resubscribe()
    }

    /// The registry the running monitor reads at every tick.
    pub fn registry(&self) -> &SearchRegistry {
        &self.registry
    }

    /// Wait for the monitor loop to exit.
    pub async fn wait(self) -> Result<()> {
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Monitor task failed: {e}")))
    }
}

/// Monitor that polls every registered search on a fixed interval.
pub struct Monitor {
    config: MonitorConfig,
    registry: SearchRegistry,
    runner: CycleRunner,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl Monitor {
    /// Create a new monitor over an empty in-memory registry.
    pub fn new(
        fetcher: Arc<dyn ListingFetcher>,
        store: Arc<dyn SeenStore>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self::with_registry(fetcher, store, notifier, config, SearchRegistry::new())
    }

    fn with_registry(
        fetcher: Arc<dyn ListingFetcher>,
        store: Arc<dyn SeenStore>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
        registry: SearchRegistry,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let runner = CycleRunner::new(
            fetcher,
            store,
            notifier,
            event_tx.clone(),
            config.max_permanent_failures,
            config.store_alert_threshold,
        );
        Self {
            config,
            registry,
            runner,
            event_tx,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The search registry. Mutations take effect on the next tick.
    pub fn registry(&self) -> &SearchRegistry {
        &self.registry
    }

    /// Get a receiver for monitor events.
    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    /// Run a single cycle for one search outside the loop.
    pub async fn run_cycle(
        &self,
        search: &SearchDefinition,
    ) -> std::result::Result<CycleReport, CycleFailure> {
        self.runner.run(search).await
    }

    /// Run one tick over the current registry snapshot and wait for it.
    pub async fn tick(&self) -> TickReport {
        let tick_id = jobwatch_core::new_v7();
        let mut tasks = self.launch_tick(tick_id).await;
        let mut outcomes = Vec::new();
        while let Some(result) = tasks.join_next().await {
            outcomes.push(result);
        }
        self.finish_tick(tick_id, outcomes)
    }

    /// Start the monitor and return a handle for control.
    pub fn start(self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let registry = self.registry.clone();

        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        MonitorHandle {
            shutdown_tx,
            event_rx,
            registry,
            join,
        }
    }

    /// Spawn one cycle per registered search, spaced and bounded.
    async fn launch_tick(
        &self,
        tick_id: Uuid,
    ) -> JoinSet<(SearchKey, std::result::Result<CycleReport, CycleFailure>)> {
        let searches = self.registry.list().await;
        info!(%tick_id, searches = searches.len(), "Tick started");
        let _ = self.event_tx.send(MonitorEvent::TickStarted {
            tick_id,
            searches: searches.len(),
        });

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_searches.max(1)));
        let spacing = Duration::from_millis(self.config.search_spacing_ms);
        let mut tasks = JoinSet::new();

        for (index, search) in searches.into_iter().enumerate() {
            let runner = self.runner.clone();
            let permits = permits.clone();
            let delay = spacing * index as u32;
            let span = tracing::info_span!("cycle", %tick_id, search = %search.key());

            tasks.spawn(
                async move {
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    let key = search.key();
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    let outcome = runner.run(&search).await;
                    (key, outcome)
                }
                .instrument(span),
            );
        }

        tasks
    }

    fn finish_tick(
        &self,
        tick_id: Uuid,
        outcomes: Vec<
            std::result::Result<
                (SearchKey, std::result::Result<CycleReport, CycleFailure>),
                tokio::task::JoinError,
            >,
        >,
    ) -> TickReport {
        let mut report = TickReport {
            tick_id,
            succeeded: 0,
            failed: 0,
            notified: 0,
        };

        for outcome in outcomes {
            match outcome {
                Ok((_, Ok(cycle))) => {
                    report.succeeded += 1;
                    report.notified += cycle.notified;
                }
                Ok((search, Err(failure))) => {
                    debug!(%tick_id, search = %search, error = %failure, "Cycle failed");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(%tick_id, error = ?e, "Cycle task panicked");
                    report.failed += 1;
                }
            }
        }

        info!(
            %tick_id,
            succeeded = report.succeeded,
            failed = report.failed,
            notified = report.notified,
            "Tick completed"
        );
        let _ = self.event_tx.send(MonitorEvent::TickCompleted {
            tick_id,
            succeeded: report.succeeded,
            failed: report.failed,
        });
        report
    }

    /// Run ticks until a shutdown signal arrives.
    ///
    /// The first tick fires immediately. A tick that overruns the interval
    /// delays the next one instead of bursting.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        let searches = self.registry.len().await;
        info!(
            interval_secs = self.config.interval_secs,
            max_concurrent = self.config.max_concurrent_searches,
            searches,
            "Monitor started"
        );
        let _ = self.event_tx.send(MonitorEvent::MonitorStarted { searches });

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'ticks: loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Monitor received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            let tick_id = jobwatch_core::new_v7();
            let mut tasks = self.launch_tick(tick_id).await;
            let mut outcomes = Vec::new();

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(%tick_id, in_flight = tasks.len(), "Monitor received shutdown signal");
                        self.drain(&mut tasks).await;
                        break 'ticks;
                    }
                    joined = tasks.join_next() => match joined {
                        Some(outcome) => outcomes.push(outcome),
                        None => break,
                    },
                }
            }

            self.finish_tick(tick_id, outcomes);
            debug!(%tick_id, duration_ms = started.elapsed().as_millis() as u64, "Tick finished");
        }

        let _ = self.event_tx.send(MonitorEvent::MonitorStopped);
        info!("Monitor stopped");
    }

    /// Give in-flight cycles the grace period, then abort the rest.
    async fn drain(
        &self,
        tasks: &mut JoinSet<(SearchKey, std::result::Result<CycleReport, CycleFailure>)>,
    ) {
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = ?e, "Cycle task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                aborted = tasks.len(),
                grace_secs = self.config.shutdown_grace_secs,
                "Aborting cycles still running after shutdown grace period"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }
}

/// Builder for creating a monitor with its collaborators.
pub struct MonitorBuilder {
    fetcher: Arc<dyn ListingFetcher>,
    store: Arc<dyn SeenStore>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    registry: Option<SearchRegistry>,
    searches: Vec<SearchDefinition>,
}

impl MonitorBuilder {
    /// Create a new monitor builder.
    pub fn new(
        fetcher: Arc<dyn ListingFetcher>,
        store: Arc<dyn SeenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fetcher,
            store,
            notifier,
            config: MonitorConfig::default(),
            registry: None,
            searches: Vec::new(),
        }
    }

    /// Set the monitor configuration.
    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing (possibly persisted) registry.
    pub fn with_registry(mut self, registry: SearchRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register searches when the monitor is built.
    pub fn with_searches(mut self, searches: Vec<SearchDefinition>) -> Self {
        self.searches.extend(searches);
        self
    }

    /// Build and return the monitor.
    pub async fn build(self) -> Monitor {
        let registry = self.registry.unwrap_or_default();
        for search in self.searches {
            if let Err(e) = registry.add(&search.query, search.location.as_deref()).await {
                warn!(search = %search.key(), error = %e, "Skipping invalid search");
            }
        }

        Monitor::with_registry(
            self.fetcher,
            self.store,
            self.notifier,
            self.config,
            registry,
        )
    }
}
