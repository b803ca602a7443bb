//! jobwatch service binary.
//!
//! Polls job-board searches on a fixed interval and sends one Telegram alert
//! per newly observed posting.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use jobwatch_api::logging::{init_logging, LogConfig};
use jobwatch_api::{router, AppConfig, AppState};
use jobwatch_core::{SearchRepository, SeenStore};
use jobwatch_monitor::{MonitorBuilder, SearchRegistry};
use jobwatch_sources::{PracujFetcher, TelegramNotifier};
use jobwatch_store::{is_memory_url, MemorySearchRepository, MemorySeenStore, RedisStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_config = LogConfig::from_env();
    let _log_guard = init_logging(&log_config)?;
    info!(
        log_format = ?log_config.format,
        log_file = ?log_config.file,
        "Logging initialized"
    );

    if let Err(e) = run().await {
        error!(error = %format!("{e:#}"), "jobwatch failed");
        return Err(e);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    info!(
        interval_secs = config.monitor.interval_secs,
        max_concurrent = config.monitor.max_concurrent_searches,
        default_searches = config.default_searches.len(),
        api_enabled = config.api_enabled,
        "Configuration loaded"
    );

    // Seen-set store and registry mirror
    let (store, repository): (Arc<dyn SeenStore>, Arc<dyn SearchRepository>) =
        if is_memory_url(&config.redis_url) {
            warn!("Using in-memory store, seen postings will not survive a restart");
            (
                Arc::new(MemorySeenStore::new()),
                Arc::new(MemorySearchRepository::new()),
            )
        } else {
            let redis = RedisStore::connect(&config.redis_url)
                .await
                .context("Failed to connect to the seen-set store")?;
            (Arc::new(redis.clone()), Arc::new(redis))
        };
    store
        .ping()
        .await
        .context("Seen-set store health check failed")?;

    let registry = SearchRegistry::with_repository(repository);
    let searches = registry
        .hydrate(&config.default_searches)
        .await
        .context("Failed to load persisted searches")?;
    if searches == 0 {
        warn!("No searches registered, add one through the management API");
    }

    let fetcher = PracujFetcher::new()?;
    let notifier = TelegramNotifier::new(config.telegram.clone())?;

    let monitor = MonitorBuilder::new(Arc::new(fetcher), store.clone(), Arc::new(notifier))
        .with_config(config.monitor.clone())
        .with_registry(registry.clone())
        .build()
        .await;
    let handle = monitor.start();

    let server = if config.api_enabled {
        let app = router(AppState::new(registry, store));
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind management API on {addr}"))?;
        info!("Starting management API on {}", addr);
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "Management API stopped");
            }
        }))
    } else {
        info!("Management API disabled");
        None
    };

    shutdown_signal().await;
    info!("Shutting down");

    handle.shutdown().await?;
    handle.wait().await?;
    if let Some(server) = server {
        server.abort();
    }

    info!("jobwatch stopped");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
