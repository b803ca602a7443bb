//! # jobwatch-monitor
//!
//! The monitoring engine: polls every registered search on a fixed interval,
//! diffs fetched postings against the seen-set store, and notifies once per
//! new posting.
//!
//! This crate provides:
//! - A search registry that can be mutated while the monitor runs
//! - Fetch/diff/notify cycles with per-search error isolation
//! - A fixed-interval loop with bounded parallelism and graceful shutdown
//! - Progress events via a broadcast channel
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use jobwatch_monitor::{MonitorBuilder, MonitorConfig};
//!
//! let monitor = MonitorBuilder::new(fetcher, store, notifier)
//!     .with_config(MonitorConfig::default().with_interval_secs(60))
//!     .build()
//!     .await;
//! monitor.registry().add("Python Developer", Some("Warszawa")).await?;
//!
//! let handle = monitor.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! handle.wait().await?;
//! ```

pub mod cycle;
pub mod monitor;
pub mod registry;

pub use cycle::{CycleFailure, CycleReport};
pub use monitor::{Monitor, MonitorBuilder, MonitorConfig, MonitorEvent, MonitorHandle, TickReport};
pub use registry::SearchRegistry;
