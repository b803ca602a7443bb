//! # jobwatch-core
//!
//! Core types, traits, and abstractions for the jobwatch monitor.
//!
//! This crate provides the data model (searches, postings, seen records),
//! the error taxonomy, and the collaborator traits that the store, source
//! and monitor crates implement or consume.
//!
//! ## Log Level Contract
//!
//! Every crate logs through `tracing` with structured fields (`search`,
//! `posting_id`, `tick_id`, `duration_ms`, `error`).
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Requires operator attention (permanent failures, store degraded) |
//! | WARN  | Recoverable issue, retried on the next tick |
//! | INFO  | Lifecycle events, per-cycle summaries, notifications sent |
//! | DEBUG | Per-posting decisions, configuration choices |

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{DeliveryError, Error, FetchError, Result};
pub use models::*;
pub use traits::*;

/// Create a new time-ordered UUIDv7.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
