//! # jobwatch-api
//!
//! Service wiring for the jobwatch binary: startup configuration, logging
//! setup, and the management HTTP API over the running monitor's search
//! registry.

pub mod config;
pub mod logging;
pub mod routes;

pub use config::{parse_search_list, AppConfig};
pub use routes::{router, ApiError, AppState, CreateSearchRequest, SearchView};
