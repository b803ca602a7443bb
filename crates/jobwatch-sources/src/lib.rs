//! # jobwatch-sources
//!
//! Concrete collaborators for the monitor engine:
//!
//! - [`PracujFetcher`]: reads listing pages from it.pracuj.pl
//! - [`TelegramNotifier`]: delivers alerts through the Telegram Bot API
//! - [`mock`]: scripted fetcher and recording notifier for tests

pub mod mock;
pub mod pracuj;
pub mod telegram;

pub use pracuj::PracujFetcher;
pub use telegram::{render_message, TelegramConfig, TelegramNotifier};
