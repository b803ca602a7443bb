//! Centralized default constants for jobwatch.
//!
//! All crates and the service binary reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// MONITOR
// =============================================================================

/// Default polling interval in seconds (5 minutes).
pub const CHECK_INTERVAL_SECS: u64 = 300;

/// Default maximum number of search cycles running concurrently within a tick.
pub const MONITOR_MAX_CONCURRENT: usize = 4;

/// Default pause between launching consecutive cycles within a tick.
pub const MONITOR_SEARCH_SPACING_MS: u64 = 1_000;

/// Default number of permanent delivery failures before a posting is abandoned.
///
/// Zero disables abandonment.
pub const MONITOR_MAX_PERMANENT_FAILURES: u32 = 3;

/// Default grace period for in-flight cycles after a shutdown request.
pub const MONITOR_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Default number of consecutive store failures before escalating to an alert.
pub const MONITOR_STORE_ALERT_THRESHOLD: u32 = 5;

/// Capacity of the monitor event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// STORE
// =============================================================================

/// Default Redis connection URL.
pub const REDIS_URL: &str = "redis://localhost:6379";

/// Key prefix for per-search seen-set hashes.
pub const SEEN_KEY_PREFIX: &str = "jobwatch:seen:";

/// Key of the set mirroring the search registry.
pub const SEARCHES_KEY: &str = "jobwatch:searches";

// =============================================================================
// SOURCES
// =============================================================================

/// Base URL of the pracuj.pl IT job board listing pages.
pub const PRACUJ_BASE_URL: &str = "https://it.pracuj.pl/praca";

/// Listing age filter (days) applied when a location is given.
pub const PRACUJ_RECENT_DAYS: u32 = 30;

/// Timeout for listing page requests in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// Telegram Bot API base URL.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Timeout for notification requests in seconds.
pub const NOTIFY_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// SERVER
// =============================================================================

/// Default management API port.
pub const SERVER_PORT: u16 = 8080;

/// Searches registered when neither configuration nor the store provide any.
pub const DEFAULT_SEARCHES: &str = "DevOps Engineer@Wroclaw;Cloud Engineer@Warszawa;DevOps Engineer";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_defaults_are_sane() {
        const {
            assert!(CHECK_INTERVAL_SECS > 0);
            assert!(MONITOR_MAX_CONCURRENT >= 1);
            assert!(MONITOR_SEARCH_SPACING_MS < CHECK_INTERVAL_SECS * 1000);
            assert!(MONITOR_STORE_ALERT_THRESHOLD >= 1);
        }
    }

    #[test]
    fn seen_prefix_is_namespaced() {
        assert!(SEEN_KEY_PREFIX.starts_with("jobwatch:"));
        assert!(SEEN_KEY_PREFIX.ends_with(':'));
        assert!(!SEARCHES_KEY.starts_with(SEEN_KEY_PREFIX));
    }
}
