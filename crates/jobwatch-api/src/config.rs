//! Service configuration, read once at startup.

use jobwatch_core::defaults::{DEFAULT_SEARCHES, REDIS_URL, SERVER_PORT};
use jobwatch_core::{Error, Result, SearchDefinition};
use jobwatch_monitor::MonitorConfig;
use jobwatch_sources::TelegramConfig;

/// Everything the service needs to start.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `DEFAULT_SEARCHES` | see [`DEFAULT_SEARCHES`] | `;`-separated `query[@location]` list |
/// | `REDIS_URL` | `redis://localhost:6379` | Store target, `memory://` for non-durable |
/// | `API_ENABLED` | `true` | Serve the management API |
/// | `HOST` | `0.0.0.0` | Management API bind host |
/// | `PORT` | `8080` | Management API bind port |
///
/// Monitor and Telegram variables are documented on [`MonitorConfig`] and
/// [`TelegramConfig`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub telegram: TelegramConfig,
    pub redis_url: String,
    /// Searches registered when none are persisted.
    pub default_searches: Vec<SearchDefinition>,
    pub api_enabled: bool,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let monitor = MonitorConfig::from_lookup(&lookup)?;
        let telegram = TelegramConfig::from_lookup(&lookup)?;

        let redis_url = lookup("REDIS_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| REDIS_URL.to_string());

        // An explicitly empty value means "no default searches".
        let default_searches = match lookup("DEFAULT_SEARCHES") {
            Some(raw) => parse_search_list(&raw)?,
            None => parse_search_list(DEFAULT_SEARCHES)?,
        };

        let api_enabled = lookup("API_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let host = lookup("HOST")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got '{raw}'")))?,
            None => SERVER_PORT,
        };

        Ok(Self {
            monitor,
            telegram,
            redis_url,
            default_searches,
            api_enabled,
            host,
            port,
        })
    }
}

/// Parse a `;`-separated list of `query[@location]` entries.
///
/// Blank entries are ignored; an entry with an invalid query is an error.
pub fn parse_search_list(raw: &str) -> Result<Vec<SearchDefinition>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (query, location) = match entry.split_once('@') {
                Some((query, location)) => (query, Some(location)),
                None => (entry, None),
            };
            SearchDefinition::new(query, location).map_err(|e| {
                Error::Config(format!("DEFAULT_SEARCHES entry '{entry}' is invalid: {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut all: HashMap<String, String> = [
            ("TELEGRAM_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-1001"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in vars {
            all.insert(k.to_string(), v.to_string());
        }
        move |key| all.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.redis_url, REDIS_URL);
        assert_eq!(config.port, SERVER_PORT);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.api_enabled);
        assert_eq!(config.monitor, MonitorConfig::default());

        let keys: Vec<_> = config
            .default_searches
            .iter()
            .map(|s| s.key().to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "devops engineer:wroclaw",
                "cloud engineer:warszawa",
                "devops engineer"
            ]
        );
    }

    #[test]
    fn test_missing_telegram_credentials_are_fatal() {
        let err = AppConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("REDIS_URL", "memory://"),
            ("DEFAULT_SEARCHES", "Rust Developer@Gdańsk; ;Go Developer"),
            ("API_ENABLED", "false"),
            ("PORT", "9090"),
            ("CHECK_INTERVAL_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(config.redis_url, "memory://");
        assert_eq!(config.default_searches.len(), 2);
        assert_eq!(config.default_searches[0].location.as_deref(), Some("Gdańsk"));
        assert_eq!(config.default_searches[1].location, None);
        assert!(!config.api_enabled);
        assert_eq!(config.port, 9090);
        assert_eq!(config.monitor.interval_secs, 60);
    }

    #[test]
    fn test_empty_default_searches_is_valid() {
        let config = AppConfig::from_lookup(lookup(&[("DEFAULT_SEARCHES", "")])).unwrap();
        assert!(config.default_searches.is_empty());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = AppConfig::from_lookup(lookup(&[("DEFAULT_SEARCHES", "@Warszawa")])).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_SEARCHES"));

        let err = AppConfig::from_lookup(lookup(&[("CHECK_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
