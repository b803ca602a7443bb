//! Tracing subscriber setup for the service binary.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LOG_FORMAT` | `text` | `json` for one JSON object per event, anything else for text |
//! | `LOG_FILE` | none | Log to a daily-rotated file instead of stdout |
//! | `LOG_ANSI` | auto | Force ANSI colors on or off (`true`/`1`) |
//! | `RUST_LOG` | [`DEFAULT_LOG_FILTER`] | Standard env filter directives |

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "jobwatch=info,jobwatch_api=info,jobwatch_monitor=info,\
jobwatch_sources=info,jobwatch_store=info,tower_http=info";

const DEFAULT_LOG_FILE_NAME: &str = "jobwatch.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Where and how the service writes its logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    /// `None` keeps the destination's default (colors on stdout, plain in files).
    pub ansi: Option<bool>,
    pub filter: String,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            format,
            file: lookup("LOG_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            ansi: lookup("LOG_ANSI").map(|v| v == "true" || v == "1"),
            filter: lookup("RUST_LOG")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    /// Directory and file name prefix for the rolling appender.
    fn rolling_target(&self) -> Option<(PathBuf, String)> {
        let path = self.file.as_deref()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(DEFAULT_LOG_FILE_NAME);
        Some((dir.to_path_buf(), name.to_string()))
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process logs.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let (writer, guard, default_ansi) = match config.rolling_target() {
        Some((dir, name)) => {
            let appender = tracing_appender::rolling::daily(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), None, true),
    };

    let env_filter = EnvFilter::try_new(&config.filter)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .try_init()?,
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(config.ansi.unwrap_or(default_ansi))
                    .with_writer(writer),
            )
            .try_init()?,
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults() {
        let config = LogConfig::from_lookup(lookup(&[]));
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.file, None);
        assert_eq!(config.ansi, None);
        assert_eq!(config.filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.rolling_target(), None);
    }

    #[test]
    fn test_overrides() {
        let config = LogConfig::from_lookup(lookup(&[
            ("LOG_FORMAT", "JSON"),
            ("LOG_FILE", "/var/log/jobwatch/service.log"),
            ("LOG_ANSI", "0"),
            ("RUST_LOG", "jobwatch_monitor=debug"),
        ]));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.ansi, Some(false));
        assert_eq!(config.filter, "jobwatch_monitor=debug");
        assert_eq!(
            config.rolling_target(),
            Some((PathBuf::from("/var/log/jobwatch"), "service.log".to_string()))
        );
    }

    #[test]
    fn test_bare_file_name_logs_to_current_dir() {
        let config = LogConfig::from_lookup(lookup(&[("LOG_FILE", "jobwatch.log")]));
        assert_eq!(
            config.rolling_target(),
            Some((PathBuf::from("."), "jobwatch.log".to_string()))
        );
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
