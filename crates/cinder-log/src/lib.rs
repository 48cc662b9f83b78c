//! Structured logging for the cinder server.
//!
//! Console output carries the uptime, target and level of each event. When
//! file logging is enabled the same events are also written as JSON lines to
//! `cinder.log` in the configured directory. `RUST_LOG` takes precedence over
//! the configured level.

use std::path::{Path, PathBuf};

use cinder_config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File name of the JSON log inside the log directory.
pub const LOG_FILE: &str = "cinder.log";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global tracing subscriber.
///
/// Returns the path of the JSON log file when one was opened. A log
/// directory that cannot be created only disables file output.
///
/// ```no_run
/// use cinder_config::LoggingConfig;
///
/// let path = cinder_log::init_logging(&LoggingConfig::default());
/// assert!(path.is_none());
/// ```
pub fn init_logging(config: &LoggingConfig) -> Option<PathBuf> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if config.file_logging
        && let Some((path, log_file)) = open_log_file(&config.log_dir)
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        tracing::info!("writing JSON logs to {}", path.display());
        return Some(path);
    }

    subscriber.init();
    None
}

/// Filter directive for the configured level, falling back to `info`.
pub fn filter_directive(config: &LoggingConfig) -> String {
    let level = config.level.trim();
    if level.is_empty() {
        DEFAULT_DIRECTIVE.to_string()
    } else {
        level.to_string()
    }
}

fn open_log_file(log_dir: &Path) -> Option<(PathBuf, std::fs::File)> {
    std::fs::create_dir_all(log_dir).ok()?;
    let path = log_dir.join(LOG_FILE);
    let file = std::fs::File::create(&path).ok()?;
    Some((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_directive() {
        let config = LoggingConfig::default();
        assert_eq!(filter_directive(&config), "info");
    }

    #[test]
    fn test_blank_level_falls_back() {
        let config = LoggingConfig {
            level: "  ".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directive(&config), DEFAULT_DIRECTIVE);
    }

    #[test]
    fn test_subsystem_filter_parses() {
        let config = LoggingConfig {
            level: "info,cinder_entity=debug".to_string(),
            ..LoggingConfig::default()
        };
        let filter = EnvFilter::try_new(filter_directive(&config)).unwrap();
        assert!(filter.to_string().contains("cinder_entity=debug"));
    }

    #[test]
    fn test_log_file_created_in_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let (path, mut file) = open_log_file(&nested).unwrap();
        assert_eq!(path, nested.join(LOG_FILE));
        writeln!(file, "{}", serde_json::json!({"level": "INFO"})).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_log_dir_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        assert!(open_log_file(&blocker.join("logs")).is_none());
    }
}
