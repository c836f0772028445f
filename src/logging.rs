//! SK-030: Logging setup.
//!
//! The filter comes from `SKEIN_LOG`, then `RUST_LOG`, then the `log` key of
//! skein.yaml, then `skein=info`. Output goes to stderr so broadcasts on
//! stdout stay clean.

use crate::core::parser::{EngineConfig, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "skein=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::resolve(|key| std::env::var(key).ok(), config)
    }

    fn resolve(env: impl Fn(&str) -> Option<String>, config: &EngineConfig) -> Self {
        let filter = env("SKEIN_LOG")
            .or_else(|| env("RUST_LOG"))
            .filter(|f| !f.trim().is_empty())
            .or_else(|| config.log.clone())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        Self {
            filter,
            format: config.log_format,
        }
    }

    /// Raise the filter to debug for `--verbose`.
    pub fn verbose(mut self) -> Self {
        self.filter = "skein=debug".to_string();
        self
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(config: &LogConfig) {
    let filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let result = match config.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr)),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr)),
        ),
    };
    if result.is_err() {
        tracing::debug!("logging already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_sk030_filter_precedence() {
        let config = EngineConfig {
            log: Some("skein=trace".into()),
            ..EngineConfig::default()
        };
        let both = [("SKEIN_LOG", "skein=warn"), ("RUST_LOG", "debug")];
        assert_eq!(LogConfig::resolve(env(&both), &config).filter, "skein=warn");
        let rust = [("RUST_LOG", "debug")];
        assert_eq!(LogConfig::resolve(env(&rust), &config).filter, "debug");
        assert_eq!(LogConfig::resolve(env(&[]), &config).filter, "skein=trace");
        assert_eq!(
            LogConfig::resolve(env(&[]), &EngineConfig::default()).filter,
            DEFAULT_FILTER
        );
    }

    #[test]
    fn test_sk030_format_from_config() {
        let config = EngineConfig {
            log_format: LogFormat::Compact,
            ..EngineConfig::default()
        };
        let resolved = LogConfig::resolve(env(&[]), &config);
        assert_eq!(resolved.format, LogFormat::Compact);
        assert_eq!(resolved.verbose().filter, "skein=debug");
    }

    #[test]
    fn test_sk030_init_twice_is_harmless() {
        init(&LogConfig::default());
        init(&LogConfig {
            filter: "not a [valid filter".into(),
            format: LogFormat::Compact,
        });
    }
}
