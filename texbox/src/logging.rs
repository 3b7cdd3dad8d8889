//! Logging setup for the command line
//!
//! Everything goes to stderr; stdout is reserved for rendered markup. Engine
//! console lines are logged under the `texbox::console` target and are only
//! shown when asked for.

use clap::ValueEnum;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,

    /// One line per event, no timestamps
    Compact,

    /// JSON lines
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level filter; `None` defers to `RUST_LOG`, then "warn"
    pub level: Option<tracing::Level>,

    pub format: LogFormat,

    /// Show engine console output
    pub show_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: LogFormat::Compact,
            show_console: false,
        }
    }
}

impl LogConfig {
    /// Level from a `-v` count: 0 = default, 1 = info, 2 = debug, 3+ = trace
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.level = match verbose {
            0 => None,
            1 => Some(tracing::Level::INFO),
            2 => Some(tracing::Level::DEBUG),
            _ => Some(tracing::Level::TRACE),
        };
        self
    }

    fn filter(&self) -> EnvFilter {
        let filter = match self.level {
            Some(level) => EnvFilter::new(level.to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        };

        let console = if self.show_console {
            "texbox::console=info"
        } else {
            "texbox::console=off"
        };
        match console.parse::<Directive>() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    }
}

/// Install the global subscriber
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = config.filter();
    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .without_time()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.level.is_none());
        assert!(!config.show_console);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LogConfig::default().with_verbosity(0).level, None);
        assert_eq!(
            LogConfig::default().with_verbosity(2).level,
            Some(tracing::Level::DEBUG)
        );
        assert_eq!(
            LogConfig::default().with_verbosity(9).level,
            Some(tracing::Level::TRACE)
        );
    }
}
