use crate::config::LoggingSection;
use crate::errors::types::{Error, Result};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log spans
    pub log_spans: bool,
    /// Application name reported by [`log_welcome`]
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "rcs-core".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Build a logging configuration from the `[logging]` section of a core config
    pub fn from_section(section: &LoggingSection) -> Result<Self> {
        let mut config = LoggingConfig::new(parse_log_level(&section.level)?, section.app_name.clone());
        config.json = section.json;
        Ok(config)
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn try_setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| Error::Logging(e.to_string()))
}

/// Set up the logging system, ignoring a subscriber installed earlier
/// (tests call this from many places).
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    match try_setup_logging(config) {
        Ok(()) => Ok(()),
        Err(Error::Logging(msg)) => {
            tracing::debug!("Logging already initialised: {}", msg);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::Config(format!("Invalid log level: {}", level)))
}

/// Log a welcome message with version info
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(parse_log_level("loud"), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_section() {
        let section = LoggingSection {
            level: "trace".into(),
            json: true,
            app_name: "imsd".into(),
        };
        let config = LoggingConfig::from_section(&section).unwrap();
        assert_eq!(config.level, Level::TRACE);
        assert!(config.json);
        assert_eq!(config.app_name, "imsd");
    }

    #[test]
    fn test_setup_twice_is_harmless() {
        setup_logging(LoggingConfig::default()).unwrap();
        setup_logging(LoggingConfig::default().with_file_info()).unwrap();
    }
}
