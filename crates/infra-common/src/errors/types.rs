use thiserror::Error;

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by configuration, logging and timer facilities
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A TOML document could not be decoded
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O failure while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// A timer was started with a zero or negative period
    #[error("Invalid refresh period: {0:?}")]
    InvalidPeriod(std::time::Duration),

    /// A timer was started outside of a tokio runtime
    #[error("No async runtime available to schedule {0}")]
    NoRuntime(String),

    /// Internal error with context
    #[error("Internal error: {0}")]
    Internal(String),
}
