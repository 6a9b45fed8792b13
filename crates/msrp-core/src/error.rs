use thiserror::Error;

/// A type alias for handling `Result`s with `Error` values
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the MSRP layer
#[derive(Error, Debug)]
pub enum Error {
    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bytes on the wire that are not an MSRP chunk
    #[error("Parse error: {0}")]
    Parse(String),

    /// A required session parameter has not been set
    #[error("{0} not set")]
    NotConfigured(&'static str),

    /// The connection has been closed
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }
}
