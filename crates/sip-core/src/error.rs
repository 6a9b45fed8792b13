use thiserror::Error;

/// A type alias for handling `Result`s with `Error` values
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling SIP or SDP data.
///
/// Every parse error is scoped to the single call that produced it; nothing
/// is left behind in shared state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A SIP message could not be parsed
    #[error("SIP parse error: {0}")]
    ParseError(String),

    /// SIP message lacks one of the headers every message must carry
    #[error("Missing mandatory header: {0}")]
    MissingHeader(&'static str),

    /// Header value present but malformed
    #[error("Invalid {name} header: {value}")]
    InvalidHeader { name: String, value: String },

    /// Invalid SIP method
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// Status code outside 100..=699
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// SDP body could not be parsed
    #[error("SDP parse error: {0}")]
    SdpParse(String),

    /// Address could not be interpreted as a SIP/tel URI
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// SIM identity values unusable for GIBA derivation
    #[error("Invalid SIM identity: {0}")]
    InvalidIdentity(String),

    /// Non-UTF8 content where text was required
    #[error("Invalid UTF-8 in message")]
    Utf8,
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::Utf8
    }
}
