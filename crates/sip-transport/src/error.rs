use thiserror::Error;

/// A type alias for handling `Result`s with `Error` values
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the SIP UDP layer
#[derive(Error, Debug)]
pub enum Error {
    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed
    #[error("Transport closed")]
    TransportClosed,

    /// The datagram was not a usable SIP message
    #[error("SIP error: {0}")]
    Sip(#[from] rcs_sip_core::Error),

    /// No outbound proxy configured for a send that needs one
    #[error("No outbound proxy configured")]
    NoOutboundProxy,

    /// Timer facility failure
    #[error("Timer error: {0}")]
    Timer(#[from] rcs_infra_common::Error),

    /// The upward event channel is gone
    #[error("Event channel closed")]
    ChannelClosed,
}
