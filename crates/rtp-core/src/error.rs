use thiserror::Error;

/// A type alias for handling `Result`s with `Error` values
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while framing or transporting media
#[derive(Error, Debug)]
pub enum Error {
    /// Not enough bytes to decode the structure
    #[error("Buffer too small: need {required} bytes but only {available} available")]
    BufferTooSmall { required: usize, available: usize },

    /// The datagram is not a well formed RTP or RTCP packet
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// A payload header could not be decoded
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// RTP/RTCP version other than 2
    #[error("Unsupported RTP version: {0}")]
    UnsupportedVersion(u8),

    /// A codec failed to process a buffer
    #[error("Codec error: {0}")]
    Codec(String),

    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transmitter or receiver has been closed
    #[error("Transport closed")]
    TransportClosed,
}
