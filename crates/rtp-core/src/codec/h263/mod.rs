//! H.263 video over RTP (RFC 4629).
//!
//! Only the basic 2-byte payload header is produced. Picture start codes at
//! the beginning of a frame are compressed into the P bit as RFC 4629
//! Section 5.1 describes.

mod depacketizer;
mod header;
mod packetizer;

pub use depacketizer::H263Depacketizer;
pub use header::H263RtpHeader;
pub use packetizer::H263Packetizer;
