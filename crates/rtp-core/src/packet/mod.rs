//! Packet primitives shared by RTP and RTCP.

pub mod base;
pub mod buffer;
pub mod rtcp;
pub mod rtp;

pub use base::Packet;
pub use buffer::Buffer;
pub use rtp::RtpPacket;
