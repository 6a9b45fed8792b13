//! UDP transport for RTP and RTCP.
//!
//! RTCP runs on the RTP port plus one. With symmetric RTP the transmitters
//! send from the socket the receivers listen on, so the peer's NAT sees a
//! single flow per port.

mod rtcp;
mod rtp;

pub use rtcp::{RtcpPacketReceiver, RtcpPacketTransmitter};
pub use rtp::{RtpPacketReceiver, RtpPacketTransmitter};

use std::net::SocketAddr;

/// The RTCP address paired with an RTP address
pub fn rtcp_address(rtp: SocketAddr) -> SocketAddr {
    SocketAddr::new(rtp.ip(), rtp.port().wrapping_add(1))
}
