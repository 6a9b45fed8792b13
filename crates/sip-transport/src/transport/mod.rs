//! Datagram transport seam.

pub mod udp;

pub use udp::UdpTransport;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Raw transport events, before SIP processing
#[derive(Debug, Clone)]
pub enum TransportEvent {
    DatagramReceived { data: Bytes, source: SocketAddr },
    Error { error: String },
    Closed,
}

/// Anything that can send a datagram to an address.
///
/// The retransmission and keep-alive machinery only ever sends, so tests can
/// substitute a recording implementation.
#[async_trait]
pub trait DatagramTransport: Send + Sync + fmt::Debug {
    async fn send_to(&self, data: &[u8], destination: SocketAddr) -> Result<()>;

    fn local_addr(&self) -> Result<SocketAddr>;

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
