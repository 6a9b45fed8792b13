//! SIP over UDP for the RCS protocol core.
//!
//! UDP gives no delivery guarantee, so this crate owns the reliability layer
//! RFC 3261 Section 17 puts on top of it:
//!
//! - [`retransmission`]: per-transaction contexts keyed by
//!   `callId_method_cseq`, T1 retransmission with exponential backoff and
//!   the transaction timeout that reports failure upward
//! - [`keepalive`]: RFC 5626 double-CRLF keep-alive towards the outbound proxy
//! - [`manager`]: [`SipUdpManager`], tying the transport, the retransmission
//!   layer and the upward event channel together
//! - [`transport`]: the [`DatagramTransport`] seam and its tokio UDP
//!   implementation

pub mod error;
pub mod events;
pub mod keepalive;
pub mod manager;
pub mod retransmission;
pub mod transport;

pub use error::{Error, Result};
pub use events::SipEvent;
pub use keepalive::KeepAliveManager;
pub use manager::SipUdpManager;
pub use retransmission::{ContextKey, ContextState, RetransmissionManager, RetransmissionSettings};
pub use transport::{DatagramTransport, TransportEvent, UdpTransport};

/// Bind a UDP transport to the specified address
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        bind_udp, ContextKey, ContextState, DatagramTransport, Error, KeepAliveManager, Result,
        RetransmissionManager, RetransmissionSettings, SipEvent, SipUdpManager, TransportEvent,
        UdpTransport,
    };
}
