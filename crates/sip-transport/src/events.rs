//! Events delivered from the SIP UDP layer to the session layer.

use std::net::SocketAddr;

use rcs_sip_core::SipMessage;

#[derive(Debug, Clone)]
pub enum SipEvent {
    /// A new request, or a response bound to (or outside of) a transaction.
    /// Retransmitted requests and duplicate final responses never show up
    /// here.
    MessageReceived {
        message: SipMessage,
        source: SocketAddr,
    },
    /// An outgoing request got no final response before the transaction
    /// timeout. Terminal for that transaction: nothing is retried.
    TransactionTimeout {
        context_id: String,
        request: SipMessage,
    },
    /// A datagram could not be processed
    TransportError { error: String },
    /// The transport is closed; no further events follow
    Closed,
}
