use std::net::SocketAddr;

use rcs_sip_core::{Method, SipMessage};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::key::ContextKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Sent once, T1 running
    Pending,
    /// At least one retransmission went out
    Retransmitting,
    /// Final response bound, T1 cancelled
    Answered,
    /// Transaction timeout fired without a final response
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextDirection {
    /// We sent the request
    Outgoing,
    /// We received the request
    Incoming,
}

/// State of one request/response exchange
#[derive(Debug)]
pub struct RetransmissionContext {
    pub key: ContextKey,
    pub direction: ContextDirection,
    pub method: Method,
    /// Peer the exchange runs with
    pub remote: SocketAddr,
    /// Request we sent, or the latest response we sent
    pub outgoing_message: Option<SipMessage>,
    /// Latest response received, or the request received
    pub incoming_message: Option<SipMessage>,
    pub state: ContextState,
    pub created_at: Instant,
    pub retransmissions: u32,
    pub provisional_received: bool,
    pub(crate) t1_task: Option<JoinHandle<()>>,
    pub(crate) timeout_task: Option<JoinHandle<()>>,
}

impl RetransmissionContext {
    pub(crate) fn outgoing(key: ContextKey, request: SipMessage, remote: SocketAddr) -> Self {
        let method = request.method().unwrap_or(Method::Extension(String::new()));
        Self {
            key,
            direction: ContextDirection::Outgoing,
            method,
            remote,
            outgoing_message: Some(request),
            incoming_message: None,
            state: ContextState::Pending,
            created_at: Instant::now(),
            retransmissions: 0,
            provisional_received: false,
            t1_task: None,
            timeout_task: None,
        }
    }

    pub(crate) fn incoming(key: ContextKey, request: SipMessage, remote: SocketAddr) -> Self {
        let method = request.method().unwrap_or(Method::Extension(String::new()));
        Self {
            key,
            direction: ContextDirection::Incoming,
            method,
            remote,
            outgoing_message: None,
            incoming_message: Some(request),
            state: ContextState::Pending,
            created_at: Instant::now(),
            retransmissions: 0,
            provisional_received: false,
            t1_task: None,
            timeout_task: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.state == ContextState::Answered
    }

    pub(crate) fn cancel_t1(&mut self) {
        if let Some(task) = self.t1_task.take() {
            task.abort();
        }
    }

    /// Abort both timers. Aborting a finished task is a no-op.
    pub(crate) fn cancel_timers(&mut self) {
        self.cancel_t1();
        if let Some(task) = self.timeout_task.take() {
            task.abort();
        }
    }
}
