//! UDP retransmission layer (RFC 3261 Section 17.1.1.2 and 17.1.2.2).
//!
//! Each request/response exchange is tracked by a [`RetransmissionContext`]
//! identified by a [`ContextKey`] (`callId_method_cseq`).
//!
//! Outgoing requests:
//!
//! ```text
//!  send ──► Pending ──T1──► Retransmitting ──T1·2ⁿ──► …
//!              │                  │
//!              └──── final ───────┴──► Answered ──timeout──► removed
//!              └──────────── timeout ──────────► Expired ──► TransactionTimeout
//! ```
//!
//! INVITE retransmissions double without limit; other methods double up to
//! T2. A provisional response stops INVITE retransmissions and moves
//! non-INVITE ones straight to the T2 interval. The context stays in the
//! table until the transaction timeout so duplicate final responses can be
//! absorbed.
//!
//! Incoming requests get a context too. A retransmitted request is answered
//! from the stored response and never reaches the session layer.

mod context;
mod key;
mod manager;

pub use context::{ContextDirection, ContextState, RetransmissionContext};
pub use key::ContextKey;
pub use manager::{Disposition, RetransmissionManager, RetransmissionSettings};
