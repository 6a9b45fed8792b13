//! MSRP (RFC 4975) for the RCS protocol core.
//!
//! - [`chunk`]: SEND/REPORT/response framing and the [`ChunkDecoder`] that
//!   reads chunks off a byte stream
//! - [`fifo`]: [`FifoBuffer`], the blocking queue between the session and the
//!   socket writer
//! - [`session`]: [`MsrpSession`], chunked transfers with progress, abort and
//!   report handling
//! - [`connection`]: [`MsrpConnection`], the TCP socket with its sender and
//!   receiver threads
//!
//! MSRP runs on plain threads: a transfer blocks its caller while chunks are
//! queued and, when reports are requested, answered by the peer.

pub mod byte_range;
pub mod chunk;
pub mod connection;
pub mod constants;
pub mod data_chunks;
pub mod error;
pub mod fifo;
pub mod listener;
pub mod session;

pub use byte_range::ByteRange;
pub use chunk::{ChunkDecoder, ContinuationFlag, MsrpChunk, MsrpHeaders, MsrpRequest, MsrpResponse};
pub use connection::MsrpConnection;
pub use data_chunks::DataChunks;
pub use error::{Error, Result};
pub use fifo::FifoBuffer;
pub use listener::MsrpEventListener;
pub use session::MsrpSession;
