//! MSRP over TCP.
//!
//! Each connection runs two threads: a [`ChunkSender`] draining the outgoing
//! [`FifoBuffer`] to the socket and a [`ChunkReceiver`] decoding chunks into
//! the session.

use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use crate::chunk::{ChunkDecoder, MsrpChunk, MsrpRequest};
use crate::error::{Error, Result};
use crate::fifo::FifoBuffer;
use crate::session::MsrpSession;

// Upper bound on how long the sender sleeps without checking for close
const SENDER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A TCP connection carrying one MSRP session
#[derive(Debug)]
pub struct MsrpConnection {
    stream: TcpStream,
    outgoing: Arc<FifoBuffer<Bytes>>,
    closed: Arc<AtomicBool>,
    trace_enabled: bool,
}

impl MsrpConnection {
    /// Connect to the peer's MSRP endpoint (active side)
    pub fn connect(addr: SocketAddr, session: Arc<MsrpSession>) -> Result<Arc<Self>> {
        info!("Open MSRP connection to {}", addr);
        let stream = TcpStream::connect(addr)?;
        Self::open(stream, session)
    }

    /// Wait for the peer on `listener` (passive side)
    pub fn accept(listener: &TcpListener, session: Arc<MsrpSession>) -> Result<Arc<Self>> {
        let (stream, peer) = listener.accept()?;
        info!("MSRP connection accepted from {}", peer);
        Self::open(stream, session)
    }

    /// Start both threads on an established stream and attach it to `session`
    pub fn open(stream: TcpStream, session: Arc<MsrpSession>) -> Result<Arc<Self>> {
        stream.set_nodelay(true)?;
        let outgoing = Arc::new(FifoBuffer::new());
        let closed = Arc::new(AtomicBool::new(false));
        let trace_enabled = session.config().trace_enabled;

        let sender = ChunkSender {
            stream: stream.try_clone()?,
            outgoing: outgoing.clone(),
            closed: closed.clone(),
        };
        let receiver = ChunkReceiver {
            session: Arc::downgrade(&session),
            closed: closed.clone(),
            trace_enabled,
        };
        let receiver_stream = stream.try_clone()?;

        let connection = Arc::new(Self {
            stream,
            outgoing,
            closed,
            trace_enabled,
        });
        session.set_connection(connection.clone());

        thread::Builder::new()
            .name("msrp-sender".into())
            .spawn(move || sender.run())?;
        thread::Builder::new()
            .name("msrp-receiver".into())
            .spawn(move || receiver.run(receiver_stream))?;

        Ok(connection)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue an encoded chunk for the sender thread
    pub fn send_chunk(&self, chunk: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if self.trace_enabled {
            debug!(">>> Send MSRP chunk:\n{}", String::from_utf8_lossy(&chunk));
        }
        self.outgoing.put_message(chunk);
        Ok(())
    }

    /// Stop both threads and shut the socket down
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.outgoing.unblock_read();
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            trace!("MSRP socket shutdown: {}", e);
        }
        info!("MSRP connection closed");
    }
}

impl Drop for MsrpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Writes queued chunks to the socket
struct ChunkSender {
    stream: TcpStream,
    outgoing: Arc<FifoBuffer<Bytes>>,
    closed: Arc<AtomicBool>,
}

impl ChunkSender {
    fn run(mut self) {
        debug!("MSRP sender started");
        while !self.closed.load(Ordering::Acquire) {
            let chunk = match self.outgoing.get_message_timeout(SENDER_POLL_INTERVAL) {
                Some(chunk) => chunk,
                None => continue,
            };
            if let Err(e) = self.stream.write_all(&chunk) {
                if !self.closed.load(Ordering::Acquire) {
                    error!("Can't write the MSRP chunk: {}", e);
                }
                break;
            }
            trace!("{} bytes written to the MSRP socket", chunk.len());
        }
        debug!("MSRP sender terminated");
    }
}

/// Decodes chunks off the socket and dispatches them to the session
///
/// Holds the session weakly: once its owner lets go, the session drops the
/// connection, which shuts the socket and ends this thread.
struct ChunkReceiver {
    session: Weak<MsrpSession>,
    closed: Arc<AtomicBool>,
    trace_enabled: bool,
}

impl ChunkReceiver {
    fn run(self, stream: TcpStream) {
        debug!("MSRP receiver started");
        let mut decoder = ChunkDecoder::new(BufReader::new(stream));
        loop {
            let result = decoder.read_chunk();
            let Some(session) = self.session.upgrade() else {
                debug!("MSRP session released");
                break;
            };
            match result {
                Ok(Some(chunk)) => {
                    if self.trace_enabled {
                        debug!("<<< Receive MSRP chunk:\n{}", String::from_utf8_lossy(&chunk.encode()));
                    }
                    dispatch(&session, chunk);
                }
                Ok(None) => {
                    debug!("MSRP stream ended");
                    break;
                }
                Err(e) => {
                    if self.closed.load(Ordering::Acquire) {
                        debug!("MSRP receiver stopped by close");
                    } else {
                        error!("MSRP receiver has failed: {}", e);
                        if let Some(listener) = session.msrp_event_listener() {
                            listener.msrp_transfer_error(&format!("Chunk receiver has failed: {}", e));
                        }
                    }
                    break;
                }
            }
        }
        debug!("MSRP receiver terminated");
    }
}

fn dispatch(session: &MsrpSession, chunk: MsrpChunk) {
    let result = match chunk {
        MsrpChunk::Request(request) if request.is_send() => receive_send(session, request),
        MsrpChunk::Request(request) if request.is_report() => {
            session.receive_msrp_report(&request.transaction_id, &request.headers)
        }
        MsrpChunk::Request(request) => {
            debug!("Unknown MSRP request {} ignored", request.method);
            Ok(())
        }
        MsrpChunk::Response(response) => {
            session.receive_msrp_response(response.code, &response.transaction_id, &response.headers);
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!("MSRP chunk handling failed: {}", e);
    }
}

fn receive_send(session: &MsrpSession, request: MsrpRequest) -> Result<()> {
    let total = match request.headers.byte_range() {
        Some(range) => range?.total,
        None => None,
    };
    session.receive_msrp_send(
        &request.transaction_id,
        &request.headers,
        request.flag,
        request.data,
        total,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcs_infra_common::config::MsrpSection;
    use std::io::Read;

    #[test]
    fn test_dropping_the_session_closes_the_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let session = Arc::new(MsrpSession::new(MsrpSection::default()));
        let connection = MsrpConnection::connect(listener.local_addr().unwrap(), session.clone()).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let released = Arc::downgrade(&session);
        drop(connection);
        drop(session);
        assert!(released.upgrade().is_none());

        let mut buf = [0u8; 16];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_closed_connection_refuses_chunks() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let session = Arc::new(MsrpSession::new(MsrpSection::default()));
        let connection = MsrpConnection::connect(listener.local_addr().unwrap(), session.clone()).unwrap();
        let _peer = listener.accept().unwrap();

        connection.close();
        assert!(connection.is_closed());
        assert!(matches!(connection.send_chunk(Bytes::from_static(b"x")), Err(Error::ConnectionClosed)));
        session.close();
    }
}
