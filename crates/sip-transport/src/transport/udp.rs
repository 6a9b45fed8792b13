use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace};

use crate::error::{Error, Result};
use crate::transport::{DatagramTransport, TransportEvent};

// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

// Largest UDP payload
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// UDP transport for SIP datagrams
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    socket: UdpSocket,
    closed: AtomicBool,
    shutdown: Notify,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl UdpTransport {
    /// Bind to `addr` and start the receive loop. Received datagrams are
    /// delivered on the returned channel.
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let socket = UdpSocket::bind(addr).await?;
        info!("SIP UDP transport bound to {}", socket.local_addr()?);

        let transport = UdpTransport {
            inner: Arc::new(UdpTransportInner {
                socket,
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
                events_tx,
            }),
        };

        transport.spawn_receive_loop();

        Ok((transport, events_rx))
    }

    fn spawn_receive_loop(&self) {
        let transport = self.clone();

        tokio::spawn(async move {
            let inner = &transport.inner;
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

            while !inner.closed.load(Ordering::Acquire) {
                let received = tokio::select! {
                    result = inner.socket.recv_from(&mut buf) => result,
                    _ = inner.shutdown.notified() => break,
                };

                match received {
                    Ok((len, source)) => {
                        trace!("Received {} byte datagram from {}", len, source);
                        let event = TransportEvent::DatagramReceived {
                            data: Bytes::copy_from_slice(&buf[..len]),
                            source,
                        };
                        if inner.events_tx.send(event).await.is_err() {
                            debug!("Transport event receiver dropped, stopping receive loop");
                            break;
                        }
                    }
                    Err(e) => {
                        if inner.closed.load(Ordering::Acquire) {
                            break;
                        }
                        error!("Error receiving UDP packet: {}", e);
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Error receiving packet: {}", e),
                            })
                            .await;
                    }
                }
            }

            let _ = inner.events_tx.send(TransportEvent::Closed).await;
            info!("UDP receive loop terminated");
        });
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send_to(&self, data: &[u8], destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        trace!("Sending {} byte datagram to {}", data.len(), destination);
        self.inner.socket.send_to(data, destination).await?;
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.socket.local_addr()?)
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.shutdown.notify_one();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.socket.local_addr() {
            Ok(addr) => write!(f, "UdpTransport({})", addr),
            Err(_) => write!(f, "UdpTransport(<unbound>)"),
        }
    }
}
