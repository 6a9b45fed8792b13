//! SIP over UDP: receive processing and the send path.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rcs_infra_common::config::SipSection;
use rcs_sip_core::{parse_message, parser::is_keep_alive, SipMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::events::SipEvent;
use crate::retransmission::{ContextKey, Disposition, RetransmissionManager, RetransmissionSettings};
use crate::transport::{DatagramTransport, TransportEvent, UdpTransport};

const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Ties a datagram transport to the retransmission layer.
///
/// Inbound, every datagram is parsed and checked for the mandatory headers.
/// Request retransmissions are answered from the stored response and
/// duplicate final responses dropped; everything else reaches the session
/// layer as [`SipEvent::MessageReceived`]. Outbound, requests are sent to the
/// outbound proxy and then tracked for retransmission.
#[derive(Clone)]
pub struct SipUdpManager {
    transport: Arc<dyn DatagramTransport>,
    retransmission: RetransmissionManager,
    outbound_proxy: Arc<Mutex<Option<SocketAddr>>>,
    events_tx: mpsc::Sender<SipEvent>,
    receive_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SipUdpManager {
    /// Build on an existing transport. Received datagrams are fed through
    /// [`process_datagram`](Self::process_datagram).
    pub fn new(
        transport: Arc<dyn DatagramTransport>,
        settings: RetransmissionSettings,
        outbound_proxy: Option<SocketAddr>,
    ) -> (Self, mpsc::Receiver<SipEvent>) {
        let (events_tx, events_rx) = mpsc::channel(DEFAULT_EVENT_CAPACITY);
        let retransmission = RetransmissionManager::new(settings, transport.clone(), events_tx.clone());
        let manager = Self {
            transport,
            retransmission,
            outbound_proxy: Arc::new(Mutex::new(outbound_proxy)),
            events_tx,
            receive_task: Arc::new(Mutex::new(None)),
        };
        (manager, events_rx)
    }

    /// Bind a UDP socket on `local_addr` and start processing datagrams
    pub async fn bind(local_addr: SocketAddr, config: &SipSection) -> Result<(Self, mpsc::Receiver<SipEvent>)> {
        let (transport, transport_rx) = UdpTransport::bind(local_addr, None).await?;
        let (manager, events_rx) = Self::new(
            Arc::new(transport),
            RetransmissionSettings::from(config),
            config.outbound_proxy,
        );
        manager.spawn_receive_loop(transport_rx);
        info!(local = %manager.local_addr()?, "SIP UDP manager started");
        Ok((manager, events_rx))
    }

    /// Bind on all interfaces at the configured `local_port`
    pub async fn from_config(config: &SipSection) -> Result<(Self, mpsc::Receiver<SipEvent>)> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], config.local_port)), config).await
    }

    fn spawn_receive_loop(&self, mut transport_rx: mpsc::Receiver<TransportEvent>) {
        let manager = self.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                match event {
                    TransportEvent::DatagramReceived { data, source } => {
                        if let Err(e) = manager.process_datagram(&data, source).await {
                            warn!(%source, "Dropping datagram: {}", e);
                        }
                    }
                    TransportEvent::Error { error } => {
                        let _ = manager.events_tx.send(SipEvent::TransportError { error }).await;
                    }
                    TransportEvent::Closed => break,
                }
            }
            let _ = manager.events_tx.send(SipEvent::Closed).await;
            debug!("SIP UDP receive loop terminated");
        });
        *self.receive_task.lock() = Some(task);
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn retransmission(&self) -> &RetransmissionManager {
        &self.retransmission
    }

    pub fn outbound_proxy(&self) -> Option<SocketAddr> {
        *self.outbound_proxy.lock()
    }

    pub fn set_outbound_proxy(&self, proxy: SocketAddr) {
        *self.outbound_proxy.lock() = Some(proxy);
    }

    /// Handle one inbound datagram. Returns whether an event was delivered
    /// upward.
    pub async fn process_datagram(&self, data: &[u8], source: SocketAddr) -> Result<bool> {
        if is_keep_alive(data) {
            trace!(%source, "Keep-alive received");
            return Ok(false);
        }

        let message = parse_message(data)?;
        if let Some(missing) = message.missing_mandatory_header() {
            return Err(Error::Sip(rcs_sip_core::Error::MissingHeader(missing)));
        }

        let disposition = if message.is_request() {
            self.retransmission.on_request_received(&message, source).await?
        } else {
            self.retransmission.on_response_received(&message)
        };
        if disposition == Disposition::Absorbed {
            return Ok(false);
        }

        debug!(%source, sip = %message, "SIP message received");
        self.events_tx
            .send(SipEvent::MessageReceived { message, source })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        Ok(true)
    }

    /// Send to the outbound proxy
    pub async fn send_message(&self, message: &SipMessage) -> Result<Option<ContextKey>> {
        let proxy = self.outbound_proxy().ok_or(Error::NoOutboundProxy)?;
        self.send_message_to(message, proxy).await
    }

    /// Send and track: requests get an outgoing retransmission context,
    /// responses are remembered for answering request retransmissions.
    pub async fn send_message_to(&self, message: &SipMessage, destination: SocketAddr) -> Result<Option<ContextKey>> {
        debug!(%destination, sip = %message, "Sending SIP message");
        self.transport.send_to(&message.to_bytes(), destination).await?;
        if message.is_request() {
            self.retransmission.add_outgoing_context(message, destination)
        } else {
            self.retransmission.on_response_sent(message);
            Ok(None)
        }
    }

    /// Send without touching any retransmission context
    pub async fn retransmit_message(&self, message: &SipMessage, destination: SocketAddr) -> Result<()> {
        self.transport.send_to(&message.to_bytes(), destination).await
    }

    /// Stop the transport and every pending transaction
    pub async fn close(&self) -> Result<()> {
        self.retransmission.terminate();
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rcs_sip_core::Method;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct LoopbackTransport {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    #[async_trait]
    impl DatagramTransport for LoopbackTransport {
        async fn send_to(&self, data: &[u8], destination: SocketAddr) -> Result<()> {
            self.sent.lock().push((data.to_vec(), destination));
            Ok(())
        }
        fn local_addr(&self) -> Result<SocketAddr> {
            Ok("10.0.0.2:5060".parse().unwrap())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            false
        }
    }

    fn proxy() -> SocketAddr {
        "192.0.2.1:5060".parse().unwrap()
    }

    fn manager() -> (SipUdpManager, Arc<LoopbackTransport>, mpsc::Receiver<SipEvent>) {
        let transport = Arc::new(LoopbackTransport::default());
        let (manager, rx) = SipUdpManager::new(transport.clone(), RetransmissionSettings::default(), Some(proxy()));
        (manager, transport, rx)
    }

    fn register() -> SipMessage {
        SipMessage::request(Method::Register, "sip:ims.example.org")
            .with_header("Via", "SIP/2.0/UDP 10.0.0.2:5060;branch=z9hG4bKreg")
            .with_header("From", "<sip:alice@ims.example.org>;tag=r1")
            .with_header("To", "<sip:alice@ims.example.org>")
            .with_header("Call-ID", "reg-call")
            .with_header("CSeq", "1 REGISTER")
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_then_response() {
        let (manager, transport, mut rx) = manager();
        let key = manager.send_message(&register()).await.unwrap().unwrap();
        assert_eq!(transport.sent.lock()[0].1, proxy());

        let ok = SipMessage::response_to(&register(), 200, "OK").unwrap();
        assert!(manager.process_datagram(&ok.to_bytes(), proxy()).await.unwrap());
        match rx.recv().await.unwrap() {
            SipEvent::MessageReceived { message, source } => {
                assert_eq!(message.status_code(), Some(200));
                assert_eq!(source, proxy());
            }
            other => panic!("unexpected event {:?}", other),
        }

        // a retransmitted 200 OK is not delivered twice
        assert!(!manager.process_datagram(&ok.to_bytes(), proxy()).await.unwrap());
        assert!(manager.retransmission().context_state(&key).is_some());

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(transport.sent.lock().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_incoming_request_retransmission() {
        let (manager, transport, mut rx) = manager();
        let peer: SocketAddr = "198.51.100.1:5060".parse().unwrap();
        let message = SipMessage::request(Method::Message, "sip:alice@10.0.0.2")
            .with_header("Via", "SIP/2.0/UDP 198.51.100.1;branch=z9hG4bKm")
            .with_header("From", "<sip:bob@example.com>;tag=b")
            .with_header("To", "<sip:alice@example.com>")
            .with_header("Call-ID", "im-1")
            .with_header("CSeq", "1 MESSAGE")
            .with_body("text/plain", "hi");

        assert!(manager.process_datagram(&message.to_bytes(), peer).await.unwrap());
        assert!(matches!(rx.recv().await, Some(SipEvent::MessageReceived { .. })));

        let ok = SipMessage::response_to(&message, 200, "OK").unwrap();
        manager.send_message_to(&ok, peer).await.unwrap();
        assert!(!manager.process_datagram(&message.to_bytes(), peer).await.unwrap());

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], (ok.to_bytes().to_vec(), peer));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_datagrams() {
        let (manager, _transport, mut rx) = manager();
        assert!(!manager.process_datagram(b"\r\n\r\n", proxy()).await.unwrap());
        assert!(manager.process_datagram(b"not sip", proxy()).await.is_err());

        let incomplete = SipMessage::request(Method::Options, "sip:x").with_header("Call-ID", "x");
        assert!(matches!(
            manager.process_datagram(&incomplete.to_bytes(), proxy()).await,
            Err(Error::Sip(rcs_sip_core::Error::MissingHeader("From")))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_without_proxy() {
        let (manager, _rx) = SipUdpManager::new(
            Arc::new(LoopbackTransport::default()),
            RetransmissionSettings::default(),
            None,
        );
        assert!(matches!(manager.send_message(&register()).await, Err(Error::NoOutboundProxy)));
        manager.set_outbound_proxy(proxy());
        assert!(manager.send_message(&register()).await.is_ok());
    }

    #[tokio::test]
    async fn test_retransmit_does_not_track() {
        let (manager, transport, _rx) = manager();
        manager.retransmit_message(&register(), proxy()).await.unwrap();
        assert_eq!(transport.sent.lock().len(), 1);
        assert_eq!(manager.retransmission().context_count(), 0);
    }
}
