use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rcs_infra_common::config::SipSection;
use rcs_sip_core::{Method, SipMessage};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::context::{ContextDirection, ContextState, RetransmissionContext};
use super::key::ContextKey;
use crate::error::{Error, Result};
use crate::events::SipEvent;
use crate::transport::DatagramTransport;

/// Timer values for the retransmission layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmissionSettings {
    /// Initial retransmission interval
    pub t1: Duration,
    /// Ceiling of the interval for non-INVITE requests
    pub t2: Duration,
    /// Lifetime of a context
    pub transaction_timeout: Duration,
}

impl Default for RetransmissionSettings {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            transaction_timeout: Duration::from_millis(500 * 64),
        }
    }
}

impl From<&SipSection> for RetransmissionSettings {
    fn from(section: &SipSection) -> Self {
        Self {
            t1: section.t1(),
            t2: section.t2(),
            transaction_timeout: section.transaction_timeout(),
        }
    }
}

/// What the caller should do with a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand it to the session layer
    Deliver,
    /// Retransmission or duplicate, already dealt with
    Absorbed,
}

/// Owner of every retransmission context
#[derive(Clone)]
pub struct RetransmissionManager {
    inner: Arc<Inner>,
}

struct Inner {
    settings: RetransmissionSettings,
    transport: Arc<dyn DatagramTransport>,
    contexts: Mutex<HashMap<ContextKey, RetransmissionContext>>,
    events_tx: mpsc::Sender<SipEvent>,
}

impl RetransmissionManager {
    pub fn new(
        settings: RetransmissionSettings,
        transport: Arc<dyn DatagramTransport>,
        events_tx: mpsc::Sender<SipEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                transport,
                contexts: Mutex::new(HashMap::new()),
                events_tx,
            }),
        }
    }

    pub fn settings(&self) -> &RetransmissionSettings {
        &self.inner.settings
    }

    /// Track a request that has just been sent.
    ///
    /// Returns `None` for ACK (no response expected) and for requests without
    /// Call-ID/CSeq. If the exchange is already tracked only the stored
    /// request is replaced; no second set of timers is started.
    pub fn add_outgoing_context(&self, request: &SipMessage, destination: SocketAddr) -> Result<Option<ContextKey>> {
        if request.method() == Some(Method::Ack) {
            return Ok(None);
        }
        let Some(key) = ContextKey::for_message(request) else {
            warn!(request = %request, "Request without Call-ID/CSeq sent without retransmission");
            return Ok(None);
        };

        let mut contexts = self.inner.contexts.lock();
        if let Some(ctx) = contexts.get_mut(&key) {
            trace!(context_id = %key, "Updating outgoing message of existing context");
            ctx.outgoing_message = Some(request.clone());
            ctx.remote = destination;
            return Ok(Some(key));
        }

        let handle = Handle::try_current()
            .map_err(|_| rcs_infra_common::Error::NoRuntime(format!("retransmission of {}", key)))?;

        let mut ctx = RetransmissionContext::outgoing(key.clone(), request.clone(), destination);
        let is_invite = ctx.method == Method::Invite;
        ctx.t1_task = Some(spawn_t1(&handle, &self.inner, key.clone(), is_invite));
        ctx.timeout_task = Some(spawn_timeout(&handle, &self.inner, key.clone()));
        contexts.insert(key.clone(), ctx);

        debug!(context_id = %key, %destination, "Outgoing retransmission context created");
        Ok(Some(key))
    }

    /// Bind a received response to its outgoing context.
    pub fn on_response_received(&self, response: &SipMessage) -> Disposition {
        let Some(key) = ContextKey::for_message(response) else {
            return Disposition::Deliver;
        };
        let mut contexts = self.inner.contexts.lock();
        let Some(ctx) = contexts.get_mut(&key) else {
            trace!(context_id = %key, "Response outside of any context");
            return Disposition::Deliver;
        };
        if ctx.direction != ContextDirection::Outgoing {
            return Disposition::Deliver;
        }

        if response.is_final_response() {
            if ctx.is_answered() {
                debug!(context_id = %key, "Duplicate final response absorbed");
                return Disposition::Absorbed;
            }
            ctx.state = ContextState::Answered;
            ctx.cancel_t1();
            debug!(context_id = %key, retransmissions = ctx.retransmissions, "Final response bound to context");
        } else {
            ctx.provisional_received = true;
            if ctx.method == Method::Invite {
                ctx.cancel_t1();
            }
        }
        ctx.incoming_message = Some(response.clone());
        Disposition::Deliver
    }

    /// Track a received request, answering retransmissions from the stored
    /// response.
    pub async fn on_request_received(&self, request: &SipMessage, source: SocketAddr) -> Result<Disposition> {
        if request.method() == Some(Method::Ack) {
            return Ok(Disposition::Deliver);
        }
        let Some(key) = ContextKey::for_message(request) else {
            return Ok(Disposition::Deliver);
        };

        let replay = {
            let mut contexts = self.inner.contexts.lock();
            match contexts.get_mut(&key) {
                Some(ctx) if ctx.direction == ContextDirection::Incoming => {
                    ctx.retransmissions += 1;
                    Some(ctx.outgoing_message.as_ref().map(SipMessage::to_bytes))
                }
                Some(_) => None,
                None => {
                    let handle = Handle::try_current()
                        .map_err(|_| rcs_infra_common::Error::NoRuntime(format!("expiry of {}", key)))?;
                    let mut ctx = RetransmissionContext::incoming(key.clone(), request.clone(), source);
                    ctx.timeout_task = Some(spawn_timeout(&handle, &self.inner, key.clone()));
                    contexts.insert(key.clone(), ctx);
                    trace!(context_id = %key, "Incoming context created");
                    None
                }
            }
        };

        match replay {
            None => Ok(Disposition::Deliver),
            Some(stored) => {
                debug!(context_id = %key, "Retransmitted request absorbed");
                if let Some(data) = stored {
                    self.inner.transport.send_to(&data, source).await?;
                }
                Ok(Disposition::Absorbed)
            }
        }
    }

    /// Remember the response sent for an incoming request so retransmissions
    /// of that request can be answered.
    pub fn on_response_sent(&self, response: &SipMessage) {
        let Some(key) = ContextKey::for_message(response) else {
            return;
        };
        let mut contexts = self.inner.contexts.lock();
        if let Some(ctx) = contexts.get_mut(&key) {
            if ctx.direction == ContextDirection::Incoming {
                ctx.outgoing_message = Some(response.clone());
                if response.is_final_response() {
                    ctx.state = ContextState::Answered;
                }
            }
        }
    }

    /// Drop a context and its timers. Returns whether it existed; calling it
    /// again, or after the timeout fired, is harmless.
    pub fn cancel(&self, key: &ContextKey) -> bool {
        let removed = self.inner.contexts.lock().remove(key);
        match removed {
            Some(mut ctx) => {
                ctx.cancel_timers();
                debug!(context_id = %key, "Context cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop every context
    pub fn terminate(&self) {
        let drained: Vec<_> = self.inner.contexts.lock().drain().collect();
        for (_, mut ctx) in drained {
            ctx.cancel_timers();
        }
    }

    pub fn context_state(&self, key: &ContextKey) -> Option<ContextState> {
        self.inner.contexts.lock().get(key).map(|ctx| ctx.state)
    }

    pub fn retransmission_count(&self, key: &ContextKey) -> Option<u32> {
        self.inner.contexts.lock().get(key).map(|ctx| ctx.retransmissions)
    }

    pub fn contains(&self, key: &ContextKey) -> bool {
        self.inner.contexts.lock().contains_key(key)
    }

    pub fn context_count(&self) -> usize {
        self.inner.contexts.lock().len()
    }
}

fn next_interval(current: Duration, is_invite: bool, provisional: bool, settings: &RetransmissionSettings) -> Duration {
    if is_invite {
        current * 2
    } else if provisional {
        settings.t2
    } else {
        (current * 2).min(settings.t2)
    }
}

fn spawn_t1(handle: &Handle, inner: &Arc<Inner>, key: ContextKey, is_invite: bool) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let settings = inner.settings.clone();

    handle.spawn(async move {
        let mut interval = settings.t1;
        loop {
            tokio::time::sleep(interval).await;
            let Some(inner) = weak.upgrade() else {
                break;
            };

            let (data, remote, provisional) = {
                let mut contexts = inner.contexts.lock();
                let Some(ctx) = contexts.get_mut(&key) else {
                    break;
                };
                if matches!(ctx.state, ContextState::Answered | ContextState::Expired)
                    || ctx.created_at.elapsed() >= settings.transaction_timeout
                    || (is_invite && ctx.provisional_received)
                {
                    break;
                }
                let Some(request) = ctx.outgoing_message.as_ref() else {
                    break;
                };
                ctx.retransmissions += 1;
                ctx.state = ContextState::Retransmitting;
                (request.to_bytes(), ctx.remote, ctx.provisional_received)
            };

            debug!(context_id = %key, ?interval, "Retransmitting request");
            if let Err(e) = inner.transport.send_to(&data, remote).await {
                warn!(context_id = %key, "Retransmission failed: {}", e);
            }
            interval = next_interval(interval, is_invite, provisional, &settings);
        }
    })
}

fn spawn_timeout(handle: &Handle, inner: &Arc<Inner>, key: ContextKey) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let timeout = inner.settings.transaction_timeout;

    handle.spawn(async move {
        tokio::time::sleep(timeout).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };

        let expired = {
            let mut contexts = inner.contexts.lock();
            let Some(mut ctx) = contexts.remove(&key) else {
                return;
            };
            ctx.cancel_t1();
            // our own handle: detach instead of aborting
            drop(ctx.timeout_task.take());
            if ctx.direction == ContextDirection::Outgoing && ctx.state != ContextState::Answered {
                ctx.state = ContextState::Expired;
                ctx.outgoing_message.take()
            } else {
                None
            }
        };

        match expired {
            Some(request) => {
                warn!(context_id = %key, "Transaction timed out without final response");
                let event = SipEvent::TransactionTimeout {
                    context_id: key.to_string(),
                    request,
                };
                if inner.events_tx.send(event).await.is_err() {
                    debug!(context_id = %key, "{}", Error::ChannelClosed);
                }
            }
            None => trace!(context_id = %key, "Context expired"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::time::Instant;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(Instant, Vec<u8>, SocketAddr)>>,
    }

    #[async_trait]
    impl DatagramTransport for RecordingTransport {
        async fn send_to(&self, data: &[u8], destination: SocketAddr) -> Result<()> {
            self.sent.lock().push((Instant::now(), data.to_vec(), destination));
            Ok(())
        }
        fn local_addr(&self) -> Result<SocketAddr> {
            Ok("127.0.0.1:5060".parse().unwrap())
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

    fn request(method: Method, cseq: u32) -> SipMessage {
        SipMessage::request(method.clone(), "sip:bob@example.com")
            .with_header("Via", "SIP/2.0/UDP 10.0.0.2;branch=z9hG4bKx")
            .with_header("From", "<sip:alice@example.com>;tag=1")
            .with_header("To", "<sip:bob@example.com>")
            .with_header("Call-ID", "call-1")
            .with_header("CSeq", format!("{} {}", cseq, method))
    }

    fn setup() -> (RetransmissionManager, Arc<RecordingTransport>, mpsc::Receiver<SipEvent>) {
        let transport = Arc::new(RecordingTransport::default());
        let (tx, rx) = mpsc::channel(16);
        let manager = RetransmissionManager::new(RetransmissionSettings::default(), transport.clone(), tx);
        (manager, transport, rx)
    }

    fn send_offsets(transport: &RecordingTransport, start: Instant) -> Vec<u64> {
        transport
            .sent
            .lock()
            .iter()
            .map(|(at, _, _)| at.duration_since(start).as_millis() as u64)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_invite_backoff_is_uncapped() {
        let (manager, transport, mut rx) = setup();
        let start = Instant::now();
        let key = manager.add_outgoing_context(&request(Method::Invite, 1), proxy()).unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(31_900)).await;
        assert_eq!(send_offsets(&transport, start), vec![500, 1_500, 3_500, 7_500, 15_500, 31_500]);
        assert_eq!(manager.context_state(&key), Some(ContextState::Retransmitting));

        let event = rx.recv().await.unwrap();
        match event {
            SipEvent::TransactionTimeout { context_id, request } => {
                assert_eq!(context_id, "call-1_INVITE_1");
                assert_eq!(request.method(), Some(Method::Invite));
            }
            other => panic!("unexpected event {:?}", other),
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(32) && elapsed < Duration::from_millis(32_100));
        assert!(!manager.contains(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_invite_backoff_is_capped_at_t2() {
        let (manager, transport, mut rx) = setup();
        let start = Instant::now();
        manager.add_outgoing_context(&request(Method::Message, 2), proxy()).unwrap();

        assert!(matches!(rx.recv().await, Some(SipEvent::TransactionTimeout { .. })));
        assert_eq!(
            send_offsets(&transport, start),
            vec![500, 1_500, 3_500, 7_500, 11_500, 15_500, 19_500, 23_500, 27_500, 31_500]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_response_stops_retransmission_quietly() {
        let (manager, transport, mut rx) = setup();
        let invite = request(Method::Invite, 1);
        let key = manager.add_outgoing_context(&invite, proxy()).unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(1_600)).await;
        assert_eq!(transport.sent.lock().len(), 2);

        let ok = SipMessage::response_to(&invite, 200, "OK").unwrap();
        assert_eq!(manager.on_response_received(&ok), Disposition::Deliver);
        assert_eq!(manager.context_state(&key), Some(ContextState::Answered));
        // duplicate final response is suppressed
        assert_eq!(manager.on_response_received(&ok), Disposition::Absorbed);

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(transport.sent.lock().len(), 2);
        assert!(!manager.contains(&key));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisional_moves_non_invite_to_t2() {
        let (manager, transport, _rx) = setup();
        let start = Instant::now();
        let message = request(Method::Message, 5);
        manager.add_outgoing_context(&message, proxy()).unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        let trying = SipMessage::response_to(&message, 100, "Trying").unwrap();
        assert_eq!(manager.on_response_received(&trying), Disposition::Deliver);

        tokio::time::sleep(Duration::from_millis(9_000)).await;
        assert_eq!(send_offsets(&transport, start), vec![500, 1_500, 5_500, 9_500]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_silent() {
        let (manager, transport, mut rx) = setup();
        let key = manager.add_outgoing_context(&request(Method::Options, 9), proxy()).unwrap().unwrap();

        assert!(manager.cancel(&key));
        assert!(!manager.cancel(&key));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(transport.sent.lock().is_empty());
        assert!(rx.try_recv().is_err());
        assert!(!manager.cancel(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_updates_existing_context() {
        let (manager, _transport, _rx) = setup();
        let first = manager.add_outgoing_context(&request(Method::Register, 1), proxy()).unwrap();
        let second = manager.add_outgoing_context(&request(Method::Register, 1), proxy()).unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.context_count(), 1);

        manager.add_outgoing_context(&request(Method::Register, 2), proxy()).unwrap();
        assert_eq!(manager.context_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_is_not_tracked() {
        let (manager, _transport, _rx) = setup();
        assert_eq!(manager.add_outgoing_context(&request(Method::Ack, 1), proxy()).unwrap(), None);
        assert_eq!(manager.context_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_retransmission_replays_response() {
        let (manager, transport, mut rx) = setup();
        let source: SocketAddr = "198.51.100.7:5060".parse().unwrap();
        let incoming = request(Method::Message, 11);

        assert_eq!(manager.on_request_received(&incoming, source).await.unwrap(), Disposition::Deliver);
        // retransmission before we answered: absorbed, nothing to replay
        assert_eq!(manager.on_request_received(&incoming, source).await.unwrap(), Disposition::Absorbed);
        assert!(transport.sent.lock().is_empty());

        let ok = SipMessage::response_to(&incoming, 200, "OK").unwrap();
        manager.on_response_sent(&ok);
        assert_eq!(manager.on_request_received(&incoming, source).await.unwrap(), Disposition::Absorbed);
        {
            let sent = transport.sent.lock();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].1, ok.to_bytes().to_vec());
            assert_eq!(sent[0].2, source);
        }

        // incoming contexts expire without reporting anything
        tokio::time::sleep(Duration::from_secs(33)).await;
        assert_eq!(manager.context_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_terminate_clears_everything() {
        let (manager, _transport, _rx) = setup();
        manager.add_outgoing_context(&request(Method::Invite, 1), proxy()).unwrap();
        manager.add_outgoing_context(&request(Method::Bye, 2), proxy()).unwrap();
        manager.terminate();
        assert_eq!(manager.context_count(), 0);
    }

    #[test]
    fn test_settings_from_config() {
        let mut section = SipSection::default();
        section.t1_ms = 200;
        let settings = RetransmissionSettings::from(&section);
        assert_eq!(settings.t1, Duration::from_millis(200));
        assert_eq!(settings.transaction_timeout, Duration::from_millis(200 * 64));
        assert_eq!(RetransmissionSettings::from(&SipSection::default()), RetransmissionSettings::default());
    }
}
