//! RFC 5626 keep-alive.
//!
//! A double CRLF datagram goes to the outbound proxy every keep-alive
//! period. The next period starts after each send completes, and a failed
//! send is only logged: the schedule continues with no backoff and no
//! give-up.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rcs_infra_common::config::SipSection;
use rcs_infra_common::{PeriodicProcessing, PeriodicRefresher, RefreshMode};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::DatagramTransport;

/// Keep-alive ping payload
pub const KEEP_ALIVE_PING: &[u8] = b"\r\n\r\n";

#[derive(Debug)]
struct KeepAliveSender {
    transport: Arc<dyn DatagramTransport>,
    target: Mutex<Option<SocketAddr>>,
    sent: AtomicU64,
    failures: AtomicU64,
}

#[async_trait]
impl PeriodicProcessing for KeepAliveSender {
    async fn periodic_processing(&self) {
        let Some(target) = *self.target.lock() else {
            debug!("No outbound proxy, keep-alive skipped");
            return;
        };
        match self.transport.send_to(KEEP_ALIVE_PING, target).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                debug!(%target, "SIP keep-alive sent");
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(%target, "SIP keep-alive failed: {}", e);
            }
        }
    }
}

/// Periodic double-CRLF sender towards the outbound proxy
pub struct KeepAliveManager {
    refresher: PeriodicRefresher,
    sender: Arc<KeepAliveSender>,
    period: Mutex<Duration>,
    enabled: bool,
}

impl KeepAliveManager {
    pub fn new(transport: Arc<dyn DatagramTransport>, target: Option<SocketAddr>, period: Duration) -> Self {
        Self {
            refresher: PeriodicRefresher::new("sip-keep-alive", RefreshMode::FixedDelay),
            sender: Arc::new(KeepAliveSender {
                transport,
                target: Mutex::new(target),
                sent: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
            period: Mutex::new(period),
            enabled: true,
        }
    }

    pub fn from_config(transport: Arc<dyn DatagramTransport>, config: &SipSection) -> Self {
        let mut manager = Self::new(transport, config.outbound_proxy, config.keep_alive_period());
        manager.enabled = config.keep_alive_enabled;
        manager
    }

    /// Start sending. A no-op when keep-alive is disabled in configuration.
    pub fn start(&self) -> Result<()> {
        if !self.enabled {
            debug!("SIP keep-alive disabled");
            return Ok(());
        }
        if self.sender.target.lock().is_none() {
            return Err(Error::NoOutboundProxy);
        }
        let period = *self.period.lock();
        info!(?period, "Starting SIP keep-alive");
        self.refresher.start_timer(period, 1.0, self.sender.clone())?;
        Ok(())
    }

    pub fn stop(&self) {
        self.refresher.stop_timer();
    }

    pub fn is_started(&self) -> bool {
        self.refresher.is_timer_started()
    }

    /// Change the period; a running timer is restarted with it
    pub fn set_period(&self, period: Duration) -> Result<()> {
        *self.period.lock() = period;
        if self.is_started() {
            self.refresher.start_timer(period, 1.0, self.sender.clone())?;
        }
        Ok(())
    }

    /// Change the outbound proxy (e.g. after re-registration)
    pub fn set_target(&self, target: SocketAddr) {
        *self.sender.target.lock() = Some(target);
    }

    pub fn sent_count(&self) -> u64 {
        self.sender.sent.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.sender.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Default)]
    struct FlakyTransport {
        fail: AtomicBool,
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    #[async_trait]
    impl DatagramTransport for FlakyTransport {
        async fn send_to(&self, data: &[u8], destination: SocketAddr) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "network down")));
            }
            self.sent.lock().push((data.to_vec(), destination));
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
        "192.0.2.10:5060".parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_double_crlf_every_period() {
        let transport = Arc::new(FlakyTransport::default());
        let manager = KeepAliveManager::new(transport.clone(), Some(proxy()), Duration::from_secs(60));
        manager.start().unwrap();
        assert!(manager.is_started());

        tokio::time::sleep(Duration::from_secs(181)).await;
        let sent = transport.sent.lock().clone();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(data, to)| data == b"\r\n\r\n" && *to == proxy()));
        assert_eq!(manager.sent_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_schedule() {
        let transport = Arc::new(FlakyTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let manager = KeepAliveManager::new(transport.clone(), Some(proxy()), Duration::from_secs(10));
        manager.start().unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(manager.failure_count(), 2);
        assert!(manager.is_started());

        transport.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_period_change() {
        let transport = Arc::new(FlakyTransport::default());
        let manager = KeepAliveManager::new(transport.clone(), Some(proxy()), Duration::from_secs(60));
        manager.start().unwrap();
        manager.set_period(Duration::from_secs(5)).unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(manager.sent_count(), 2);

        manager.stop();
        assert!(!manager.is_started());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(manager.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_requires_outbound_proxy() {
        let manager = KeepAliveManager::new(Arc::new(FlakyTransport::default()), None, Duration::from_secs(60));
        assert!(matches!(manager.start(), Err(Error::NoOutboundProxy)));
    }

    #[tokio::test]
    async fn test_disabled_by_config() {
        let mut config = SipSection::default();
        config.keep_alive_enabled = false;
        config.outbound_proxy = Some(proxy());
        let manager = KeepAliveManager::from_config(Arc::new(FlakyTransport::default()), &config);
        manager.start().unwrap();
        assert!(!manager.is_started());
    }
}
