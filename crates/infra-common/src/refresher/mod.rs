//! Periodic refresher.
//!
//! A [`PeriodicRefresher`] owns at most one scheduled task. Starting it again
//! cancels the previous task before the new one is spawned, and stopping it
//! guarantees no further invocation of the processing callback begins after
//! `stop_timer` returns.
//!
//! Two schedules are supported:
//!
//! - [`RefreshMode::FixedRate`]: ticks every `period * delta` measured from the
//!   start, used for registration refresh.
//! - [`RefreshMode::FixedDelay`]: waits `period * delta` after each processing
//!   round completes before the next one, used for SIP keep-alive.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use rcs_infra_common::{PeriodicProcessing, PeriodicRefresher, RefreshMode};
//!
//! struct Register;
//!
//! #[async_trait]
//! impl PeriodicProcessing for Register {
//!     async fn periodic_processing(&self) {}
//! }
//!
//! # tokio_test::block_on(async {
//! let refresher = PeriodicRefresher::new("registration", RefreshMode::FixedRate);
//! refresher.start_timer(Duration::from_secs(3600), 0.5, Arc::new(Register)).unwrap();
//! assert_eq!(refresher.current_period(), Some(Duration::from_secs(1800)));
//!
//! refresher.stop_timer();
//! assert!(!refresher.is_timer_started());
//! # });
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::errors::types::{Error, Result};

/// Work performed on every tick of a [`PeriodicRefresher`]
#[async_trait]
pub trait PeriodicProcessing: Send + Sync + 'static {
    async fn periodic_processing(&self);
}

/// How the next tick is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    FixedRate,
    FixedDelay,
}

#[derive(Default)]
struct RefresherState {
    /// Bumped on every start/stop; a task only runs while its epoch is current
    epoch: u64,
    task: Option<JoinHandle<()>>,
    period: Option<Duration>,
}

/// Reschedulable single-task timer
pub struct PeriodicRefresher {
    name: String,
    mode: RefreshMode,
    state: Arc<Mutex<RefresherState>>,
}

impl PeriodicRefresher {
    pub fn new(name: impl Into<String>, mode: RefreshMode) -> Self {
        Self {
            name: name.into(),
            mode,
            state: Arc::new(Mutex::new(RefresherState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    /// Schedule `processor` every `period * delta`, replacing any running task.
    ///
    /// `delta` lets callers refresh ahead of an expiry (e.g. `0.5` of a
    /// registration's lifetime). Must be called from within a tokio runtime.
    pub fn start_timer(
        &self,
        period: Duration,
        delta: f64,
        processor: Arc<dyn PeriodicProcessing>,
    ) -> Result<()> {
        if !delta.is_finite() || delta <= 0.0 {
            return Err(Error::InvalidPeriod(Duration::ZERO));
        }
        let effective = period.mul_f64(delta);
        if effective.is_zero() {
            return Err(Error::InvalidPeriod(effective));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::NoRuntime(self.name.clone()))?;

        let mut state = self.state.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.epoch = state.epoch.wrapping_add(1);
        state.period = Some(effective);
        let epoch = state.epoch;

        debug!(refresher = %self.name, ?effective, mode = ?self.mode, "Starting periodic timer");

        let shared = self.state.clone();
        let name = self.name.clone();
        let mode = self.mode;
        state.task = Some(handle.spawn(async move {
            match mode {
                RefreshMode::FixedRate => {
                    let mut interval = tokio::time::interval_at(Instant::now() + effective, effective);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        interval.tick().await;
                        if !is_current(&shared, epoch) {
                            break;
                        }
                        trace!(refresher = %name, "Periodic processing");
                        processor.periodic_processing().await;
                    }
                }
                RefreshMode::FixedDelay => loop {
                    tokio::time::sleep(effective).await;
                    if !is_current(&shared, epoch) {
                        break;
                    }
                    trace!(refresher = %name, "Periodic processing");
                    processor.periodic_processing().await;
                },
            }
        }));

        Ok(())
    }

    /// Cancel the scheduled task, if any. Safe to call repeatedly.
    pub fn stop_timer(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        state.period = None;
        if let Some(task) = state.task.take() {
            debug!(refresher = %self.name, "Stopping periodic timer");
            task.abort();
        }
    }

    /// Whether a task is currently scheduled
    pub fn is_timer_started(&self) -> bool {
        let state = self.state.lock();
        state.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Effective period of the running task
    pub fn current_period(&self) -> Option<Duration> {
        self.state.lock().period
    }
}

fn is_current(state: &Mutex<RefresherState>, epoch: u64) -> bool {
    state.lock().epoch == epoch
}

impl Drop for PeriodicRefresher {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

impl fmt::Debug for PeriodicRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicRefresher")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("started", &self.is_timer_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    #[async_trait]
    impl PeriodicProcessing for Counter {
        async fn periodic_processing(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter(AtomicUsize::new(0)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_rate_fires_every_period() {
        let refresher = PeriodicRefresher::new("test", RefreshMode::FixedRate);
        let count = counter();
        refresher.start_timer(Duration::from_secs(10), 1.0, count.clone()).unwrap();
        assert!(refresher.is_timer_started());

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert_eq!(count.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.0.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delta_scales_period() {
        let refresher = PeriodicRefresher::new("register", RefreshMode::FixedRate);
        let count = counter();
        refresher.start_timer(Duration::from_secs(3600), 0.5, count.clone()).unwrap();
        assert_eq!(refresher.current_period(), Some(Duration::from_secs(1800)));

        tokio::time::sleep(Duration::from_secs(1801)).await;
        assert_eq!(count.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_leaves_single_task() {
        let refresher = PeriodicRefresher::new("test", RefreshMode::FixedRate);
        let count = counter();
        refresher.start_timer(Duration::from_secs(1), 1.0, count.clone()).unwrap();
        refresher.start_timer(Duration::from_secs(1), 1.0, count.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(count.0.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_firing() {
        let refresher = PeriodicRefresher::new("test", RefreshMode::FixedDelay);
        let count = counter();
        refresher.start_timer(Duration::from_secs(1), 1.0, count.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(count.0.load(Ordering::SeqCst), 2);

        refresher.stop_timer();
        assert!(!refresher.is_timer_started());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.0.load(Ordering::SeqCst), 2);

        // stopping twice is harmless
        refresher.stop_timer();
    }

    #[tokio::test]
    async fn test_invalid_period_rejected() {
        let refresher = PeriodicRefresher::new("test", RefreshMode::FixedRate);
        assert!(matches!(
            refresher.start_timer(Duration::ZERO, 1.0, counter()),
            Err(Error::InvalidPeriod(_))
        ));
        assert!(refresher.start_timer(Duration::from_secs(1), 0.0, counter()).is_err());
        assert!(!refresher.is_timer_started());
    }

    #[test]
    fn test_start_without_runtime() {
        let refresher = PeriodicRefresher::new("orphan", RefreshMode::FixedRate);
        assert!(matches!(
            refresher.start_timer(Duration::from_secs(1), 1.0, counter()),
            Err(Error::NoRuntime(_))
        ));
    }
}
