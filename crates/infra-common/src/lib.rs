//! Common infrastructure shared by the RCS protocol crates.
//!
//! This crate holds the pieces every protocol component leans on but none of
//! them owns:
//!
//! - [`config`]: the serde-backed [`CoreConfig`](config::CoreConfig) with SIP,
//!   RTP, MSRP and logging sections
//! - [`logging`]: `tracing-subscriber` setup for binaries and tests
//! - [`errors`]: the shared error type and context helpers
//! - [`refresher`]: [`PeriodicRefresher`](refresher::PeriodicRefresher), the
//!   single-task reschedulable timer used by SIP keep-alive and registration
//!   refresh

pub mod config;
pub mod errors;
pub mod logging;
pub mod refresher;

pub use config::CoreConfig;
pub use errors::types::{Error, Result};
pub use refresher::{PeriodicProcessing, PeriodicRefresher, RefreshMode};
