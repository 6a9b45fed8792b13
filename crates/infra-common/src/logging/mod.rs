//! Logging setup built on `tracing-subscriber`.
//!
//! Protocol components only emit `tracing` events; installing a subscriber is
//! the job of the embedding binary (or a test) via [`setup_logging`].

pub mod setup;

pub use setup::{log_welcome, parse_log_level, setup_logging, try_setup_logging, LoggingConfig};
