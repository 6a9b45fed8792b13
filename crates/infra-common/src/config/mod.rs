//! Core configuration.
//!
//! Every field carries the default the protocol stack uses when nothing is
//! configured, so an empty TOML document yields a working [`CoreConfig`].
//!
//! ```
//! use rcs_infra_common::CoreConfig;
//!
//! let config = CoreConfig::from_toml_str(r#"
//!     [sip]
//!     keep_alive_period_secs = 30
//!     outbound_proxy = "192.0.2.10:5060"
//! "#).unwrap();
//!
//! assert_eq!(config.sip.keep_alive_period().as_secs(), 30);
//! assert_eq!(config.sip.t1().as_millis(), 500);
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::types::{Error, Result};
use crate::errors::ErrorExt;

/// RFC 3261 T1, the round-trip estimate.
pub const DEFAULT_T1_MS: u64 = 500;
/// RFC 3261 T2, the backoff ceiling for non-INVITE requests.
pub const DEFAULT_T2_MS: u64 = 4_000;
/// Default SIP keep-alive period.
pub const DEFAULT_KEEP_ALIVE_PERIOD_SECS: u64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub sip: SipSection,
    pub rtp: RtpSection,
    pub msrp: MsrpSection,
    pub logging: LoggingSection,
}

/// SIP transaction and keep-alive settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SipSection {
    pub t1_ms: u64,
    pub t2_ms: u64,
    /// Lifetime of a retransmission context; 64*T1 when unset
    pub transaction_timeout_ms: Option<u64>,
    pub keep_alive_enabled: bool,
    pub keep_alive_period_secs: u64,
    pub outbound_proxy: Option<SocketAddr>,
    pub local_port: u16,
}

impl Default for SipSection {
    fn default() -> Self {
        Self {
            t1_ms: DEFAULT_T1_MS,
            t2_ms: DEFAULT_T2_MS,
            transaction_timeout_ms: None,
            keep_alive_enabled: true,
            keep_alive_period_secs: DEFAULT_KEEP_ALIVE_PERIOD_SECS,
            outbound_proxy: None,
            local_port: 5060,
        }
    }
}

impl SipSection {
    pub fn t1(&self) -> Duration {
        Duration::from_millis(self.t1_ms)
    }

    pub fn t2(&self) -> Duration {
        Duration::from_millis(self.t2_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        match self.transaction_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.t1() * 64,
        }
    }

    pub fn keep_alive_period(&self) -> Duration {
        Duration::from_secs(self.keep_alive_period_secs)
    }
}

/// RTP/RTCP and codec framing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpSection {
    pub default_datagram_size: usize,
    pub symmetric_rtp: bool,
    pub max_h263_payload_size: usize,
    pub t140_redundancy_generations: usize,
    pub t140_payload_type: u8,
    pub red_payload_type: u8,
    /// CNAME advertised in SDES; derived from the local address when unset
    pub cname: Option<String>,
}

impl Default for RtpSection {
    fn default() -> Self {
        Self {
            default_datagram_size: 4096,
            symmetric_rtp: true,
            max_h263_payload_size: 1300,
            t140_redundancy_generations: 2,
            t140_payload_type: 98,
            red_payload_type: 99,
            cname: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsrpSection {
    pub chunk_max_size: usize,
    pub response_timeout_secs: u64,
    pub trace_enabled: bool,
}

impl Default for MsrpSection {
    fn default() -> Self {
        Self {
            chunk_max_size: 10 * 1024,
            response_timeout_secs: 30,
            trace_enabled: false,
        }
    }
}

impl MsrpSection {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
    pub app_name: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            app_name: "rcs-core".to_string(),
        }
    }
}

impl CoreConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).with_context("config", path.display().to_string())
    }

    pub fn with_outbound_proxy(mut self, proxy: SocketAddr) -> Self {
        self.sip.outbound_proxy = Some(proxy);
        self
    }

    pub fn with_keep_alive_period(mut self, period: Duration) -> Self {
        self.sip.keep_alive_period_secs = period.as_secs();
        self
    }

    pub fn without_keep_alive(mut self) -> Self {
        self.sip.keep_alive_enabled = false;
        self
    }

    /// Check the configuration for values the protocol layers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sip.t1_ms == 0 {
            return Err(Error::Config("sip.t1_ms must be greater than zero".into()));
        }
        if self.sip.t2_ms < self.sip.t1_ms {
            return Err(Error::Config("sip.t2_ms must not be smaller than sip.t1_ms".into()));
        }
        if self.sip.transaction_timeout() < self.sip.t1() {
            return Err(Error::Config(
                "sip.transaction_timeout_ms must not be smaller than sip.t1_ms".into(),
            ));
        }
        if self.sip.keep_alive_enabled && self.sip.keep_alive_period_secs == 0 {
            return Err(Error::Config("sip.keep_alive_period_secs must be greater than zero".into()));
        }
        if self.rtp.t140_payload_type > 127 || self.rtp.red_payload_type > 127 {
            return Err(Error::Config("RTP payload types are 7-bit values".into()));
        }
        if self.rtp.max_h263_payload_size <= 2 {
            return Err(Error::Config("rtp.max_h263_payload_size must leave room for the payload header".into()));
        }
        if self.msrp.chunk_max_size == 0 {
            return Err(Error::Config("msrp.chunk_max_size must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.sip.t1(), Duration::from_millis(500));
        assert_eq!(config.sip.t2(), Duration::from_secs(4));
        assert_eq!(config.sip.transaction_timeout(), Duration::from_secs(32));
        assert_eq!(config.sip.keep_alive_period(), Duration::from_secs(60));
        assert!(config.sip.keep_alive_enabled);
        assert_eq!(config.rtp.t140_payload_type, 98);
        assert_eq!(config.msrp.chunk_max_size, 10240);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = CoreConfig::from_toml_str(
            r#"
            [sip]
            t1_ms = 250
            outbound_proxy = "10.0.0.1:5080"

            [rtp]
            cname = "alice@example.com"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.sip.t1(), Duration::from_millis(250));
        assert_eq!(config.sip.transaction_timeout(), Duration::from_millis(250 * 64));
        assert_eq!(config.sip.outbound_proxy, Some("10.0.0.1:5080".parse().unwrap()));
        assert_eq!(config.rtp.cname.as_deref(), Some("alice@example.com"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.msrp, MsrpSection::default());
    }

    #[test]
    fn test_validation_failures() {
        assert!(CoreConfig::from_toml_str("[sip]\nt1_ms = 0").is_err());
        assert!(CoreConfig::from_toml_str("[sip]\nt1_ms = 500\nt2_ms = 100").is_err());
        assert!(CoreConfig::from_toml_str("[sip]\nkeep_alive_period_secs = 0").is_err());
        assert!(CoreConfig::from_toml_str("[sip]\nkeep_alive_enabled = false\nkeep_alive_period_secs = 0").is_ok());
        assert!(CoreConfig::from_toml_str("[rtp]\nt140_payload_type = 200").is_err());
        assert!(CoreConfig::from_toml_str("[msrp]\nchunk_max_size = 0").is_err());
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(CoreConfig::from_toml_str("[sip"), Err(Error::Toml(_))));
    }

    #[test]
    fn test_builders() {
        let proxy: SocketAddr = "192.0.2.1:5060".parse().unwrap();
        let config = CoreConfig::default()
            .with_outbound_proxy(proxy)
            .with_keep_alive_period(Duration::from_secs(15))
            .without_keep_alive();
        assert_eq!(config.sip.outbound_proxy, Some(proxy));
        assert_eq!(config.sip.keep_alive_period_secs, 15);
        assert!(!config.sip.keep_alive_enabled);
    }

    #[test]
    fn test_json_round_trip() {
        let config = CoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_from_file_names_the_file() {
        let path = std::env::temp_dir().join(format!("rcs-core-{}.toml", std::process::id()));
        std::fs::write(&path, "[sip]\nt1_ms = 0\n").unwrap();

        let err = CoreConfig::from_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        match err {
            Error::Config(msg) => {
                assert!(msg.contains("t1_ms"));
                assert!(msg.contains("rcs-core-"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
