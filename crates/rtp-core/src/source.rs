use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rcs_infra_common::config::RtpSection;

use crate::RtpSsrc;

/// Identity of the local sender in one RTP session
///
/// Each session creates its own source, so two streams in the same process
/// never share an SSRC by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpSource {
    ssrc: RtpSsrc,
    cname: String,
}

impl RtpSource {
    /// A source with a fresh SSRC
    ///
    /// The SSRC mixes the wall clock in milliseconds with random bits.
    pub fn new(cname: impl Into<String>) -> Self {
        Self::with_ssrc(generate_ssrc(), cname)
    }

    /// A source named after the configured CNAME, or after `local` when none is set
    pub fn from_config(config: &RtpSection, local: SocketAddr) -> Self {
        match &config.cname {
            Some(cname) => Self::new(cname.clone()),
            None => Self::new(local.ip().to_string()),
        }
    }

    pub fn with_ssrc(ssrc: RtpSsrc, cname: impl Into<String>) -> Self {
        Self {
            ssrc,
            cname: cname.into(),
        }
    }

    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    pub fn cname(&self) -> &str {
        &self.cname
    }
}

fn generate_ssrc() -> RtpSsrc {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0);
    millis ^ rand::thread_rng().gen::<u32>()
}
