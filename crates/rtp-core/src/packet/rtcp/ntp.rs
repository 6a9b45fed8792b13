use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Seconds between 1900-01-01 and 1970-01-01
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// 64-bit NTP timestamp carried in sender reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    /// Seconds since 1900-01-01
    pub seconds: u32,

    /// Fraction of a second in units of 2^-32
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Wall clock now
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::from_unix(since_epoch)
    }

    /// Convert a duration since the UNIX epoch
    pub fn from_unix(since_epoch: Duration) -> Self {
        let fraction = ((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;
        Self {
            seconds: (since_epoch.as_secs() + NTP_UNIX_OFFSET) as u32,
            fraction: fraction as u32,
        }
    }

    /// Duration since the UNIX epoch, zero for times before it
    pub fn to_unix(&self) -> Duration {
        let seconds = (self.seconds as u64).saturating_sub(NTP_UNIX_OFFSET);
        let nanos = ((self.fraction as u64) * 1_000_000_000) >> 32;
        Duration::new(seconds, nanos as u32)
    }

    pub fn to_u64(&self) -> u64 {
        (self.seconds as u64) << 32 | self.fraction as u64
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// Middle 32 bits, the form used in the LSR field of report blocks
    pub fn compact(&self) -> u32 {
        (self.seconds << 16) | (self.fraction >> 16)
    }
}
