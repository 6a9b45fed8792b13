//! Per-stream counters for the RTP and RTCP transmitters and receivers.
//!
//! Counters are atomics so the socket task can update them while the owning
//! session reads a [`StreamStats`] snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::packet::rtcp::RtcpReportBlock;
use crate::{RtpSequenceNumber, RtpSsrc};

/// Snapshot of one direction of a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Packets sent or accepted
    pub packets: u64,

    /// Bytes sent or accepted, headers included
    pub bytes: u64,

    /// Datagrams that could not be parsed or sent
    pub bad_packets: u64,
}

/// Live counters behind a [`StreamStats`]
#[derive(Debug, Default)]
pub struct StreamCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
    bad_packets: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, len: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_bad_packet(&self) {
        self.bad_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            bad_packets: self.bad_packets.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct SequenceState {
    base_seq: u32,
    max_seq: u16,
    cycles: u32,
    received: u32,
    started: bool,
    expected_prior: u32,
    received_prior: u32,
}

/// Sequence tracking of a received stream (RFC 3550 Appendix A.1, simplified)
#[derive(Debug, Default)]
pub struct ReceptionTracker {
    state: Mutex<SequenceState>,
}

impl ReceptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, seq: RtpSequenceNumber) {
        let mut state = self.state.lock();
        if !state.started {
            state.started = true;
            state.base_seq = seq as u32;
            state.max_seq = seq;
        } else if seq.wrapping_sub(state.max_seq) < 0x8000 {
            if seq < state.max_seq {
                state.cycles += 1 << 16;
            }
            state.max_seq = seq;
        }
        state.received += 1;
    }

    /// Highest sequence number seen, extended with the wrap count
    pub fn extended_highest(&self) -> u32 {
        let state = self.state.lock();
        state.cycles + state.max_seq as u32
    }

    pub fn expected(&self) -> u32 {
        let state = self.state.lock();
        if !state.started {
            return 0;
        }
        (state.cycles + state.max_seq as u32) - state.base_seq + 1
    }

    pub fn received(&self) -> u32 {
        self.state.lock().received
    }

    /// Build a report block and start a new reporting interval
    pub fn report_block(&self, ssrc: RtpSsrc) -> RtcpReportBlock {
        let mut state = self.state.lock();
        let extended = state.cycles + state.max_seq as u32;
        let expected = if state.started {
            extended - state.base_seq + 1
        } else {
            0
        };

        let mut block = RtcpReportBlock::new(ssrc);
        block.highest_seq = extended;
        block.set_loss(
            expected - state.expected_prior,
            state.received - state.received_prior,
        );
        block.cumulative_lost = expected.saturating_sub(state.received).min(0x00ff_ffff);

        state.expected_prior = expected;
        state.received_prior = state.received;
        block
    }
}
