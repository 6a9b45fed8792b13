use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

use super::header::H263RtpHeader;
use crate::codec::{Codec, ProcessResult};
use crate::packet::Buffer;

/// Rebuilds H.263 frames from RTP payloads
///
/// Payloads are appended until one arrives with the marker bit. A payload
/// with a new timestamp before the marker was seen means the end of the
/// previous frame was lost; that partial frame is dropped.
#[derive(Debug, Default)]
pub struct H263Depacketizer {
    frame: BytesMut,
    timestamp: Option<u64>,
}

impl H263Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for H263Depacketizer {
    fn name(&self) -> &'static str {
        "h263-depacketizer"
    }

    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> ProcessResult {
        let payload = input.payload();
        let header = match H263RtpHeader::parse(payload) {
            Ok(header) => header,
            Err(e) => {
                warn!("Dropping H.263 payload: {}", e);
                return ProcessResult::Failed;
            }
        };
        if payload.len() < header.total_len() {
            warn!(
                "H.263 payload of {} bytes shorter than its {} byte header",
                payload.len(),
                header.total_len()
            );
            return ProcessResult::Failed;
        }

        if let Some(timestamp) = self.timestamp {
            if timestamp != input.timestamp && !self.frame.is_empty() {
                debug!("Incomplete H.263 frame at {} dropped", timestamp);
                self.frame.clear();
            }
        }
        self.timestamp = Some(input.timestamp);

        if header.p {
            self.frame.put_slice(&[0, 0]);
        }
        self.frame.put_slice(&payload[header.total_len()..]);

        if !input.is_marker() {
            return ProcessResult::OutputNotFilled;
        }

        output.copy_metadata_from(input);
        output.set_data(self.frame.split().freeze());
        self.timestamp = None;
        ProcessResult::Ok
    }

    fn reset(&mut self) {
        self.frame.clear();
        self.timestamp = None;
    }
}
