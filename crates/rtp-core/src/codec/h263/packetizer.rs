use bytes::{BufMut, BytesMut};
use tracing::trace;

use super::header::H263RtpHeader;
use crate::codec::{Codec, ProcessResult};
use crate::packet::Buffer;

/// Splits encoded H.263 frames into RTP payloads
///
/// Every payload gets its own 2-byte header; nothing is written into the
/// caller's frame. The last payload of a frame carries the RTP marker.
#[derive(Debug, Clone)]
pub struct H263Packetizer {
    max_payload_size: usize,
}

impl H263Packetizer {
    /// Smallest payload that still carries picture data
    const MIN_PAYLOAD_SIZE: usize = H263RtpHeader::SIZE + 1;

    /// `max_payload_size` includes the payload header
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            max_payload_size: max_payload_size.max(Self::MIN_PAYLOAD_SIZE),
        }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Codec for H263Packetizer {
    fn name(&self) -> &'static str {
        "h263-packetizer"
    }

    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> ProcessResult {
        let frame = input.payload_bytes();
        if input.is_discard() || frame.is_empty() {
            output.set_discard(true);
            return ProcessResult::OutputNotFilled;
        }

        // A frame opening with a picture start code drops its two zero bytes
        let picture_start = frame.len() >= 2 && frame[0] == 0 && frame[1] == 0;
        let body = if picture_start { frame.slice(2..) } else { frame };

        let chunk_size = self.max_payload_size - H263RtpHeader::SIZE;
        let count = body.len().div_ceil(chunk_size).max(1);
        let mut fragments = Vec::with_capacity(count);

        for index in 0..count {
            let start = index * chunk_size;
            let end = (start + chunk_size).min(body.len());
            let header = if index == 0 && picture_start {
                H263RtpHeader::picture_start()
            } else {
                H263RtpHeader::default()
            };

            let mut payload = BytesMut::with_capacity(H263RtpHeader::SIZE + end - start);
            payload.put_slice(&header.to_bytes());
            payload.put_slice(&body[start..end]);

            let mut fragment = Buffer::from_data(payload.freeze());
            fragment.format = input.format.clone();
            fragment.timestamp = input.timestamp;
            fragment.set_flag(Buffer::FLAG_RTP_TIME, input.has_flag(Buffer::FLAG_RTP_TIME));
            fragment.set_marker(index + 1 == count);
            fragments.push(fragment);
        }

        trace!("H.263 frame of {} bytes split into {} packets", input.length, count);

        output.copy_metadata_from(input);
        output.set_data(bytes::Bytes::new());
        output.fragments = fragments;
        ProcessResult::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(len: usize) -> Buffer {
        let mut data = vec![0u8, 0u8];
        data.extend((0..len - 2).map(|i| (i % 251) as u8 + 1));
        let mut buffer = Buffer::from_data(data);
        buffer.timestamp = 9000;
        buffer
    }

    #[test]
    fn test_small_frame_single_packet() {
        let mut packetizer = H263Packetizer::new(1300);
        let mut output = Buffer::new();
        assert_eq!(packetizer.process(&frame(100), &mut output), ProcessResult::Ok);

        assert_eq!(output.fragments.len(), 1);
        let packet = &output.fragments[0];
        assert_eq!(&packet.payload()[..2], &[0x04, 0x00]);
        // 98 bytes after the start code plus the header
        assert_eq!(packet.length, 100);
        assert!(packet.is_marker());
        assert_eq!(packet.timestamp, 9000);
    }

    #[test]
    fn test_large_frame_is_fragmented() {
        let mut packetizer = H263Packetizer::new(100);
        let input = frame(302);
        let mut output = Buffer::new();
        packetizer.process(&input, &mut output);

        // 300 body bytes in 98-byte chunks
        let fragments = &output.fragments;
        assert_eq!(fragments.len(), 4);
        assert!(fragments.iter().all(|f| f.length <= 100));
        assert_eq!(&fragments[0].payload()[..2], &[0x04, 0x00]);
        for fragment in &fragments[1..] {
            assert_eq!(&fragment.payload()[..2], &[0x00, 0x00]);
        }

        let markers: Vec<bool> = fragments.iter().map(Buffer::is_marker).collect();
        assert_eq!(markers, vec![false, false, false, true]);

        let body: Vec<u8> = fragments.iter().flat_map(|f| f.payload()[2..].to_vec()).collect();
        assert_eq!(&body[..], &input.payload()[2..]);
    }

    #[test]
    fn test_frame_without_start_code() {
        let mut packetizer = H263Packetizer::new(1300);
        let input = Buffer::from_data(&b"\x01\x02\x03"[..]);
        let mut output = Buffer::new();
        packetizer.process(&input, &mut output);
        assert_eq!(output.fragments[0].payload(), &[0x00, 0x00, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_empty_frame_is_discarded() {
        let mut packetizer = H263Packetizer::new(1300);
        let mut output = Buffer::new();
        assert_eq!(
            packetizer.process(&Buffer::new(), &mut output),
            ProcessResult::OutputNotFilled
        );
        assert!(output.is_discard());
    }
}
