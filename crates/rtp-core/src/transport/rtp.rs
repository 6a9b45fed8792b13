use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, error, trace, warn};

use crate::error::Error;
use crate::packet::{Buffer, RtpPacket};
use crate::source::RtpSource;
use crate::stats::{ReceptionTracker, StreamCounters, StreamStats};
use crate::{Result, RtpSequenceNumber, KEEP_ALIVE_PAYLOAD_TYPE};

// Receive size for payload types that carry video or dynamic formats
const LARGE_DATAGRAM_SIZE: usize = 64_000;

/// Sends the RTP packets of one stream
#[derive(Debug)]
pub struct RtpPacketTransmitter {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    source: RtpSource,
    sequence_number: Mutex<RtpSequenceNumber>,
    stats: StreamCounters,
    closed: AtomicBool,
}

impl RtpPacketTransmitter {
    /// Send from a new socket bound to `local`
    pub async fn bind(local: SocketAddr, remote: SocketAddr, source: RtpSource) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        Ok(Self::with_socket(Arc::new(socket), remote, source))
    }

    /// Send from an existing socket, usually the receiver's for symmetric RTP
    pub fn with_socket(socket: Arc<UdpSocket>, remote: SocketAddr, source: RtpSource) -> Self {
        debug!("RTP transmitter for ssrc={:#010x} connected to {}", source.ssrc(), remote);
        Self {
            socket,
            remote,
            source,
            sequence_number: Mutex::new(rand::thread_rng().gen()),
            stats: StreamCounters::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &RtpSource {
        &self.source
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.snapshot()
    }

    /// Packetize `buffer` with the next sequence number and send it
    pub async fn send_rtp_packet(&self, buffer: &Buffer) -> Result<()> {
        let format = buffer
            .format
            .as_ref()
            .ok_or_else(|| Error::InvalidPacket("media buffer without a format".into()))?;

        let timestamp = if buffer.has_flag(Buffer::FLAG_RTP_TIME) {
            buffer.timestamp as u32
        } else {
            media_to_rtp_time(buffer.timestamp, format.clock_rate)
        };

        let sequence_number = {
            let mut seq = self.sequence_number.lock();
            let current = *seq;
            *seq = seq.wrapping_add(1);
            current
        };

        let packet = RtpPacket::new(
            format.payload_type,
            sequence_number,
            timestamp,
            self.source.ssrc(),
            buffer.payload_bytes(),
        )
        .with_marker(buffer.is_marker());

        self.send_packet(&packet).await
    }

    /// Send an already built packet
    pub async fn send_packet(&self, packet: &RtpPacket) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::TransportClosed);
        }

        let data = packet.assemble();
        match self.socket.send_to(&data, self.remote).await {
            Ok(_) => {
                self.stats.record(data.len());
                trace!(
                    "Sent RTP seq={} ts={} ({} bytes) to {}",
                    packet.sequence_number,
                    packet.timestamp,
                    data.len(),
                    self.remote
                );
                Ok(())
            }
            Err(e) => {
                error!("Can't send the RTP packet to {}: {}", self.remote, e);
                self.stats.record_bad_packet();
                Err(e.into())
            }
        }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("RTP transmitter for ssrc={:#010x} closed", self.source.ssrc());
        }
    }
}

/// Receives the RTP packets of one stream
#[derive(Debug)]
pub struct RtpPacketReceiver {
    socket: Arc<UdpSocket>,
    datagram_size: AtomicUsize,
    datagram_size_set: AtomicBool,
    stats: StreamCounters,
    tracker: ReceptionTracker,
    closed: AtomicBool,
    shutdown: Notify,
}

impl RtpPacketReceiver {
    pub async fn bind(local: SocketAddr, datagram_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        debug!("RTP receiver created on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            datagram_size: AtomicUsize::new(datagram_size),
            datagram_size_set: AtomicBool::new(false),
            stats: StreamCounters::new(),
            tracker: ReceptionTracker::new(),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    /// The listening socket, shared with a transmitter for symmetric RTP
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.snapshot()
    }

    pub fn reception(&self) -> &ReceptionTracker {
        &self.tracker
    }

    pub fn datagram_size(&self) -> usize {
        self.datagram_size.load(Ordering::Relaxed)
    }

    /// Wait for the next media packet
    ///
    /// Keep-alive packets (payload type 12) and datagrams that do not parse
    /// are skipped; the latter are counted as bad packets.
    pub async fn read_rtp_packet(&self) -> Result<RtpPacket> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::TransportClosed);
            }

            let mut buf = vec![0u8; self.datagram_size()];
            let (len, source) = tokio::select! {
                result = self.socket.recv_from(&mut buf) => result?,
                _ = self.shutdown.notified() => return Err(Error::TransportClosed),
            };
            buf.truncate(len);

            match RtpPacket::parse(Bytes::from(buf)) {
                Ok(packet) if packet.payload_type == KEEP_ALIVE_PAYLOAD_TYPE => {
                    trace!("Dropping RTP keep-alive from {}", source);
                }
                Ok(mut packet) => {
                    packet.set_received_at(Instant::now());
                    self.stats.record(len);
                    self.tracker.update(packet.sequence_number);
                    self.adjust_datagram_size(packet.payload_type);
                    return Ok(packet);
                }
                Err(e) => {
                    warn!("Can't parse the RTP packet from {}: {}", source, e);
                    self.stats.record_bad_packet();
                }
            }
        }
    }

    /// Wait for the next packet and convert it into a media buffer
    pub async fn read_buffer(&self) -> Result<Buffer> {
        let packet = self.read_rtp_packet().await?;
        let mut buffer = Buffer::from_data(packet.payload_bytes());
        buffer.sequence_number = packet.sequence_number as u64;
        buffer.timestamp = packet.timestamp as u64;
        buffer.set_flag(Buffer::FLAG_RTP_TIME, true);
        buffer.set_marker(packet.marker);
        Ok(buffer)
    }

    // Raise the receive size once, from the first packet's payload type
    fn adjust_datagram_size(&self, payload_type: u8) {
        if self.datagram_size_set.swap(true, Ordering::AcqRel) {
            return;
        }
        let large = matches!(payload_type, 14 | 26 | 31 | 32 | 34 | 42 | 96..=127);
        if large && self.datagram_size() < LARGE_DATAGRAM_SIZE {
            debug!("Receive size raised to {} for payload type {}", LARGE_DATAGRAM_SIZE, payload_type);
            self.datagram_size.store(LARGE_DATAGRAM_SIZE, Ordering::Relaxed);
        }
    }

    /// Stop reading; a pending `read_rtp_packet` returns `TransportClosed`
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.notify_waiters();
            debug!("RTP receiver closed");
        }
    }
}

// RTP timestamps wrap, so the truncation to 32 bits is intended
fn media_to_rtp_time(millis: u64, clock_rate: u32) -> u32 {
    (u128::from(millis) * u128::from(clock_rate) / 1000) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use std::time::Duration;

    async fn pair() -> (RtpPacketReceiver, RtpPacketTransmitter) {
        let receiver = RtpPacketReceiver::bind("127.0.0.1:0".parse().unwrap(), 4096)
            .await
            .unwrap();
        let remote = receiver.local_addr().unwrap();
        let transmitter = RtpPacketTransmitter::bind(
            "127.0.0.1:0".parse().unwrap(),
            remote,
            RtpSource::with_ssrc(0x1234_5678, "test@localhost"),
        )
        .await
        .unwrap();
        (receiver, transmitter)
    }

    #[tokio::test]
    async fn test_send_and_receive_buffer() {
        let (receiver, transmitter) = pair().await;

        let mut buffer = Buffer::from_data(&b"frame"[..]);
        buffer.format = Some(Format::h263_2000(97));
        buffer.timestamp = 3000;
        buffer.set_flag(Buffer::FLAG_RTP_TIME, true);
        buffer.set_marker(true);
        transmitter.send_rtp_packet(&buffer).await.unwrap();

        let packet = receiver.read_rtp_packet().await.unwrap();
        assert_eq!(packet.payload(), b"frame");
        assert_eq!(packet.payload_type, 97);
        assert_eq!(packet.timestamp, 3000);
        assert_eq!(packet.ssrc, 0x1234_5678);
        assert!(packet.marker);
        assert!(packet.received_at().is_some());

        assert_eq!(transmitter.stats().packets, 1);
        assert_eq!(receiver.stats().packets, 1);
        assert_eq!(receiver.stats().bytes, 17);
        assert_eq!(receiver.datagram_size(), LARGE_DATAGRAM_SIZE);
    }

    #[tokio::test]
    async fn test_sequence_numbers_increase() {
        let (receiver, transmitter) = pair().await;
        let mut buffer = Buffer::from_data(&b"x"[..]);
        buffer.format = Some(Format::pcmu());

        transmitter.send_rtp_packet(&buffer).await.unwrap();
        transmitter.send_rtp_packet(&buffer).await.unwrap();

        let first = receiver.read_rtp_packet().await.unwrap();
        let second = receiver.read_rtp_packet().await.unwrap();
        assert_eq!(second.sequence_number, first.sequence_number.wrapping_add(1));
        assert_eq!(receiver.datagram_size(), 4096);
    }

    #[test]
    fn test_media_time_conversion_wraps() {
        assert_eq!(media_to_rtp_time(20, 8_000), 160);
        assert_eq!(media_to_rtp_time(1_000, 90_000), 90_000);
        let expected = (u128::from(u64::MAX) * 90_000 / 1000) as u32;
        assert_eq!(media_to_rtp_time(u64::MAX, 90_000), expected);
    }

    #[tokio::test]
    async fn test_media_time_converted_to_clock_rate() {
        let (receiver, transmitter) = pair().await;
        let mut buffer = Buffer::from_data(&b"x"[..]);
        buffer.format = Some(Format::pcmu());
        buffer.timestamp = 20;

        transmitter.send_rtp_packet(&buffer).await.unwrap();
        assert_eq!(receiver.read_rtp_packet().await.unwrap().timestamp, 160);
    }

    #[tokio::test]
    async fn test_keep_alive_and_garbage_skipped() {
        let (receiver, transmitter) = pair().await;
        let remote = receiver.local_addr().unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let keep_alive = RtpPacket::new(KEEP_ALIVE_PAYLOAD_TYPE, 1, 0, 1, Bytes::new()).assemble();
        raw.send_to(&keep_alive, remote).await.unwrap();
        raw.send_to(b"junk", remote).await.unwrap();

        let media = RtpPacket::new(0, 9, 0, 1, Bytes::from_static(b"ok"));
        transmitter.send_packet(&media).await.unwrap();

        let packet = receiver.read_rtp_packet().await.unwrap();
        assert_eq!(packet.payload(), b"ok");
        assert_eq!(receiver.stats().bad_packets, 1);
        assert_eq!(receiver.stats().packets, 1);
    }

    #[tokio::test]
    async fn test_close_unblocks_reader() {
        let (receiver, _transmitter) = pair().await;
        let receiver = Arc::new(receiver);

        let reader = {
            let receiver = receiver.clone();
            tokio::spawn(async move { receiver.read_rtp_packet().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        receiver.close();

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::TransportClosed)));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (_receiver, transmitter) = pair().await;
        transmitter.close();
        let packet = RtpPacket::new(0, 0, 0, 0, Bytes::new());
        assert!(matches!(
            transmitter.send_packet(&packet).await,
            Err(Error::TransportClosed)
        ));
    }
}
