use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::event::{RtcpEvent, RtcpEventListener};
use crate::packet::rtcp::{
    RtcpCompoundPacket, RtcpGoodbye, RtcpPacket, RtcpReceiverReport, RtcpSourceDescription,
};
use crate::source::RtpSource;
use crate::stats::{ReceptionTracker, StreamCounters, StreamStats};
use crate::{Result, RtpSsrc};

const RTCP_DATAGRAM_SIZE: usize = 1500;

/// Sends the RTCP reports of one session
#[derive(Debug)]
pub struct RtcpPacketTransmitter {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    source: RtpSource,
    stats: StreamCounters,
}

impl RtcpPacketTransmitter {
    pub async fn bind(local: SocketAddr, remote: SocketAddr, source: RtpSource) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        Ok(Self::with_socket(Arc::new(socket), remote, source))
    }

    /// Send from the RTCP receiver's socket for symmetric RTP
    pub fn with_socket(socket: Arc<UdpSocket>, remote: SocketAddr, source: RtpSource) -> Self {
        debug!("RTCP transmitter connected to {}", remote);
        Self {
            socket,
            remote,
            source,
            stats: StreamCounters::new(),
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.snapshot()
    }

    /// The SDES packet carrying our CNAME
    pub fn make_sdes(&self) -> RtcpPacket {
        RtcpPacket::SourceDescription(RtcpSourceDescription::with_cname(
            self.source.ssrc(),
            self.source.cname(),
        ))
    }

    /// Announce our CNAME
    pub async fn send_sdes_packet(&self) -> Result<()> {
        let compound = RtcpCompoundPacket::new(vec![self.make_sdes()]);
        self.send_compound(&compound).await
    }

    /// Leave the session; the BYE goes after an SDES as compound packets require
    pub async fn send_bye_packet(&self, reason: Option<&str>) -> Result<()> {
        let mut bye = RtcpGoodbye::for_source(self.source.ssrc());
        if let Some(reason) = reason {
            bye = bye.with_reason(reason);
        }
        let compound = RtcpCompoundPacket::new(vec![self.make_sdes(), RtcpPacket::Goodbye(bye)]);
        self.send_compound(&compound).await
    }

    /// Report the reception quality of `remote_ssrc`
    pub async fn send_receiver_report(
        &self,
        tracker: &ReceptionTracker,
        remote_ssrc: RtpSsrc,
    ) -> Result<()> {
        let mut report = RtcpReceiverReport::new(self.source.ssrc());
        report.add_report_block(tracker.report_block(remote_ssrc));
        let compound = RtcpCompoundPacket::new(vec![
            RtcpPacket::ReceiverReport(report),
            self.make_sdes(),
        ]);
        self.send_compound(&compound).await
    }

    pub async fn send_compound(&self, compound: &RtcpCompoundPacket) -> Result<()> {
        let data = compound.assemble()?;
        match self.socket.send_to(&data, self.remote).await {
            Ok(_) => {
                self.stats.record(data.len());
                trace!("Sent {} RTCP packets to {}", compound.packets.len(), self.remote);
                Ok(())
            }
            Err(e) => {
                error!("Can't send the RTCP packet to {}: {}", self.remote, e);
                self.stats.record_bad_packet();
                Err(e.into())
            }
        }
    }
}

/// Receives RTCP datagrams and hands their packets to a listener
#[derive(Debug)]
pub struct RtcpPacketReceiver {
    socket: Arc<UdpSocket>,
    stats: Arc<StreamCounters>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RtcpPacketReceiver {
    pub async fn bind(local: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        debug!("RTCP receiver created on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            stats: Arc::new(StreamCounters::new()),
            task: Mutex::new(None),
        })
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.snapshot()
    }

    /// Start the receive loop; a running loop is replaced
    pub fn start(&self, listener: Arc<dyn RtcpEventListener>) {
        let socket = self.socket.clone();
        let stats = self.stats.clone();

        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; RTCP_DATAGRAM_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, source)) => {
                        match dispatch_datagram(&buf[..len], source, listener.as_ref()) {
                            Ok(_) => stats.record(len),
                            Err(e) => {
                                warn!("Can't parse the RTCP packet from {}: {}", source, e);
                                stats.record_bad_packet();
                            }
                        }
                    }
                    Err(e) => {
                        error!("RTCP receive failed: {}", e);
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn close(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            debug!("RTCP receiver closed");
        }
    }
}

impl Drop for RtcpPacketReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parse one datagram and deliver an event per RTCP packet
///
/// Returns the number of events delivered. Nothing is delivered when any
/// packet of the compound fails to parse.
pub fn dispatch_datagram(
    data: &[u8],
    source: SocketAddr,
    listener: &dyn RtcpEventListener,
) -> Result<usize> {
    let compound = RtcpCompoundPacket::parse(data)?;
    let count = compound.packets.len();
    for packet in compound.packets {
        trace!("RTCP {} from {}", packet.packet_type(), source);
        listener.receive_rtcp_event(RtcpEvent::new(packet, source));
    }
    Ok(count)
}
