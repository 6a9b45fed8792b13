use std::net::SocketAddr;

use crate::packet::rtcp::{
    RtcpApplicationDefined, RtcpGoodbye, RtcpPacket, RtcpPacketType, RtcpReceiverReport,
    RtcpSenderReport, RtcpSourceDescription,
};

/// An RTCP packet delivered to the session that owns the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpEvent {
    SenderReport {
        report: RtcpSenderReport,
        source: SocketAddr,
    },
    ReceiverReport {
        report: RtcpReceiverReport,
        source: SocketAddr,
    },
    Sdes {
        description: RtcpSourceDescription,
        source: SocketAddr,
    },
    Bye {
        goodbye: RtcpGoodbye,
        source: SocketAddr,
    },
    App {
        packet: RtcpApplicationDefined,
        source: SocketAddr,
    },
}

impl RtcpEvent {
    pub fn new(packet: RtcpPacket, source: SocketAddr) -> Self {
        match packet {
            RtcpPacket::SenderReport(report) => RtcpEvent::SenderReport { report, source },
            RtcpPacket::ReceiverReport(report) => RtcpEvent::ReceiverReport { report, source },
            RtcpPacket::SourceDescription(description) => RtcpEvent::Sdes { description, source },
            RtcpPacket::Goodbye(goodbye) => RtcpEvent::Bye { goodbye, source },
            RtcpPacket::ApplicationDefined(packet) => RtcpEvent::App { packet, source },
        }
    }

    pub fn packet_type(&self) -> RtcpPacketType {
        match self {
            RtcpEvent::SenderReport { .. } => RtcpPacketType::SenderReport,
            RtcpEvent::ReceiverReport { .. } => RtcpPacketType::ReceiverReport,
            RtcpEvent::Sdes { .. } => RtcpPacketType::SourceDescription,
            RtcpEvent::Bye { .. } => RtcpPacketType::Goodbye,
            RtcpEvent::App { .. } => RtcpPacketType::ApplicationDefined,
        }
    }

    pub fn source(&self) -> SocketAddr {
        match self {
            RtcpEvent::SenderReport { source, .. }
            | RtcpEvent::ReceiverReport { source, .. }
            | RtcpEvent::Sdes { source, .. }
            | RtcpEvent::Bye { source, .. }
            | RtcpEvent::App { source, .. } => *source,
        }
    }
}

/// Receives the RTCP traffic of a session
///
/// Called from the receiver task; implementations should hand the event off
/// rather than block.
pub trait RtcpEventListener: Send + Sync {
    fn receive_rtcp_event(&self, event: RtcpEvent);
}
