//! Media pipelines between players/renderers and the RTP transport.
//!
//! A [`MediaRtpSender`] pulls samples from a [`MediaPlayer`], runs them through
//! the encoding [`CodecChain`] for the player's format and sends the result.
//! A [`MediaRtpReceiver`] does the reverse into a [`MediaRenderer`]. Both own
//! one background task per session, started by `start_session` and aborted by
//! `stop_session`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rcs_infra_common::config::RtpSection;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{decoding_chain, encoding_chain, CodecChain};
use crate::error::Error;
use crate::event::RtcpEventListener;
use crate::format::Format;
use crate::packet::Buffer;
use crate::source::RtpSource;
use crate::transport::{
    rtcp_address, RtcpPacketReceiver, RtcpPacketTransmitter, RtpPacketReceiver,
    RtpPacketTransmitter,
};
use crate::Result;

/// A source of media samples
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    fn format(&self) -> Format;

    async fn open(&self) -> Result<()>;

    async fn close(&self);

    async fn start(&self) -> Result<()>;

    async fn stop(&self);

    /// Next sample, `None` once the player has nothing more to give
    async fn read_sample(&self) -> Result<Option<Buffer>>;
}

/// A sink for media samples
#[async_trait]
pub trait MediaRenderer: Send + Sync {
    async fn open(&self) -> Result<()>;

    async fn close(&self);

    async fn start(&self) -> Result<()>;

    async fn stop(&self);

    async fn write_sample(&self, sample: Buffer) -> Result<()>;
}

struct SenderSession {
    player: Arc<dyn MediaPlayer>,
    rtp: Arc<RtpPacketTransmitter>,
    rtcp: Arc<RtcpPacketTransmitter>,
    chain: Option<CodecChain>,
    task: Option<JoinHandle<()>>,
}

/// Sends the samples of a player to a remote RTP port
pub struct MediaRtpSender {
    config: RtpSection,
    source: RtpSource,
    local: SocketAddr,
    sockets: Option<(Arc<UdpSocket>, Arc<UdpSocket>)>,
    session: Mutex<Option<SenderSession>>,
}

impl MediaRtpSender {
    pub fn new(source: RtpSource, config: RtpSection) -> Self {
        Self {
            config,
            source,
            local: SocketAddr::from(([0, 0, 0, 0], 0)),
            sockets: None,
            session: Mutex::new(None),
        }
    }

    /// Send from the receiver's RTP and RTCP sockets (symmetric RTP)
    ///
    /// Ignored when `symmetric_rtp` is off in the configuration.
    pub fn with_sockets(mut self, rtp: Arc<UdpSocket>, rtcp: Arc<UdpSocket>) -> Self {
        self.sockets = Some((rtp, rtcp));
        self
    }

    /// Local address for the sockets created when none are shared
    pub fn with_local_address(mut self, local: SocketAddr) -> Self {
        self.local = local;
        self
    }

    pub fn source(&self) -> &RtpSource {
        &self.source
    }

    /// Open the player and connect to `remote`; RTCP goes to the next port
    pub async fn prepare_session(
        &self,
        player: Arc<dyn MediaPlayer>,
        remote: SocketAddr,
    ) -> Result<()> {
        let format = player.format();
        let rtcp_remote = rtcp_address(remote);

        let shared = self.sockets.as_ref().filter(|_| self.config.symmetric_rtp);
        let (rtp, rtcp) = match shared {
            Some((rtp, rtcp)) => (
                RtpPacketTransmitter::with_socket(rtp.clone(), remote, self.source.clone()),
                RtcpPacketTransmitter::with_socket(rtcp.clone(), rtcp_remote, self.source.clone()),
            ),
            None => (
                RtpPacketTransmitter::bind(self.local, remote, self.source.clone()).await?,
                RtcpPacketTransmitter::bind(self.local, rtcp_remote, self.source.clone()).await?,
            ),
        };

        player.open().await?;
        let chain = encoding_chain(&format, &self.config);
        debug!("Prepared {} sender to {} ({} codecs)", format, remote, chain.len());

        let previous = self.session.lock().replace(SenderSession {
            player,
            rtp: Arc::new(rtp),
            rtcp: Arc::new(rtcp),
            chain: Some(chain),
            task: None,
        });
        if let Some(previous) = previous {
            warn!("Replacing a sender session that was never stopped");
            Self::shutdown(previous).await;
        }
        Ok(())
    }

    /// Announce the source and start pumping samples
    pub async fn start_session(&self) -> Result<()> {
        let (player, rtp, rtcp, chain) = {
            let mut guard = self.session.lock();
            let session = guard.as_mut().ok_or(Error::TransportClosed)?;
            let chain = session
                .chain
                .take()
                .ok_or_else(|| Error::Codec("sender session already started".into()))?;
            (session.player.clone(), session.rtp.clone(), session.rtcp.clone(), chain)
        };

        if let Err(e) = rtcp.send_sdes_packet().await {
            warn!("Can't send the initial SDES: {}", e);
        }
        player.start().await?;

        let format = player.format();
        let task = tokio::spawn(run_sender(player, rtp, chain, format));
        if let Some(session) = self.session.lock().as_mut() {
            session.task = Some(task);
        }
        info!("RTP sender session started for ssrc={:#010x}", self.source.ssrc());
        Ok(())
    }

    /// Stop the pipeline, say BYE and release the player
    pub async fn stop_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            Self::shutdown(session).await;
            info!("RTP sender session stopped for ssrc={:#010x}", self.source.ssrc());
        }
    }

    async fn shutdown(mut session: SenderSession) {
        if let Some(task) = session.task.take() {
            task.abort();
        }
        session.player.stop().await;
        if let Err(e) = session.rtcp.send_bye_packet(None).await {
            warn!("Can't send the RTCP BYE: {}", e);
        }
        session.rtp.close();
        session.player.close().await;
    }
}

async fn run_sender(
    player: Arc<dyn MediaPlayer>,
    rtp: Arc<RtpPacketTransmitter>,
    mut chain: CodecChain,
    format: Format,
) {
    loop {
        let sample = match player.read_sample().await {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                debug!("Player reached the end of its media");
                break;
            }
            Err(e) => {
                error!("Can't read from the player: {}", e);
                break;
            }
        };

        let outputs = match chain.process(sample) {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("Dropping sample: {}", e);
                continue;
            }
        };

        for mut output in outputs {
            if output.format.is_none() {
                output.format = Some(format.clone());
            }
            if let Err(e) = rtp.send_rtp_packet(&output).await {
                warn!("RTP send failed: {}", e);
            }
        }
    }
}

struct ReceiverSession {
    renderer: Arc<dyn MediaRenderer>,
    rtp: Arc<RtpPacketReceiver>,
    rtcp: RtcpPacketReceiver,
    listener: Option<Arc<dyn RtcpEventListener>>,
    chain: Option<CodecChain>,
    task: Option<JoinHandle<()>>,
}

/// Receives RTP on a local port and renders the decoded samples
pub struct MediaRtpReceiver {
    format: Format,
    config: RtpSection,
    session: Mutex<Option<ReceiverSession>>,
}

impl MediaRtpReceiver {
    pub fn new(format: Format, config: RtpSection) -> Self {
        Self {
            format,
            config,
            session: Mutex::new(None),
        }
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Bind RTP on `local` and RTCP on the next port, then open the renderer
    ///
    /// Returns the bound RTP address. A zero port picks ephemeral ports for
    /// both.
    pub async fn prepare_session(
        &self,
        local: SocketAddr,
        renderer: Arc<dyn MediaRenderer>,
        listener: Option<Arc<dyn RtcpEventListener>>,
    ) -> Result<SocketAddr> {
        let rtp = RtpPacketReceiver::bind(local, self.config.default_datagram_size).await?;
        let rtcp_local = if local.port() == 0 {
            local
        } else {
            rtcp_address(local)
        };
        let rtcp = RtcpPacketReceiver::bind(rtcp_local).await?;
        let bound = rtp.local_addr()?;

        renderer.open().await?;
        let chain = decoding_chain(&self.format, &self.config);
        debug!("Prepared {} receiver on {}", self.format, bound);

        let previous = self.session.lock().replace(ReceiverSession {
            renderer,
            rtp: Arc::new(rtp),
            rtcp,
            listener,
            chain: Some(chain),
            task: None,
        });
        if let Some(previous) = previous {
            warn!("Replacing a receiver session that was never stopped");
            Self::shutdown(previous).await;
        }
        Ok(bound)
    }

    /// The RTP and RTCP sockets, for a symmetric sender
    pub fn sockets(&self) -> Option<(Arc<UdpSocket>, Arc<UdpSocket>)> {
        self.session
            .lock()
            .as_ref()
            .map(|session| (session.rtp.socket(), session.rtcp.socket()))
    }

    pub fn rtcp_address(&self) -> Option<SocketAddr> {
        self.session
            .lock()
            .as_ref()
            .and_then(|session| session.rtcp.local_addr().ok())
    }

    pub async fn start_session(&self) -> Result<()> {
        let (renderer, rtp, chain) = {
            let mut guard = self.session.lock();
            let session = guard.as_mut().ok_or(Error::TransportClosed)?;
            let chain = session
                .chain
                .take()
                .ok_or_else(|| Error::Codec("receiver session already started".into()))?;
            if let Some(listener) = &session.listener {
                session.rtcp.start(listener.clone());
            }
            (session.renderer.clone(), session.rtp.clone(), chain)
        };

        renderer.start().await?;
        let task = tokio::spawn(run_receiver(renderer, rtp, chain, self.format.clone()));
        if let Some(session) = self.session.lock().as_mut() {
            session.task = Some(task);
        }
        info!("RTP receiver session started for {}", self.format);
        Ok(())
    }

    pub async fn stop_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            Self::shutdown(session).await;
            info!("RTP receiver session stopped for {}", self.format);
        }
    }

    async fn shutdown(mut session: ReceiverSession) {
        session.rtp.close();
        session.rtcp.close();
        if let Some(task) = session.task.take() {
            task.abort();
        }
        session.renderer.stop().await;
        session.renderer.close().await;
    }
}

async fn run_receiver(
    renderer: Arc<dyn MediaRenderer>,
    rtp: Arc<RtpPacketReceiver>,
    mut chain: CodecChain,
    format: Format,
) {
    loop {
        let mut buffer = match rtp.read_buffer().await {
            Ok(buffer) => buffer,
            Err(Error::TransportClosed) => break,
            Err(e) => {
                error!("RTP receive failed: {}", e);
                break;
            }
        };
        buffer.format = Some(format.clone());

        let samples = match chain.process(buffer) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Dropping RTP payload: {}", e);
                continue;
            }
        };
        for sample in samples {
            if let Err(e) = renderer.write_sample(sample).await {
                warn!("Renderer rejected a sample: {}", e);
            }
        }
    }
}
