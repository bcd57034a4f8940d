//! The hub — composition root and per-connection serving loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::net::SocketAddr;
use std::sync::Arc;

use caravel_proto::{Command, Feature, Features, HubInfo, Packet, Sid};

use crate::config::HubConfig;
use crate::conn::{Conn, ConnReader, Wire};
use crate::handshake;
use crate::peer::{AdcPeer, Peer};
use crate::registry::Registry;
use crate::{router, HubError};

/// Commands a client may not inject through Broadcast/Direct/Echo
/// envelopes: identity, status, and session-control traffic is the hub's
/// to originate.
const PRIVILEGED: [Command; 5] = [
    Command::INF,
    Command::STA,
    Command::SUP,
    Command::SID,
    Command::QUI,
];

pub struct Hub {
    config: HubConfig,
    registry: Arc<Registry>,
    next_sid: AtomicU32,
}

impl Hub {
    pub fn new(config: HubConfig) -> Arc<Hub> {
        Arc::new(Hub {
            config,
            registry: Arc::new(Registry::new()),
            // SIDs start at 1; AAAA stays unused
            next_sid: AtomicU32::new(1),
        })
    }

    /// The feature set this hub advertises.
    pub fn features(&self) -> Features {
        Features::new()
            .with(Feature::BASE)
            .with(Feature::BAS0)
            .with(Feature::TIGR)
            .with(Feature::PING)
    }

    /// Hub metadata sent once on admission.
    pub fn hub_info(&self) -> HubInfo {
        HubInfo {
            name: self.config.hub.name.clone(),
            version: version(),
            desc: self.config.hub.desc.clone(),
        }
    }

    pub(crate) fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// A fresh SID. The monotonic counter never hands the same value out
    /// twice within a hub lifetime, so concurrent Protocol stages cannot
    /// collide.
    pub(crate) fn next_sid(&self) -> Sid {
        Sid(self.next_sid.fetch_add(1, Ordering::Relaxed))
    }

    /// Value snapshot of the admitted peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.registry.snapshot()
    }

    /// Drive one accepted connection: handshake, MOTD, serving loop,
    /// teardown. Returns after the connection ends; the caller decides
    /// what to log.
    pub async fn serve(self: Arc<Self>, io: impl Wire + 'static, addr: SocketAddr) -> Result<(), HubError> {
        tracing::debug!(%addr, "connection accepted");
        let conn = Conn::new(io, addr);
        let pending = handshake::protocol_stage(&self, conn).await?;
        let (peer, reader) = handshake::identity_stage(&self, pending).await?;

        let result = async {
            peer.hub_chat_msg(&self.config.hub.motd).await?;
            self.serve_peer(&peer, reader).await
        }
        .await;

        peer.close().await;
        result
    }

    /// Normal stage: read packets without a deadline until end-of-stream,
    /// fanning each one out according to its envelope.
    async fn serve_peer(
        self: &Arc<Self>,
        peer: &Arc<AdcPeer>,
        mut reader: ConnReader,
    ) -> Result<(), HubError> {
        loop {
            tokio::select! {
                _ = peer.closed() => return Ok(()),
                item = reader.next_packet() => {
                    let pkt = match item {
                        None => return Ok(()),
                        Some(Err(e)) => return Err(e),
                        Some(Ok(pkt)) => pkt,
                    };
                    tracing::trace!(sid = %peer.sid(), cmd = %pkt.cmd(), "packet");
                    self.route_packet(peer, pkt).await?;
                }
            }
        }
    }

    async fn route_packet(self: &Arc<Self>, peer: &Arc<AdcPeer>, pkt: Packet) -> Result<(), HubError> {
        match pkt {
            Packet::Broadcast(b) => {
                if b.id != peer.sid() {
                    return Err(HubError::Protocol("malformed broadcast".into()));
                }
                if PRIVILEGED.contains(&b.cmd) {
                    tracing::debug!(sid = %peer.sid(), cmd = %b.cmd, "dropping privileged broadcast");
                    return Ok(());
                }
                let peers = self.peers();
                tokio::spawn(router::broadcast(Packet::Broadcast(b), peers));
            }
            Packet::Echo(e) => {
                if e.id != peer.sid() {
                    return Err(HubError::Protocol("malformed echo packet".into()));
                }
                if PRIVILEGED.contains(&e.cmd) {
                    tracing::debug!(sid = %peer.sid(), cmd = %e.cmd, "dropping privileged echo");
                    return Ok(());
                }
                // write-back to the originator, then route like a direct
                peer.send_packet(Packet::Echo(e.clone())).await?;
                tokio::spawn(router::direct(self.registry.clone(), e.into()));
            }
            Packet::Direct(d) => {
                if d.id != peer.sid() {
                    return Err(HubError::Protocol("malformed direct packet".into()));
                }
                if PRIVILEGED.contains(&d.cmd) {
                    tracing::debug!(sid = %peer.sid(), cmd = %d.cmd, "dropping privileged direct");
                    return Ok(());
                }
                tokio::spawn(router::direct(self.registry.clone(), d));
            }
            Packet::Info(i) => {
                tracing::debug!(sid = %peer.sid(), cmd = %i.cmd, "ignoring hub-bound packet");
            }
        }
        Ok(())
    }
}

/// The software version reported in hub metadata.
pub fn version() -> String {
    format!("caravel/{}", env!("CARGO_PKG_VERSION"))
}
