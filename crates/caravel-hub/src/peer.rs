//! Peers — admitted sessions and their capability surface.
//!
//! [`Peer`] is a tagged variant rather than a trait object: the router
//! matches on the kind to pick the fast path (same-protocol peers get
//! packets verbatim). A bridge to a sibling protocol would add a second
//! variant here and translate through the capability methods; nothing
//! else in the hub would change.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, Notify};

use caravel_proto::{ChatMessage, Cid, Disconnect, Features, Packet, Sid, User};

use crate::conn::ConnWriter;
use crate::registry::Registry;
use crate::HubError;

/// Client software, as reported in the user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Software {
    pub name: String,
    pub version: String,
}

/// A live admitted session of any protocol kind.
#[derive(Clone)]
pub enum Peer {
    Adc(Arc<AdcPeer>),
}

impl Peer {
    pub fn name(&self) -> String {
        match self {
            Peer::Adc(p) => p.name(),
        }
    }

    pub fn sid(&self) -> Sid {
        match self {
            Peer::Adc(p) => p.sid(),
        }
    }

    pub fn cid(&self) -> Cid {
        match self {
            Peer::Adc(p) => p.cid(),
        }
    }

    /// The cached user record. A foreign-protocol variant would
    /// synthesize one here from its name, software, and address hash.
    pub fn info(&self) -> User {
        match self {
            Peer::Adc(p) => p.info(),
        }
    }

    pub fn software(&self) -> Software {
        match self {
            Peer::Adc(p) => p.software(),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        match self {
            Peer::Adc(p) => p.remote_addr(),
        }
    }

    pub async fn peers_join(&self, peers: &[Peer]) -> Result<(), HubError> {
        match self {
            Peer::Adc(p) => p.peers_join(peers).await,
        }
    }

    pub async fn peers_leave(&self, peers: &[Peer]) -> Result<(), HubError> {
        match self {
            Peer::Adc(p) => p.peers_leave(peers).await,
        }
    }

    pub async fn chat_msg(&self, from: &Peer, text: &str) -> Result<(), HubError> {
        match self {
            Peer::Adc(p) => p.chat_msg(from.sid(), text).await,
        }
    }

    pub async fn private_msg(&self, from: &Peer, text: &str) -> Result<(), HubError> {
        match self {
            Peer::Adc(p) => p.private_msg(from.sid(), text).await,
        }
    }

    pub async fn hub_chat_msg(&self, text: &str) -> Result<(), HubError> {
        match self {
            Peer::Adc(p) => p.hub_chat_msg(text).await,
        }
    }

    pub async fn close(&self) {
        match self {
            Peer::Adc(p) => p.close().await,
        }
    }
}

struct PeerState {
    user: User,
    closed: bool,
}

/// A native ADC session: its write half, its cached user record, and its
/// place in the registry.
pub struct AdcPeer {
    registry: Arc<Registry>,
    addr: SocketAddr,
    sid: Sid,
    cid: Cid,
    features: Features,
    state: RwLock<PeerState>,
    writer: Mutex<ConnWriter>,
    close_signal: Notify,
}

impl AdcPeer {
    pub(crate) fn new(
        registry: Arc<Registry>,
        addr: SocketAddr,
        sid: Sid,
        cid: Cid,
        features: Features,
        user: User,
        writer: ConnWriter,
    ) -> Arc<AdcPeer> {
        Arc::new(AdcPeer {
            registry,
            addr,
            sid,
            cid,
            features,
            state: RwLock::new(PeerState {
                user,
                closed: false,
            }),
            writer: Mutex::new(writer),
            close_signal: Notify::new(),
        })
    }

    pub fn sid(&self) -> Sid {
        self.sid
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The features negotiated for this session during the Protocol stage.
    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn name(&self) -> String {
        self.state.read().user.name.clone()
    }

    pub fn info(&self) -> User {
        self.state.read().user.clone()
    }

    pub fn software(&self) -> Software {
        let st = self.state.read();
        Software {
            name: st.user.application.clone(),
            version: st.user.version.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Resolves once `close` has begun. The serving loop selects on this
    /// so an administrative close unblocks its pending read.
    pub(crate) async fn closed(&self) {
        self.close_signal.notified().await
    }

    /// Write one packet and flush. Fan-out writes land here, one task at
    /// a time through the writer mutex.
    pub(crate) async fn send_packet(&self, pkt: Packet) -> Result<(), HubError> {
        let mut w = self.writer.lock().await;
        w.feed_packet(pkt).await?;
        w.flush().await
    }

    /// Announce `peers` to this peer: one SID-tagged `INF` broadcast per
    /// entry, then a single flush.
    pub async fn peers_join(&self, peers: &[Peer]) -> Result<(), HubError> {
        let mut w = self.writer.lock().await;
        for peer in peers {
            w.feed_broadcast(peer.sid(), &peer.info()).await?;
        }
        w.flush().await
    }

    /// Announce departures: one `QUI` per entry, then a single flush.
    pub async fn peers_leave(&self, peers: &[Peer]) -> Result<(), HubError> {
        let mut w = self.writer.lock().await;
        for peer in peers {
            w.feed_info_msg(&Disconnect { sid: peer.sid() }).await?;
        }
        w.flush().await
    }

    pub async fn chat_msg(&self, from: Sid, text: &str) -> Result<(), HubError> {
        let mut w = self.writer.lock().await;
        w.feed_broadcast(
            from,
            &ChatMessage {
                text: text.to_string(),
            },
        )
        .await?;
        w.flush().await
    }

    pub async fn private_msg(&self, from: Sid, text: &str) -> Result<(), HubError> {
        let mut w = self.writer.lock().await;
        w.feed_direct(
            from,
            self.sid,
            &ChatMessage {
                text: text.to_string(),
            },
        )
        .await?;
        w.flush().await
    }

    /// A hub-originated chat line (no originator SID).
    pub async fn hub_chat_msg(&self, text: &str) -> Result<(), HubError> {
        let mut w = self.writer.lock().await;
        w.feed_info_msg(&ChatMessage {
            text: text.to_string(),
        })
        .await?;
        w.flush().await
    }

    /// Tear the session down. Idempotent and safe to call concurrently
    /// from the serving loop and an administrative path.
    ///
    /// Order matters: mark closed under the peer's own lock (released
    /// before any registry work), wake the serving loop, shut the wire,
    /// then remove from the registry and notify the remaining peers from
    /// the value-copied snapshot.
    pub async fn close(self: &Arc<Self>) {
        {
            let mut st = self.state.write();
            if st.closed {
                return;
            }
            st.closed = true;
        }
        self.close_signal.notify_one();

        {
            let mut w = self.writer.lock().await;
            if let Err(e) = w.shutdown().await {
                tracing::debug!(sid = %self.sid, error = %e, "wire close failed");
            }
        }

        let me = Peer::Adc(self.clone());
        let remaining = self.registry.remove(&me);
        for peer in &remaining {
            if let Err(e) = peer.peers_leave(std::slice::from_ref(&me)).await {
                tracing::warn!(
                    sid = %peer.sid(),
                    error = %e,
                    "failed to deliver departure notice"
                );
            }
        }
        tracing::info!(sid = %self.sid, name = %self.name(), "peer departed");
    }
}
