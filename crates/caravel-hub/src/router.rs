//! Fan-out — delivers packets from an admitted peer to its audience.
//!
//! Each fan-out runs as its own task, spawned by the serving loop, so a
//! slow receiver cannot block the sender's reads. Within one fan-out,
//! recipients are written sequentially; a failed write is logged and
//! skipped — the failing peer will notice on its own read path and close.

use std::sync::Arc;

use caravel_proto::{DirectPacket, Packet};

use crate::peer::Peer;
use crate::registry::Registry;

/// Deliver a packet to every peer in the snapshot. Native peers get the
/// packet verbatim; a foreign-protocol variant would be translated
/// through its capability methods here.
pub(crate) async fn broadcast(pkt: Packet, peers: Vec<Peer>) {
    for peer in peers {
        match peer {
            Peer::Adc(p) => {
                if let Err(e) = p.send_packet(pkt.clone()).await {
                    tracing::warn!(sid = %p.sid(), error = %e, "dropping broadcast for peer");
                }
            }
        }
    }
}

/// Deliver a packet to its target, or silently drop it if the target is
/// no longer (or not yet) admitted.
pub(crate) async fn direct(registry: Arc<Registry>, pkt: DirectPacket) {
    let Some(peer) = registry.by_sid(pkt.target) else {
        tracing::trace!(target = %pkt.target, "direct packet for unknown SID, dropping");
        return;
    };
    match peer {
        Peer::Adc(p) => {
            if let Err(e) = p.send_packet(Packet::Direct(pkt)).await {
                tracing::warn!(sid = %p.sid(), error = %e, "dropping direct packet for peer");
            }
        }
    }
}
