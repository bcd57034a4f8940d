//! Connection handshake — Protocol and Identity stages.
//!
//! A fresh connection is driven through feature negotiation and SID
//! assignment (Protocol), then identity binding (Identity). Only after
//! the roster catch-up has been flushed is the peer admitted into the
//! registry, so no other peer can route to it before its client knows
//! who is in the room.
//!
//! Each expected inbound packet is bounded by a 5-second read deadline.
//! Any failure closes the connection; failures that carry an ADC status
//! code (21, 22, 24, 27) get a best-effort fatal `STA` first.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use caravel_proto::{
    Cid, Feature, Features, Packet, Severity, Sid, SidAssign, Status, Supported, User,
};

use crate::conn::{Conn, ConnReader};
use crate::hub::Hub;
use crate::peer::{AdcPeer, Peer};
use crate::registry::{IdentityConflict, Registry};
use crate::HubError;

/// Read deadline for each expected handshake packet.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection past the Protocol stage: it holds a SID but is invisible
/// to the registry until admission.
pub(crate) struct PendingPeer {
    pub addr: SocketAddr,
    pub sid: Sid,
    pub features: Features,
    pub conn: Conn,
}

/// Protocol stage: `SUP` in, `SUP` + `SID` out.
pub(crate) async fn protocol_stage(hub: &Hub, mut conn: Conn) -> Result<PendingPeer, HubError> {
    let info = match conn.read_packet(Some(HANDSHAKE_TIMEOUT)).await? {
        Packet::Info(info) => info,
        other => {
            return Err(HubError::Protocol(format!(
                "expected hub message, got {:?}",
                other.cmd()
            )))
        }
    };
    let sup: Supported = info.decode()?;

    let mutual = hub.features().intersect(&sup.features);
    if !mutual.is_set(Feature::BASE) && !mutual.is_set(Feature::BAS0) {
        return Err(HubError::Feature("client does not support BASE".into()));
    }
    if !mutual.is_set(Feature::TIGR) {
        return Err(HubError::Feature("client does not support TIGR".into()));
    }

    conn.write_info_msg(&Supported {
        features: hub.features(),
    })
    .await?;
    let sid = hub.next_sid();
    conn.write_info_msg(&SidAssign { sid }).await?;
    conn.flush().await?;

    tracing::debug!(%sid, addr = %conn.remote_addr(), "protocol stage complete");
    Ok(PendingPeer {
        addr: conn.remote_addr(),
        sid,
        features: mutual,
        conn,
    })
}

/// Identity stage: verify the claimed identity, reserve it, stream the
/// roster, and admit. Returns the admitted peer and the read half for
/// the serving loop.
pub(crate) async fn identity_stage(
    hub: &Arc<Hub>,
    mut pending: PendingPeer,
) -> Result<(Arc<AdcPeer>, ConnReader), HubError> {
    let b = match pending.conn.read_packet(Some(HANDSHAKE_TIMEOUT)).await? {
        Packet::Broadcast(b) => b,
        other => {
            return Err(HubError::Protocol(format!(
                "expected user info broadcast, got {:?}",
                other.cmd()
            )))
        }
    };
    if b.id != pending.sid {
        return Err(HubError::Protocol("malformed broadcast".into()));
    }
    let mut user: User = b.decode()?;

    // The client must prove it owns the CID it claims.
    let cid = match (user.id, user.pid) {
        (Some(id), Some(pid)) if pid.cid() == id => id,
        _ => {
            send_fatal(&mut pending.conn, 27, "invalid pid supplied").await;
            return Err(HubError::Identity("invalid pid supplied".into()));
        }
    };
    user.pid = None;

    if user.name.is_empty() {
        send_fatal(&mut pending.conn, 21, "invalid nick").await;
        return Err(HubError::Identity("invalid nick".into()));
    }

    match hub.registry().reserve_identity(&user.name, cid) {
        Ok(()) => {}
        Err(IdentityConflict::NickTaken) => {
            send_fatal(&mut pending.conn, 22, "nick is taken").await;
            return Err(HubError::NickTaken);
        }
        Err(IdentityConflict::CidTaken) => {
            send_fatal(&mut pending.conn, 24, "CID is taken").await;
            return Err(HubError::CidTaken);
        }
    }
    // From here on, any failure must give the nick and CID back.
    let mut reservation = ReservationGuard {
        registry: hub.registry(),
        name: user.name.clone(),
        cid,
        armed: true,
    };

    if user.ip4.is_empty() && user.ip6.is_empty() {
        match pending.addr.ip() {
            IpAddr::V4(ip) => user.ip4 = ip.to_string(),
            IpAddr::V6(ip) => user.ip6 = ip.to_string(),
        }
    }

    pending.conn.write_info_msg(&hub.hub_info()).await?;
    pending
        .conn
        .write_info_msg(&Status {
            severity: Severity::Success,
            code: 0,
            message: "powered by caravel".into(),
        })
        .await?;

    // Roster catch-up, then the joiner's own record, in one flush.
    let roster = hub.registry().snapshot();
    for peer in &roster {
        pending.conn.write_broadcast(peer.sid(), &peer.info()).await?;
    }
    pending.conn.write_broadcast(pending.sid, &user).await?;
    pending.conn.flush().await?;

    let name = user.name.clone();
    let (reader, writer) = pending.conn.split();
    let peer = AdcPeer::new(
        hub.registry().clone(),
        pending.addr,
        pending.sid,
        cid,
        pending.features,
        user,
        writer,
    );

    // Admission clears the reservation and inserts in one exclusive
    // acquisition; the guard has nothing left to release.
    reservation.armed = false;
    let snapshot = hub.registry().admit(Peer::Adc(peer.clone()));

    // Announce the join off the accept path; a slow recipient must not
    // delay this client entering its serving loop.
    let joined = Peer::Adc(peer.clone());
    tokio::spawn(async move {
        for other in &snapshot {
            if let Err(e) = other.peers_join(std::slice::from_ref(&joined)).await {
                tracing::warn!(sid = %other.sid(), error = %e, "failed to announce join");
            }
        }
    });

    tracing::info!(sid = %peer.sid(), name, addr = %peer.remote_addr(), "peer admitted");
    Ok((peer, reader))
}

async fn send_fatal(conn: &mut Conn, code: u8, message: &str) {
    let status = Status {
        severity: Severity::Fatal,
        code,
        message: message.to_string(),
    };
    // best effort; the connection is being torn down anyway
    if conn.write_info_msg(&status).await.is_ok() {
        let _ = conn.flush().await;
    }
}

struct ReservationGuard<'a> {
    registry: &'a Arc<Registry>,
    name: String,
    cid: Cid,
    armed: bool,
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release_reservation(&self.name, &self.cid);
        }
    }
}
