//! Peer registry — the hub-wide table of who is here.
//!
//! Five tables live under ONE readers-writer lock: three indices for
//! admitted peers (by SID, by CID, by name) and two reservation sets for
//! peers that have passed the Identity uniqueness check but are not yet
//! admitted. Reservations keep a half-initialized peer invisible to
//! routing while still blocking its nick and CID from being claimed twice.
//!
//! The lock is synchronous and never held across an await point. Every
//! snapshot handed out is value-copied, so fan-out over a snapshot cannot
//! deadlock with a recipient's `close` re-entering the registry.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use caravel_proto::{Cid, Sid};

use crate::peer::Peer;

/// Which uniqueness check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityConflict {
    NickTaken,
    CidTaken,
}

#[derive(Default)]
struct Tables {
    by_sid: HashMap<Sid, Peer>,
    by_cid: HashMap<Cid, Peer>,
    by_name: HashMap<String, Peer>,
    logging: HashSet<String>,
    logging_cid: HashSet<Cid>,
}

impl Tables {
    fn name_conflict(&self, name: &str) -> bool {
        self.logging.contains(name) || self.by_name.contains_key(name)
    }

    fn cid_conflict(&self, cid: &Cid) -> bool {
        self.logging_cid.contains(cid) || self.by_cid.contains_key(cid)
    }

    fn admitted(&self) -> Vec<Peer> {
        self.by_sid.values().cloned().collect()
    }
}

#[derive(Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Value-copied list of all admitted peers.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.tables.read().admitted()
    }

    pub fn by_sid(&self, sid: Sid) -> Option<Peer> {
        self.tables.read().by_sid.get(&sid).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_sid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve a nick and CID for a peer in the Identity stage.
    ///
    /// Two passes: an optimistic check under the shared lock rejects the
    /// common duplicate without serializing the hub; the re-check under
    /// the exclusive lock closes the race between two concurrent joins
    /// that both passed the first look.
    pub fn reserve_identity(&self, name: &str, cid: Cid) -> Result<(), IdentityConflict> {
        {
            let t = self.tables.read();
            if t.name_conflict(name) {
                return Err(IdentityConflict::NickTaken);
            }
            if t.cid_conflict(&cid) {
                return Err(IdentityConflict::CidTaken);
            }
        }

        let mut t = self.tables.write();
        if t.name_conflict(name) {
            return Err(IdentityConflict::NickTaken);
        }
        if t.cid_conflict(&cid) {
            return Err(IdentityConflict::CidTaken);
        }
        t.logging.insert(name.to_string());
        t.logging_cid.insert(cid);
        Ok(())
    }

    /// Drop a reservation after a failed login.
    pub fn release_reservation(&self, name: &str, cid: &Cid) {
        let mut t = self.tables.write();
        t.logging.remove(name);
        t.logging_cid.remove(cid);
    }

    /// Admit a reserved peer: drop its reservations, snapshot the peers
    /// admitted before it, and insert it into all three indices, all
    /// under one exclusive acquisition, so any concurrent `snapshot`
    /// observes the transition atomically. The returned snapshot excludes
    /// the new peer; the caller announces the join to exactly that set.
    pub fn admit(&self, peer: Peer) -> Vec<Peer> {
        let name = peer.name();
        let cid = peer.cid();
        let sid = peer.sid();

        let mut t = self.tables.write();
        t.logging.remove(&name);
        t.logging_cid.remove(&cid);
        let before = t.admitted();
        t.by_sid.insert(sid, peer.clone());
        t.by_cid.insert(cid, peer.clone());
        t.by_name.insert(name, peer);
        before
    }

    /// Remove a departed peer from all three indices and snapshot who is
    /// left to notify.
    pub fn remove(&self, peer: &Peer) -> Vec<Peer> {
        let mut t = self.tables.write();
        t.by_name.remove(&peer.name());
        t.by_sid.remove(&peer.sid());
        t.by_cid.remove(&peer.cid());
        t.admitted()
    }

    #[cfg(test)]
    fn reservation_count(&self) -> usize {
        let t = self.tables.read();
        t.logging.len() + t.logging_cid.len()
    }
}
