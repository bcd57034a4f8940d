//! Departure scenarios: QUI fan-out and registry cleanup.

use crate::harness::{start_hub, Client};

#[tokio::test]
async fn departure_notifies_every_remaining_peer() {
    let addr = start_hub().await;
    let (mut alice, _) = Client::login(addr, "alice").await;
    let (mut bob, _) = Client::login(addr, "bob").await;
    alice.recv().await; // bob's join
    let (mut carol, _) = Client::login(addr, "carol").await;
    alice.recv().await; // carol's join
    bob.recv().await; // carol's join

    let sid_b = bob.sid.clone();
    drop(bob);

    assert_eq!(alice.recv().await, format!("IQUI {sid_b}"));
    assert_eq!(carol.recv().await, format!("IQUI {sid_b}"));
}

#[tokio::test]
async fn departed_peer_leaves_no_trace_in_the_roster() {
    let addr = start_hub().await;
    let (mut alice, _) = Client::login(addr, "alice").await;
    let (bob, _) = Client::login(addr, "bob").await;
    alice.recv().await; // bob's join

    let sid_b = bob.sid.clone();
    drop(bob);
    assert_eq!(alice.recv().await, format!("IQUI {sid_b}"));

    // a later joiner's catch-up no longer contains bob
    let (_dave, roster) = Client::login(addr, "dave").await;
    assert_eq!(roster.len(), 1);
    assert!(roster[0].contains("NIalice"));
    assert!(!roster.iter().any(|l| l.contains("NIbob")));
}

#[tokio::test]
async fn departed_identity_is_reclaimable() {
    let addr = start_hub().await;
    let (mut alice, _) = Client::login(addr, "alice").await;
    let (bob, _) = Client::login(addr, "bob").await;
    alice.recv().await;

    let sid_b = bob.sid.clone();
    drop(bob);
    assert_eq!(alice.recv().await, format!("IQUI {sid_b}"));

    // same nick and CID, fresh session, new SID
    let (bob2, roster) = Client::login(addr, "bob").await;
    assert_ne!(bob2.sid, sid_b, "SIDs are not reused within a hub lifetime");
    assert_eq!(roster.len(), 1);
}
