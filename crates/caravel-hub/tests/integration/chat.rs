//! Routing scenarios: broadcast chat, private messages, echoes, and the
//! privileged-command filter.

use crate::harness::{start_hub, Client};

#[tokio::test]
async fn two_peer_chat_reaches_both_sides() {
    let addr = start_hub().await;
    let (mut alice, roster) = Client::login(addr, "alice").await;
    assert!(roster.is_empty());

    let (mut bob, roster) = Client::login(addr, "bob").await;
    // bob saw alice before himself (asserted inside login); exactly her
    assert_eq!(roster.len(), 1);
    assert!(roster[0].contains("NIalice"));

    // alice hears about bob's arrival
    let join = alice.recv().await;
    assert!(join.starts_with(&format!("BINF {} ", bob.sid)), "got {join:?}");
    assert!(join.contains("NIbob"));

    let sid_a = alice.sid.clone();
    alice.send(&format!("BMSG {sid_a} hello")).await;

    // the broadcast reaches bob AND echoes back to alice herself
    assert_eq!(bob.recv().await, format!("BMSG {sid_a} hello"));
    assert_eq!(alice.recv().await, format!("BMSG {sid_a} hello"));
}

#[tokio::test]
async fn private_message_reaches_only_its_target() {
    let addr = start_hub().await;
    let (mut alice, _) = Client::login(addr, "alice").await;
    let (mut bob, _) = Client::login(addr, "bob").await;
    alice.recv().await; // bob's join

    let (sid_a, sid_b) = (alice.sid.clone(), bob.sid.clone());
    alice.send(&format!("DMSG {sid_a} {sid_b} psst")).await;

    assert_eq!(bob.recv().await, format!("DMSG {sid_a} {sid_b} psst"));
    alice.expect_silence().await;
}

#[tokio::test]
async fn echo_returns_to_sender_and_reaches_target() {
    let addr = start_hub().await;
    let (mut alice, _) = Client::login(addr, "alice").await;
    let (mut bob, _) = Client::login(addr, "bob").await;
    alice.recv().await; // bob's join

    let (sid_a, sid_b) = (alice.sid.clone(), bob.sid.clone());
    alice.send(&format!("EMSG {sid_a} {sid_b} marco")).await;

    // the originator gets the echo back verbatim; the target gets the
    // payload routed as a direct
    assert_eq!(alice.recv().await, format!("EMSG {sid_a} {sid_b} marco"));
    assert_eq!(bob.recv().await, format!("DMSG {sid_a} {sid_b} marco"));
}

#[tokio::test]
async fn direct_to_departed_sid_is_silently_dropped() {
    let addr = start_hub().await;
    let (mut alice, _) = Client::login(addr, "alice").await;
    let (bob, _) = Client::login(addr, "bob").await;
    alice.recv().await; // bob's join
    let sid_b = bob.sid.clone();
    drop(bob);
    let qui = alice.recv().await;
    assert_eq!(qui, format!("IQUI {sid_b}"));

    let sid_a = alice.sid.clone();
    alice.send(&format!("DMSG {sid_a} {sid_b} anyone")).await;
    alice.expect_silence().await;

    // the sender's session is unaffected
    alice.send(&format!("BMSG {sid_a} still\\shere")).await;
    assert_eq!(alice.recv().await, format!("BMSG {sid_a} still\\shere"));
}

#[tokio::test]
async fn privileged_commands_inside_client_envelopes_are_dropped() {
    let addr = start_hub().await;
    let (mut alice, _) = Client::login(addr, "alice").await;
    let (mut bob, _) = Client::login(addr, "bob").await;
    alice.recv().await; // bob's join

    // a client may not re-broadcast identity or status traffic
    let sid_a = alice.sid.clone();
    alice.send(&format!("BINF {sid_a} NIalice-rebrand")).await;
    alice.send(&format!("BSTA {sid_a} 000 fake")).await;
    bob.expect_silence().await;

    // the session survives and ordinary chat still flows
    alice.send(&format!("BMSG {sid_a} unaffected")).await;
    assert_eq!(bob.recv().await, format!("BMSG {sid_a} unaffected"));
}

#[tokio::test]
async fn broadcast_with_forged_sid_disconnects_the_sender() {
    let addr = start_hub().await;
    let (mut alice, _) = Client::login(addr, "alice").await;
    let (mut bob, _) = Client::login(addr, "bob").await;
    alice.recv().await; // bob's join

    let sid_b = bob.sid.clone();
    alice.send(&format!("BMSG {sid_b} spoofed")).await;

    // the hub drops alice; bob never sees the forged line but hears the
    // departure
    alice.expect_closed().await;
    assert_eq!(bob.recv().await, format!("IQUI {}", alice.sid));
}
