//! Admission scenarios: solo join, identity failures, the nick race.

use crate::harness::{cid_for, pid_for, start_hub, Client};

#[tokio::test]
async fn solo_join_sees_hub_info_then_itself() {
    let addr = start_hub().await;
    let mut client = Client::connect(addr).await;
    client.negotiate().await;
    assert_eq!(client.sid, "AAAB", "first SID of a fresh hub");

    let pid = pid_for("alice");
    client
        .send(&format!("BINF {} ID{} PD{pid} NIalice", client.sid, pid.cid()))
        .await;

    let inf = client.recv().await;
    assert!(inf.starts_with("IINF NICaravel"), "got {inf:?}");
    assert!(inf.contains("VEcaravel/"));

    let sta = client.recv().await;
    assert!(sta.starts_with("ISTA 000"), "got {sta:?}");

    // no other peers exist, so the first INF is our own
    let own = client.recv().await;
    assert!(own.starts_with("BINF AAAB ID"), "got {own:?}");
    assert!(own.contains("NIalice"));
    assert!(own.contains("I4127.0.0.1"), "transport IP filled in: {own:?}");
    assert!(!own.contains(" PD"), "PID must not be echoed");

    let motd = client.recv().await;
    assert_eq!(motd, "IMSG Welcome\\saboard.");
}

#[tokio::test]
async fn features_without_tigr_disconnect() {
    let addr = start_hub().await;
    let mut client = Client::connect(addr).await;
    client.send("HSUP ADBASE").await;
    client.expect_closed().await;
}

#[tokio::test]
async fn bad_pid_is_refused_without_residue() {
    let addr = start_hub().await;
    let mut client = Client::connect(addr).await;
    client.negotiate().await;

    // claim alice's CID with the wrong secret
    let wrong = pid_for("not-alice");
    client
        .send(&format!(
            "BINF {} ID{} PD{wrong} NIalice",
            client.sid,
            cid_for("alice")
        ))
        .await;

    let sta = client.recv().await;
    assert!(sta.starts_with("ISTA 127"), "got {sta:?}");
    client.expect_closed().await;

    // no reservation remains: the same identity logs in cleanly
    let (alice, roster) = Client::login(addr, "alice").await;
    assert!(roster.is_empty());
    drop(alice);
}

#[tokio::test]
async fn empty_nick_is_refused() {
    let addr = start_hub().await;
    let mut client = Client::connect(addr).await;
    client.negotiate().await;
    let pid = pid_for("nameless");
    client
        .send(&format!("BINF {} ID{} PD{pid}", client.sid, pid.cid()))
        .await;
    let sta = client.recv().await;
    assert!(sta.starts_with("ISTA 121"), "got {sta:?}");
    client.expect_closed().await;
}

#[tokio::test]
async fn nick_collision_admits_exactly_one() {
    let addr = start_hub().await;
    let (_alice, _) = Client::login(addr, "alice").await;

    // a second connection claims the same nick (its own CID)
    let mut impostor = Client::connect(addr).await;
    impostor.negotiate().await;
    let pid = pid_for("alice-impostor");
    impostor
        .send(&format!(
            "BINF {} ID{} PD{pid} NIalice",
            impostor.sid,
            pid.cid()
        ))
        .await;
    let sta = impostor.recv().await;
    assert!(sta.starts_with("ISTA 122"), "got {sta:?}");
    impostor.expect_closed().await;

    // the room contains exactly one alice
    let (_bob, roster) = Client::login(addr, "bob").await;
    let alices = roster.iter().filter(|l| l.contains("NIalice")).count();
    assert_eq!(alices, 1);
    assert_eq!(roster.len(), 1);
}

#[tokio::test]
async fn cid_collision_is_refused() {
    let addr = start_hub().await;
    let (_alice, _) = Client::login(addr, "alice").await;

    let mut second = Client::connect(addr).await;
    second.negotiate().await;
    let pid = pid_for("alice"); // same secret, different nick
    second
        .send(&format!(
            "BINF {} ID{} PD{pid} NIalice2",
            second.sid,
            pid.cid()
        ))
        .await;
    let sta = second.recv().await;
    assert!(sta.starts_with("ISTA 124"), "got {sta:?}");
    second.expect_closed().await;
}

#[tokio::test]
async fn concurrent_nick_race_admits_exactly_one() {
    let addr = start_hub().await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            client.negotiate().await;
            // distinct CIDs, same nick: only one may win
            let pid = pid_for(&format!("racer-{}", client.sid));
            client
                .send(&format!(
                    "BINF {} ID{} PD{pid} NIhighlander",
                    client.sid,
                    pid.cid()
                ))
                .await;
            // winners see hub info first; losers get the fatal STA directly
            let line = client.recv().await;
            assert!(
                line.starts_with("IINF ") || line.starts_with("ISTA 122"),
                "unexpected first reply: {line:?}"
            );
            (client, line.starts_with("IINF "))
        }));
    }

    let mut clients = Vec::new();
    let mut winners = 0;
    for task in tasks {
        let (client, won) = task.await.unwrap();
        winners += won as usize;
        clients.push(client); // keep connections alive until all are counted
    }
    assert_eq!(winners, 1, "exactly one racer may claim the nick");
}
