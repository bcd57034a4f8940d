//! Test harness — a hub on an ephemeral port and a raw-line ADC client.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use caravel_hub::{Hub, HubConfig};
use caravel_proto::{tiger_hash, Cid, Pid};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Start a hub with default config; returns its address.
pub async fn start_hub() -> SocketAddr {
    start_hub_with(HubConfig::default()).await
}

pub async fn start_hub_with(config: HubConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Hub::new(config);
    tokio::spawn(async move {
        loop {
            let Ok((stream, peer)) = listener.accept().await else {
                break;
            };
            let hub = hub.clone();
            tokio::spawn(async move {
                // errors here are individual connections failing, which
                // several tests provoke on purpose
                let _ = hub.serve(stream, peer).await;
            });
        }
    });
    addr
}

/// A deterministic PID per nick, so tests can recompute CIDs.
pub fn pid_for(name: &str) -> Pid {
    Pid(tiger_hash(name.as_bytes()))
}

pub fn cid_for(name: &str) -> Cid {
    pid_for(name).cid()
}

pub struct Client {
    pub sid: String,
    lines: BufReader<OwnedReadHalf>,
    tx: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rx, tx) = stream.into_split();
        Client {
            sid: String::new(),
            lines: BufReader::new(rx),
            tx,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.tx.write_all(line.as_bytes()).await.unwrap();
        self.tx.write_all(b"\n").await.unwrap();
    }

    /// Read one line, failing the test if nothing arrives in time.
    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(RECV_TIMEOUT, async {
            let mut line = String::new();
            let n = self.lines.read_line(&mut line).await.unwrap();
            assert!(n > 0, "connection closed while expecting a line");
            line.trim_end().to_string()
        })
        .await
        .expect("timed out waiting for a line")
    }

    /// Assert the hub closed the connection.
    pub async fn expect_closed(&mut self) {
        tokio::time::timeout(RECV_TIMEOUT, async {
            loop {
                let mut line = String::new();
                let n = self.lines.read_line(&mut line).await.unwrap();
                if n == 0 {
                    return;
                }
            }
        })
        .await
        .expect("timed out waiting for the hub to disconnect")
    }

    /// Assert nothing arrives for a little while.
    pub async fn expect_silence(&mut self) {
        let mut line = String::new();
        let res =
            tokio::time::timeout(Duration::from_millis(80), self.lines.read_line(&mut line)).await;
        assert!(res.is_err(), "unexpected line: {line:?}");
    }

    /// Run the Protocol stage: negotiate features and learn our SID.
    pub async fn negotiate(&mut self) {
        self.send("HSUP ADBASE ADTIGR").await;
        let sup = self.recv().await;
        assert_eq!(sup, "ISUP ADBASE ADBAS0 ADTIGR ADPING");
        let sid_line = self.recv().await;
        let sid = sid_line
            .strip_prefix("ISID ")
            .unwrap_or_else(|| panic!("expected ISID, got {sid_line:?}"));
        self.sid = sid.to_string();
    }

    /// Full login: handshake, identity, and the catch-up sequence. Returns
    /// the roster lines observed (`BINF`s for peers admitted before us).
    pub async fn login(addr: SocketAddr, name: &str) -> (Client, Vec<String>) {
        let mut client = Client::connect(addr).await;
        client.negotiate().await;
        let pid = pid_for(name);
        client
            .send(&format!("BINF {} ID{} PD{pid} NI{name}", client.sid, pid.cid()))
            .await;

        let inf = client.recv().await;
        assert!(inf.starts_with("IINF "), "expected hub info, got {inf:?}");
        let sta = client.recv().await;
        assert!(sta.starts_with("ISTA 000"), "expected success, got {sta:?}");

        // roster BINFs end with our own record
        let own_prefix = format!("BINF {} ", client.sid);
        let mut roster = Vec::new();
        loop {
            let line = client.recv().await;
            assert!(line.starts_with("BINF "), "expected roster INF, got {line:?}");
            if line.starts_with(&own_prefix) {
                break;
            }
            roster.push(line);
        }
        let motd = client.recv().await;
        assert!(motd.starts_with("IMSG "), "expected MOTD, got {motd:?}");
        (client, roster)
    }
}
