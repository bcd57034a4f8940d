//! Packet envelopes — the four message shapes the hub routes.
//!
//! A packet is one `'\n'`-terminated line: a kind byte, a three-letter
//! command, then space-separated parameters. `B` carries the originator
//! SID; `D`/`E` carry originator and target SIDs. `H` (client→hub) and
//! `I` (hub→client) carry none — both decode to [`Packet::Info`], and the
//! hub always emits `I`.
//!
//! Parameters are held in wire form (escaped); message bodies unescape on
//! decode so routed packets re-serialize byte-for-byte.

use std::borrow::Cow;
use std::fmt;

use crate::{ProtoError, Sid};

// ── Escaping ──────────────────────────────────────────────────────────────────

/// Escape a raw value into a wire parameter (`\s`, `\n`, `\\`).
pub fn escape(raw: &str) -> Cow<'_, str> {
    if !raw.contains([' ', '\n', '\\']) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            ' ' => out.push_str("\\s"),
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Unescape a wire parameter back into its raw value.
pub fn unescape(param: &str) -> Result<Cow<'_, str>, ProtoError> {
    if !param.contains('\\') {
        return Ok(Cow::Borrowed(param));
    }
    let mut out = String::with_capacity(param.len());
    let mut chars = param.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            _ => return Err(ProtoError::InvalidEscape(param.to_string())),
        }
    }
    Ok(Cow::Owned(out))
}

// ── Command ───────────────────────────────────────────────────────────────────

/// A three-letter ADC command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(pub [u8; 3]);

impl Command {
    pub const SUP: Command = Command(*b"SUP");
    pub const SID: Command = Command(*b"SID");
    pub const INF: Command = Command(*b"INF");
    pub const STA: Command = Command(*b"STA");
    pub const MSG: Command = Command(*b"MSG");
    pub const QUI: Command = Command(*b"QUI");
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(std::str::from_utf8(&self.0).map_err(|_| fmt::Error)?)
    }
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

/// Control packet with no SID. Client→hub lines use kind `H`, hub→client
/// lines use kind `I`; the hub only ever writes `I`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoPacket {
    pub cmd: Command,
    pub params: Vec<String>,
}

/// A packet destined to every peer, tagged with the originator SID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPacket {
    pub cmd: Command,
    pub id: Sid,
    pub params: Vec<String>,
}

/// A packet destined to a single peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPacket {
    pub cmd: Command,
    pub id: Sid,
    pub target: Sid,
    pub params: Vec<String>,
}

/// Same shape as [`DirectPacket`], but also written back to the originator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoPacket {
    pub cmd: Command,
    pub id: Sid,
    pub target: Sid,
    pub params: Vec<String>,
}

impl From<EchoPacket> for DirectPacket {
    fn from(e: EchoPacket) -> Self {
        DirectPacket {
            cmd: e.cmd,
            id: e.id,
            target: e.target,
            params: e.params,
        }
    }
}

/// One parsed wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Info(InfoPacket),
    Broadcast(BroadcastPacket),
    Direct(DirectPacket),
    Echo(EchoPacket),
}

impl Packet {
    pub fn cmd(&self) -> Command {
        match self {
            Packet::Info(p) => p.cmd,
            Packet::Broadcast(p) => p.cmd,
            Packet::Direct(p) => p.cmd,
            Packet::Echo(p) => p.cmd,
        }
    }

    /// Parse one line, without its terminator. `None` for the empty
    /// keep-alive line.
    pub fn parse(line: &str) -> Result<Option<Packet>, ProtoError> {
        if line.is_empty() {
            return Ok(None);
        }
        let mut kinds = line.chars();
        let kind = kinds.next().unwrap();
        let rest = kinds.as_str();
        let cmd_bytes: [u8; 3] = match rest.as_bytes().get(..3).and_then(|b| b.try_into().ok()) {
            Some(bytes) => bytes,
            None => return Err(ProtoError::Truncated("command")),
        };
        // the command must be ASCII, which also makes the split below safe
        if !cmd_bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(ProtoError::Truncated("command"));
        }
        let cmd = Command(cmd_bytes);
        let body = &rest[3..];

        let mut params: Vec<String> = if body.is_empty() {
            Vec::new()
        } else {
            let body = body
                .strip_prefix(' ')
                .ok_or(ProtoError::Truncated("separator"))?;
            body.split(' ').map(str::to_string).collect()
        };

        fn take_sid(params: &mut Vec<String>, what: &'static str) -> Result<Sid, ProtoError> {
            if params.is_empty() {
                return Err(ProtoError::Truncated(what));
            }
            params.remove(0).parse()
        }

        let pkt = match kind {
            'H' | 'I' => Packet::Info(InfoPacket { cmd, params }),
            'B' => {
                let id = take_sid(&mut params, "originator SID")?;
                Packet::Broadcast(BroadcastPacket { cmd, id, params })
            }
            'D' => {
                let id = take_sid(&mut params, "originator SID")?;
                let target = take_sid(&mut params, "target SID")?;
                Packet::Direct(DirectPacket {
                    cmd,
                    id,
                    target,
                    params,
                })
            }
            'E' => {
                let id = take_sid(&mut params, "originator SID")?;
                let target = take_sid(&mut params, "target SID")?;
                Packet::Echo(EchoPacket {
                    cmd,
                    id,
                    target,
                    params,
                })
            }
            other => return Err(ProtoError::UnknownKind(other)),
        };
        Ok(Some(pkt))
    }

    /// Serialize into `out`, without the line terminator.
    pub fn encode(&self, out: &mut String) {
        fn tail(out: &mut String, params: &[String]) {
            for p in params {
                out.push(' ');
                out.push_str(p);
            }
        }
        match self {
            Packet::Info(p) => {
                out.push('I');
                out.push_str(&p.cmd.to_string());
                tail(out, &p.params);
            }
            Packet::Broadcast(p) => {
                out.push('B');
                out.push_str(&p.cmd.to_string());
                out.push(' ');
                out.push_str(&p.id.to_string());
                tail(out, &p.params);
            }
            Packet::Direct(p) => {
                out.push('D');
                out.push_str(&p.cmd.to_string());
                out.push(' ');
                out.push_str(&p.id.to_string());
                out.push(' ');
                out.push_str(&p.target.to_string());
                tail(out, &p.params);
            }
            Packet::Echo(p) => {
                out.push('E');
                out.push_str(&p.cmd.to_string());
                out.push(' ');
                out.push_str(&p.id.to_string());
                out.push(' ');
                out.push_str(&p.target.to_string());
                tail(out, &p.params);
            }
        }
    }
}
