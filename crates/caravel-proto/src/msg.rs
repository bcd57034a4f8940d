//! Message bodies — typed views over packet parameters.
//!
//! A [`Message`] knows its command name and how to marshal itself into
//! (and unmarshal itself out of) the escaped parameter list of a packet.
//! The hub decodes bodies only where it must (handshake, status); routed
//! traffic stays in wire form.

use std::str::FromStr;

use crate::packet::{escape, unescape, BroadcastPacket, Command, DirectPacket, InfoPacket};
use crate::{Cid, Features, Pid, ProtoError, Severity, Sid};

/// A typed message body.
pub trait Message: Sized {
    const CMD: Command;

    fn marshal(&self, params: &mut Vec<String>);
    fn unmarshal(params: &[String]) -> Result<Self, ProtoError>;
}

fn decode_as<M: Message>(cmd: Command, params: &[String]) -> Result<M, ProtoError> {
    if cmd != M::CMD {
        return Err(ProtoError::UnexpectedCommand {
            expected: M::CMD,
            got: cmd,
        });
    }
    M::unmarshal(params)
}

impl InfoPacket {
    pub fn from_msg<M: Message>(msg: &M) -> Self {
        let mut params = Vec::new();
        msg.marshal(&mut params);
        InfoPacket {
            cmd: M::CMD,
            params,
        }
    }

    pub fn decode<M: Message>(&self) -> Result<M, ProtoError> {
        decode_as(self.cmd, &self.params)
    }
}

impl BroadcastPacket {
    pub fn from_msg<M: Message>(id: Sid, msg: &M) -> Self {
        let mut params = Vec::new();
        msg.marshal(&mut params);
        BroadcastPacket {
            cmd: M::CMD,
            id,
            params,
        }
    }

    pub fn decode<M: Message>(&self) -> Result<M, ProtoError> {
        decode_as(self.cmd, &self.params)
    }
}

impl DirectPacket {
    pub fn from_msg<M: Message>(id: Sid, target: Sid, msg: &M) -> Self {
        let mut params = Vec::new();
        msg.marshal(&mut params);
        DirectPacket {
            cmd: M::CMD,
            id,
            target,
            params,
        }
    }
}

// ── SUP ───────────────────────────────────────────────────────────────────────

/// Feature negotiation (`SUP`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Supported {
    pub features: Features,
}

impl Message for Supported {
    const CMD: Command = Command::SUP;

    fn marshal(&self, params: &mut Vec<String>) {
        for (fea, on) in self.features.iter() {
            let prefix = if on { "AD" } else { "RM" };
            params.push(format!("{prefix}{fea}"));
        }
    }

    fn unmarshal(params: &[String]) -> Result<Self, ProtoError> {
        let mut features = Features::new();
        for tok in params {
            features.apply_token(tok)?;
        }
        Ok(Supported { features })
    }
}

// ── SID ───────────────────────────────────────────────────────────────────────

/// Session ID assignment (`SID`), hub→client only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidAssign {
    pub sid: Sid,
}

impl Message for SidAssign {
    const CMD: Command = Command::SID;

    fn marshal(&self, params: &mut Vec<String>) {
        params.push(self.sid.to_string());
    }

    fn unmarshal(params: &[String]) -> Result<Self, ProtoError> {
        let sid = params
            .first()
            .ok_or(ProtoError::Truncated("SID"))?
            .parse()?;
        Ok(SidAssign { sid })
    }
}

// ── INF (user) ────────────────────────────────────────────────────────────────

/// A user record (`INF`), the standard ADC field set.
///
/// Only non-empty fields are marshalled. The PID is never marshalled:
/// it is a client secret, verified once and discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: Option<Cid>,
    pub pid: Option<Pid>,
    pub name: String,
    pub ip4: String,
    pub ip6: String,
    pub application: String,
    pub version: String,
    pub desc: String,
    pub email: String,
    pub share_size: Option<u64>,
    pub share_files: Option<u32>,
    pub slots: Option<u32>,
    pub hubs_normal: Option<u32>,
    pub hubs_registered: Option<u32>,
    pub hubs_operator: Option<u32>,
    /// `SU` — comma-separated client feature tokens.
    pub features: Vec<String>,
}

fn push_field(params: &mut Vec<String>, key: &str, value: &str) {
    if !value.is_empty() {
        params.push(format!("{key}{}", escape(value)));
    }
}

fn push_num<N: ToString>(params: &mut Vec<String>, key: &str, value: Option<N>) {
    if let Some(v) = value {
        params.push(format!("{key}{}", v.to_string()));
    }
}

fn parse_num<N: FromStr>(key: &'static str, value: &str) -> Result<N, ProtoError> {
    value.parse().map_err(|_| ProtoError::InvalidField {
        field: key,
        value: value.to_string(),
    })
}

impl Message for User {
    const CMD: Command = Command::INF;

    fn marshal(&self, params: &mut Vec<String>) {
        if let Some(id) = self.id {
            params.push(format!("ID{id}"));
        }
        push_field(params, "NI", &self.name);
        push_field(params, "I4", &self.ip4);
        push_field(params, "I6", &self.ip6);
        push_field(params, "AP", &self.application);
        push_field(params, "VE", &self.version);
        push_field(params, "DE", &self.desc);
        push_field(params, "EM", &self.email);
        push_num(params, "SS", self.share_size);
        push_num(params, "SF", self.share_files);
        push_num(params, "SL", self.slots);
        push_num(params, "HN", self.hubs_normal);
        push_num(params, "HR", self.hubs_registered);
        push_num(params, "HO", self.hubs_operator);
        push_field(params, "SU", &self.features.join(","));
    }

    fn unmarshal(params: &[String]) -> Result<Self, ProtoError> {
        let mut user = User::default();
        for tok in params {
            let (key, raw) = tok
                .split_at_checked(2)
                .ok_or(ProtoError::Truncated("INF field"))?;
            let value = unescape(raw)?;
            match key {
                "ID" => user.id = Some(value.parse()?),
                "PD" => user.pid = Some(value.parse()?),
                "NI" => user.name = value.into_owned(),
                "I4" => user.ip4 = value.into_owned(),
                "I6" => user.ip6 = value.into_owned(),
                "AP" => user.application = value.into_owned(),
                "VE" => user.version = value.into_owned(),
                "DE" => user.desc = value.into_owned(),
                "EM" => user.email = value.into_owned(),
                "SS" => user.share_size = Some(parse_num("SS", &value)?),
                "SF" => user.share_files = Some(parse_num("SF", &value)?),
                "SL" => user.slots = Some(parse_num("SL", &value)?),
                "HN" => user.hubs_normal = Some(parse_num("HN", &value)?),
                "HR" => user.hubs_registered = Some(parse_num("HR", &value)?),
                "HO" => user.hubs_operator = Some(parse_num("HO", &value)?),
                "SU" => {
                    user.features = value
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                other => tracing::trace!(field = other, "ignoring unknown INF field"),
            }
        }
        Ok(user)
    }
}

// ── INF (hub) ─────────────────────────────────────────────────────────────────

/// Hub self-description, sent once on admission as an `IINF`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubInfo {
    pub name: String,
    pub version: String,
    pub desc: String,
}

impl Message for HubInfo {
    const CMD: Command = Command::INF;

    fn marshal(&self, params: &mut Vec<String>) {
        push_field(params, "NI", &self.name);
        push_field(params, "VE", &self.version);
        push_field(params, "DE", &self.desc);
    }

    fn unmarshal(params: &[String]) -> Result<Self, ProtoError> {
        let mut info = HubInfo::default();
        for tok in params {
            let (key, raw) = tok
                .split_at_checked(2)
                .ok_or(ProtoError::Truncated("INF field"))?;
            let value = unescape(raw)?;
            match key {
                "NI" => info.name = value.into_owned(),
                "VE" => info.version = value.into_owned(),
                "DE" => info.desc = value.into_owned(),
                _ => {}
            }
        }
        Ok(info)
    }
}

// ── STA ───────────────────────────────────────────────────────────────────────

/// Status (`STA`): a severity digit, a two-digit code, and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub severity: Severity,
    pub code: u8,
    pub message: String,
}

impl Message for Status {
    const CMD: Command = Command::STA;

    fn marshal(&self, params: &mut Vec<String>) {
        params.push(format!("{}{:02}", self.severity as u8, self.code));
        params.push(escape(&self.message).into_owned());
    }

    fn unmarshal(params: &[String]) -> Result<Self, ProtoError> {
        let code_str = params.first().ok_or(ProtoError::Truncated("status code"))?;
        let digits: Vec<u32> = code_str.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.len() != 3 || code_str.len() != 3 {
            return Err(ProtoError::InvalidStatus(code_str.clone()));
        }
        let severity = Severity::from_digit(digits[0] as u8)
            .ok_or_else(|| ProtoError::InvalidStatus(code_str.clone()))?;
        let code = (digits[1] * 10 + digits[2]) as u8;
        let message = match params.get(1) {
            Some(raw) => unescape(raw)?.into_owned(),
            None => String::new(),
        };
        Ok(Status {
            severity,
            code,
            message,
        })
    }
}

// ── MSG ───────────────────────────────────────────────────────────────────────

/// A chat line (`MSG`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
}

impl Message for ChatMessage {
    const CMD: Command = Command::MSG;

    fn marshal(&self, params: &mut Vec<String>) {
        params.push(escape(&self.text).into_owned());
    }

    fn unmarshal(params: &[String]) -> Result<Self, ProtoError> {
        let text = match params.first() {
            Some(raw) => unescape(raw)?.into_owned(),
            None => String::new(),
        };
        Ok(ChatMessage { text })
    }
}

// ── QUI ───────────────────────────────────────────────────────────────────────

/// Departure notice (`QUI`), hub→client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    pub sid: Sid,
}

impl Message for Disconnect {
    const CMD: Command = Command::QUI;

    fn marshal(&self, params: &mut Vec<String>) {
        params.push(self.sid.to_string());
    }

    fn unmarshal(params: &[String]) -> Result<Self, ProtoError> {
        let sid = params
            .first()
            .ok_or(ProtoError::Truncated("SID"))?
            .parse()?;
        Ok(Disconnect { sid })
    }
}
