//! Protocol identifiers — session IDs, client IDs, Tiger hashing, status
//! severities.
//!
//! These types are the on-wire vocabulary of the hub. SIDs are four base32
//! characters; CIDs and PIDs are 192-bit Tiger values rendered as 39
//! unpadded base32 characters. A client proves ownership of its CID by
//! presenting the PID whose Tiger hash equals it.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use tiger::{Digest, Tiger};

use crate::ProtoError;

/// RFC 4648 base32 alphabet, as used for SIDs.
const SID_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

// ── Session ID ────────────────────────────────────────────────────────────────

/// Session identifier — a short opaque token addressing one live peer.
///
/// Rendered as exactly four base32 characters (20 bits of payload).
/// Unique per hub lifetime while the bearer is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(pub u32);

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = [0u8; 4];
        for (i, b) in out.iter_mut().enumerate() {
            *b = SID_ALPHABET[(self.0 as usize >> (5 * (3 - i))) & 0x1f];
        }
        // alphabet bytes are always valid UTF-8
        f.write_str(std::str::from_utf8(&out).unwrap())
    }
}

impl FromStr for Sid {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err(ProtoError::InvalidSid(s.to_string()));
        }
        let mut v = 0u32;
        for &b in bytes {
            let idx = SID_ALPHABET
                .iter()
                .position(|&a| a == b)
                .ok_or_else(|| ProtoError::InvalidSid(s.to_string()))?;
            v = (v << 5) | idx as u32;
        }
        Ok(Sid(v))
    }
}

// ── Client ID / Private ID ────────────────────────────────────────────────────

/// Client identifier — the Tiger hash of the client's private ID.
///
/// Unique across all peers, admitted and logging-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cid(pub [u8; 24]);

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE32_NOPAD.encode(&self.0))
    }
}

impl FromStr for Cid {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = BASE32_NOPAD
            .decode(s.as_bytes())
            .map_err(|_| ProtoError::InvalidCid(s.to_string()))?;
        let bytes: [u8; 24] = raw
            .try_into()
            .map_err(|_| ProtoError::InvalidCid(s.to_string()))?;
        Ok(Cid(bytes))
    }
}

/// Private identifier — the client-held secret proving CID ownership.
///
/// Received once during the Identity stage, verified, and discarded.
/// Never stored or forwarded past verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pid(pub [u8; 24]);

impl Pid {
    /// The CID this PID binds to: `Tiger(pid)`.
    pub fn cid(&self) -> Cid {
        Cid(tiger_hash(&self.0))
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE32_NOPAD.encode(&self.0))
    }
}

impl FromStr for Pid {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cid::from_str(s).map(|c| Pid(c.0))
    }
}

/// Compute the 192-bit Tiger hash of arbitrary bytes.
pub fn tiger_hash(data: &[u8]) -> [u8; 24] {
    let digest = Tiger::digest(data);
    let mut out = [0u8; 24];
    out.copy_from_slice(&digest);
    out
}

// ── Status severity ───────────────────────────────────────────────────────────

/// Severity digit of a `STA` status code.
///
/// Renders as the leading digit of the three-digit code: a fatal
/// nick-taken is `122`, success is `000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Severity {
    Success = 0,
    Fatal = 1,
    Recoverable = 2,
}

impl Severity {
    pub fn from_digit(d: u8) -> Option<Self> {
        match d {
            0 => Some(Severity::Success),
            1 => Some(Severity::Fatal),
            2 => Some(Severity::Recoverable),
            _ => None,
        }
    }
}
