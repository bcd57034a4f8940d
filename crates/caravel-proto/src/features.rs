//! Feature negotiation — the `SUP` vocabulary.
//!
//! A feature token is four ASCII characters. `SUP` parameters carry an
//! `AD` (add) or `RM` (remove) prefix; a feature set is an ordered list of
//! token/enabled pairs so the hub advertises its features in a stable order.

use std::fmt;
use std::str::FromStr;

use crate::ProtoError;

/// A four-character feature token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Feature(pub [u8; 4]);

impl Feature {
    pub const BASE: Feature = Feature(*b"BASE");
    pub const BAS0: Feature = Feature(*b"BAS0");
    pub const TIGR: Feature = Feature(*b"TIGR");
    pub const PING: Feature = Feature(*b"PING");
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(std::str::from_utf8(&self.0).map_err(|_| fmt::Error)?)
    }
}

impl FromStr for Feature {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| ProtoError::InvalidFeature(s.to_string()))?;
        if !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ProtoError::InvalidFeature(s.to_string()));
        }
        Ok(Feature(bytes))
    }
}

/// An ordered set of feature modifications, preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features(Vec<(Feature, bool)>);

impl Features {
    pub fn new() -> Self {
        Features(Vec::new())
    }

    /// Set a token, keeping first-insertion order on update.
    pub fn set(&mut self, fea: Feature, on: bool) {
        match self.0.iter_mut().find(|(f, _)| *f == fea) {
            Some(entry) => entry.1 = on,
            None => self.0.push((fea, on)),
        }
    }

    pub fn with(mut self, fea: Feature) -> Self {
        self.set(fea, true);
        self
    }

    /// Is the token present and enabled?
    pub fn is_set(&self, fea: Feature) -> bool {
        self.0.iter().any(|&(f, on)| f == fea && on)
    }

    /// Tokens enabled on both sides, in `self`'s order.
    pub fn intersect(&self, other: &Features) -> Features {
        Features(
            self.0
                .iter()
                .filter(|&&(f, on)| on && other.is_set(f))
                .copied()
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, bool)> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse one `SUP` parameter (`ADBASE` / `RMPING`).
    pub fn apply_token(&mut self, tok: &str) -> Result<(), ProtoError> {
        let (prefix, name) = tok
            .split_at_checked(2)
            .ok_or_else(|| ProtoError::InvalidFeature(tok.to_string()))?;
        let on = match prefix {
            "AD" => true,
            "RM" => false,
            _ => return Err(ProtoError::InvalidFeature(tok.to_string())),
        };
        self.set(name.parse()?, on);
        Ok(())
    }
}

impl FromIterator<(Feature, bool)> for Features {
    fn from_iter<T: IntoIterator<Item = (Feature, bool)>>(iter: T) -> Self {
        let mut fea = Features::new();
        for (f, on) in iter {
            fea.set(f, on);
        }
        fea
    }
}
