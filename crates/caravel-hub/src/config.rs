//! Hub configuration.
//!
//! Resolution order: explicit `--config` path → `$CARAVEL_CONFIG` →
//! `~/.config/caravel/config.toml` → defaults. Every field has a default
//! so a missing file or a partial file both work.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub hub: HubSection,
    pub network: NetworkSection,
    pub tls: TlsSection,
}

/// Operator-facing hub identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSection {
    /// Hub name, shown to clients on admission.
    pub name: String,
    /// Hub description.
    pub desc: String,
    /// Message of the day, sent as a hub chat line after admission.
    pub motd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Listen address. ADC's registered port is 1411.
    pub listen: String,
}

/// TLS is optional: both paths set enables `adcs://`, neither serves
/// plain `adc://`. The PEM files are operator-provided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            name: "Caravel".to_string(),
            desc: "ADC hub".to_string(),
            motd: "Welcome aboard.".to_string(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:1411".to_string(),
        }
    }
}

impl HubConfig {
    /// Load configuration, falling back to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<HubConfig> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };
        match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)
                    .with_context(|| format!("failed to read config at {}", p.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config at {}", p.display()))
            }
            Some(p) if explicit.is_some() => {
                anyhow::bail!("config file not found: {}", p.display())
            }
            _ => Ok(HubConfig::default()),
        }
    }

    fn default_path() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CARAVEL_CONFIG") {
            return Some(PathBuf::from(p));
        }
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("caravel")
                .join("config.toml"),
        )
    }
}
