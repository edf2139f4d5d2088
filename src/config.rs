//! Configuration files for the daemon and the client.
//!
//! Two files, both JSON: the broker config names the UDP bind address,
//! the streams config lists the named streams and the handler kind each
//! one is backed by. Both are read once at startup; there is no reload.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default port the daemon listens on when generating a fresh config.
const DEFAULT_PORT: u16 = 52644;

/// Directory the default config files live in.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamgram")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Address the daemon binds, and the address `send` talks to.
    pub bind: SocketAddr,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
        }
    }
}

impl BrokerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read broker config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse broker config {}", path.display()))
    }

    /// Loads the config, generating a default one on first run so the
    /// daemon can start on a fresh machine.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        warn!(path = %path.display(), "no broker config found, generating a default one");
        let config = Self::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(&config).context("failed to render default config")?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write default config {}", path.display()))?;
        Ok(config)
    }
}

/// One stream definition: a unique name and the handler backing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDef {
    pub name: String,
    /// Handler kind, e.g. `file` or `log`.
    pub kind: String,
    /// Target path for the `file` handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamsConfig {
    pub streams: Vec<StreamDef>,
}

impl StreamsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read streams config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse streams config {}", path.display()))
    }

    /// Loads the streams file, tolerating its absence: a daemon with no
    /// streams still runs and answers every message with `-No such
    /// stream`.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "no streams config found, starting with an empty table");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
