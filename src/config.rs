// src/config.rs
//! Node and spawn configuration.
//!
//! `NodeConfig` can be built in code or loaded from TOML; any key left out
//! takes its default.

use crate::epmd::{EPMD_PORT, NODE_TYPE_NORMAL};
use crate::mailbox::DEFAULT_QUEUE_SIZE;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Node-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Capacity of the direct and attributed queues of every process.
    pub mailbox_size: usize,
    /// Capacity of the control queue of every process.
    pub control_size: usize,
    /// Verbose per-message tracing.
    pub trace: bool,
    /// Where the port mapper daemon listens.
    pub epmd_addr: SocketAddr,
    /// 77 for a normal node, 72 for a hidden one.
    pub node_type: u8,
    pub protocol: u8,
    pub high_version: u16,
    pub low_version: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mailbox_size: DEFAULT_QUEUE_SIZE,
            control_size: DEFAULT_QUEUE_SIZE,
            trace: false,
            epmd_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, EPMD_PORT)),
            node_type: NODE_TYPE_NORMAL,
            protocol: 0,
            high_version: 5,
            low_version: 5,
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Most verbose level worth emitting under this config.
    pub const fn tracing_filter(&self) -> tracing::Level {
        if self.trace {
            tracing::Level::TRACE
        } else {
            tracing::Level::INFO
        }
    }
}

/// Per-spawn overrides. `None` inherits the node's setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub mailbox_size: Option<usize>,
    pub control_size: Option<usize>,
}

impl SpawnConfig {
    pub fn with_mailbox_size(mut self, size: usize) -> Self {
        self.mailbox_size = Some(size);
        self
    }

    pub fn with_control_size(mut self, size: usize) -> Self {
        self.control_size = Some(size);
        self
    }

    /// Effective `(mailbox_size, control_size)` under `node`.
    pub(crate) fn resolve(&self, node: &NodeConfig) -> (usize, usize) {
        (
            self.mailbox_size.unwrap_or(node.mailbox_size),
            self.control_size.unwrap_or(node.control_size),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.mailbox_size, 100);
        assert_eq!(cfg.control_size, 100);
        assert!(!cfg.trace);
        assert_eq!(cfg.tracing_filter(), tracing::Level::INFO);
        assert_eq!(cfg.epmd_addr.port(), 4369);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = NodeConfig::from_toml_str(
            r#"
            mailbox_size = 16
            trace = true
            epmd_addr = "127.0.0.1:14369"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mailbox_size, 16);
        assert_eq!(cfg.control_size, 100);
        assert!(cfg.trace);
        assert_eq!(cfg.epmd_addr.port(), 14369);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(matches!(
            NodeConfig::from_toml_str("mailbox_size = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn spawn_overrides_inherit() {
        let node = NodeConfig { control_size: 7, ..NodeConfig::default() };
        let spawn = SpawnConfig::default().with_mailbox_size(3);
        assert_eq!(spawn.resolve(&node), (3, 7));
    }
}
