use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use crate::error::{WebNotifyError, ErrorCode};
use crate::webnotify::notify::DEFAULT_EXPIRY;
use crate::webnotify::optimistic::DEFAULT_RETRIES;
use crate::webnotify::registry::RegistryOptions;
use crate::webnotify::types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub addr: String,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,
}

/// Another node of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub node_id: NodeId,
    pub addr: String,
}

fn default_retries() -> usize {
    DEFAULT_RETRIES
}

fn default_expiry_secs() -> u64 {
    DEFAULT_EXPIRY.as_secs()
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, WebNotifyError> {
        let content = fs::read_to_string(path)
            .map_err(|e| WebNotifyError::new(ErrorCode::ConfigInvalid, format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, WebNotifyError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| WebNotifyError::new(ErrorCode::ConfigInvalid, format!("Failed to parse TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), WebNotifyError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| WebNotifyError::new(ErrorCode::ConfigInvalid, format!("Failed to serialize to TOML: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| WebNotifyError::new(ErrorCode::ConfigInvalid, format!("Failed to write config file: {}", e)))
    }

    pub fn validate(&self) -> Result<(), WebNotifyError> {
        if self.retries == 0 {
            return Err(WebNotifyError::Config("retries must be at least 1".to_string()));
        }
        if self.expiry_secs == 0 {
            return Err(WebNotifyError::Config("expiry_secs must be at least 1".to_string()));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if peer.node_id == self.node_id {
                return Err(WebNotifyError::Config(format!(
                    "peer {} reuses the local node id",
                    peer.addr
                )));
            }
            if !seen.insert(peer.node_id) {
                return Err(WebNotifyError::Config(format!(
                    "node id {} is listed twice in peers",
                    peer.node_id
                )));
            }
        }

        Ok(())
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            retries: self.retries,
            expiry: Duration::from_secs(self.expiry_secs),
        }
    }
}
