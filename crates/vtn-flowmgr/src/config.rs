//! Flow manager configuration.
//!
//! Loaded from YAML (default) or JSON, chosen by file extension.
//! Missing fields take their defaults.

use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vtn/flowmgr.yaml";

/// Tunables of the flow removal pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowManagerConfig {
    /// Timeout for a removal that issues a single RPC.
    pub flow_mod_timeout_ms: u64,

    /// Timeout for bulk removals and removals issuing many RPCs.
    pub bulk_flow_mod_timeout_ms: u64,

    /// RPC count above which the bulk timeout applies.
    pub bulk_threshold: usize,

    /// Maximum number of removals in their RPC phase at once.
    pub remove_workers: usize,

    /// Conflict retries per store transaction. Applied to the flow store
    /// when the executor is created.
    pub max_tx_retries: u32,

    /// Timeout for reading a switch's flow statistics during node clear.
    pub flow_stats_timeout_ms: u64,

    /// Table wiped by the node-clear fallback.
    pub flow_table_id: u8,
}

impl Default for FlowManagerConfig {
    fn default() -> Self {
        Self {
            flow_mod_timeout_ms: 3000,
            bulk_flow_mod_timeout_ms: 10000,
            bulk_threshold: 1,
            remove_workers: 4,
            max_tx_retries: 5,
            flow_stats_timeout_ms: 3000,
            flow_table_id: 0,
        }
    }
}

impl FlowManagerConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(content: &str) -> FlowResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| FlowError::invalid_config(format!("Failed to parse YAML: {}", e)))
    }

    /// Parses a JSON document.
    pub fn from_json_str(content: &str) -> FlowResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| FlowError::invalid_config(format!("Failed to parse JSON: {}", e)))
    }

    /// Loads and validates the configuration at `path`, falling back to
    /// defaults if the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> FlowResult<Self> {
        let path = path.as_ref();
        let config = match fs::read_to_string(path) {
            Ok(content) => {
                let is_json = path.extension().is_some_and(|ext| ext == "json");
                if is_json {
                    Self::from_json_str(&content)?
                } else {
                    Self::from_yaml_str(&content)?
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(FlowError::invalid_config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the values for consistency.
    pub fn validate(&self) -> FlowResult<()> {
        if self.flow_mod_timeout_ms == 0 {
            return Err(FlowError::invalid_config("flow_mod_timeout_ms must be > 0"));
        }
        if self.bulk_flow_mod_timeout_ms == 0 {
            return Err(FlowError::invalid_config(
                "bulk_flow_mod_timeout_ms must be > 0",
            ));
        }
        if self.bulk_flow_mod_timeout_ms < self.flow_mod_timeout_ms {
            return Err(FlowError::invalid_config(
                "bulk_flow_mod_timeout_ms must not be smaller than flow_mod_timeout_ms",
            ));
        }
        if self.flow_stats_timeout_ms == 0 {
            return Err(FlowError::invalid_config("flow_stats_timeout_ms must be > 0"));
        }
        if self.remove_workers == 0 {
            return Err(FlowError::invalid_config("remove_workers must be > 0"));
        }
        Ok(())
    }

    pub fn flow_mod_timeout(&self) -> Duration {
        Duration::from_millis(self.flow_mod_timeout_ms)
    }

    pub fn bulk_flow_mod_timeout(&self) -> Duration {
        Duration::from_millis(self.bulk_flow_mod_timeout_ms)
    }

    pub fn flow_stats_timeout(&self) -> Duration {
        Duration::from_millis(self.flow_stats_timeout_ms)
    }

    /// Returns the timeout for a removal that issued `rpc_count` RPCs.
    pub fn rpc_timeout(&self, rpc_count: usize, bulk: bool) -> Duration {
        if bulk || rpc_count > self.bulk_threshold {
            self.bulk_flow_mod_timeout()
        } else {
            self.flow_mod_timeout()
        }
    }
}
