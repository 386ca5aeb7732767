//! Runner configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gas::{GasPolicy, DEFAULT_EXTRA_GAS, DEFAULT_GAS_CEILING};
use crate::TxError;

/// Settings for a [`TxRunner`](crate::TxRunner)
///
/// ```toml
/// gas_ceiling = 4700000
/// default_extra_gas = 10000
/// poll_interval_ms = 500
/// confirmations = 0
/// rpc_url = "http://localhost:8545"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxConfig {
    /// Gas cap handed to simulations
    #[serde(default = "default_gas_ceiling")]
    pub gas_ceiling: u64,
    /// Margin added to simulated gas when the caller gives none
    #[serde(default = "default_extra_gas")]
    pub default_extra_gas: u64,
    /// Delay between receipt and block number polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Confirmations to wait for after the receipt
    #[serde(default)]
    pub confirmations: u64,
    /// JSON-RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

fn default_gas_ceiling() -> u64 {
    DEFAULT_GAS_CEILING
}

fn default_extra_gas() -> u64 {
    DEFAULT_EXTRA_GAS
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            gas_ceiling: default_gas_ceiling(),
            default_extra_gas: default_extra_gas(),
            poll_interval_ms: default_poll_interval_ms(),
            confirmations: 0,
            rpc_url: default_rpc_url(),
        }
    }
}

impl TxConfig {
    /// Parse a TOML document; absent keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, TxError> {
        let config: TxConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TxError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TxError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, TxError> {
        toml::to_string(self).map_err(|e| TxError::Config(e.to_string()))
    }

    /// Gas policy derived from this config
    pub fn gas_policy(&self) -> GasPolicy {
        GasPolicy {
            ceiling: self.gas_ceiling,
            default_extra_gas: self.default_extra_gas,
        }
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), TxError> {
        if self.gas_ceiling == 0 {
            return Err(TxError::Config("gas_ceiling must be positive".into()));
        }
        Ok(())
    }
}
