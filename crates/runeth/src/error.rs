//! Error taxonomy for transaction orchestration

use runeth_primitives::{Gas, H256};
use thiserror::Error;

/// Every failure an invocation can end with.
///
/// All variants are terminal: nothing in this crate retries. The type is
/// `Clone` because a single failure is delivered to the event stream, the
/// completion callback and the awaited future.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// Malformed call-site arguments or ABI description
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// No ABI function with this name
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A function with the requested name exists but a parameter is absent
    #[error("param {0} not found")]
    MissingParameter(String),

    /// No explicit sender and the node controls no accounts
    #[error("no account available")]
    NoAccountAvailable,

    /// Simulation consumed the whole gas ceiling
    #[error("gas limit reached: {used} (ceiling {ceiling})")]
    GasLimitExceeded {
        /// Simulated gas usage
        used: Gas,
        /// Configured simulation ceiling
        ceiling: Gas,
    },

    /// Plain transfer without a recipient
    #[error("to is required")]
    MissingRecipient,

    /// Two ABI functions share one name
    #[error("overloaded function not supported: {0}")]
    UnsupportedOverload(String),

    /// Transaction was mined with a failed status
    #[error("transaction {0} reverted")]
    Reverted(H256),

    /// Creation transaction was mined without producing a contract address
    #[error("transaction {0} did not deploy a contract")]
    ContractNotDeployed(H256),

    /// Transport/network error
    #[error("transport error: {0}")]
    Transport(String),

    /// RPC error from node
    #[error("RPC error: {code} - {message}")]
    Rpc {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Response could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Configuration could not be read or parsed
    #[error("config error: {0}")]
    Config(String),
}

impl TxError {
    /// Construct an [`TxError::InvalidArguments`]
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TxError::InvalidArguments(msg.into())
    }

    /// Whether the error came from the node or the transport rather
    /// than from local validation.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            TxError::Transport(_)
                | TxError::Rpc { .. }
                | TxError::Serialization(_)
                | TxError::InvalidHex(_)
        )
    }
}

impl From<hex::FromHexError> for TxError {
    fn from(e: hex::FromHexError) -> Self {
        TxError::InvalidHex(e.to_string())
    }
}

impl From<serde_json::Error> for TxError {
    fn from(e: serde_json::Error) -> Self {
        TxError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for TxError {
    fn from(e: toml::de::Error) -> Self {
        TxError::Config(e.to_string())
    }
}

impl From<runeth_primitives::AddressError> for TxError {
    fn from(e: runeth_primitives::AddressError) -> Self {
        TxError::InvalidArguments(e.to_string())
    }
}

impl From<runeth_primitives::HashError> for TxError {
    fn from(e: runeth_primitives::HashError) -> Self {
        TxError::InvalidHex(e.to_string())
    }
}
