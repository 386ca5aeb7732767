//! The node capability the orchestration layer drives

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use runeth_primitives::{Address, BlockNumber, Gas, Nonce, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::abi::MethodDescriptor;
use crate::TxError;

/// Block identifier for RPC queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockId {
    /// Block number
    Number(BlockNumber),
    /// Latest block
    #[default]
    Latest,
    /// Pending block
    Pending,
    /// Genesis block
    Earliest,
}

impl From<BlockNumber> for BlockId {
    fn from(n: BlockNumber) -> Self {
        BlockId::Number(n)
    }
}

impl Serialize for BlockId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            BlockId::Number(n) => serializer.serialize_str(&format!("0x{:x}", n)),
            BlockId::Latest => serializer.serialize_str("latest"),
            BlockId::Pending => serializer.serialize_str("pending"),
            BlockId::Earliest => serializer.serialize_str("earliest"),
        }
    }
}

/// What a transaction or call carries
#[derive(Debug, Clone)]
pub enum Payload {
    /// A contract method with arguments in declaration order
    Method {
        /// The resolved method
        method: Arc<MethodDescriptor>,
        /// Ordered argument values
        args: Vec<Value>,
    },
    /// Contract creation
    Deploy {
        /// Creation bytecode
        bytecode: Bytes,
        /// Constructor, if the ABI declares one
        constructor: Option<Arc<MethodDescriptor>>,
        /// Ordered constructor arguments
        args: Vec<Value>,
    },
    /// Plain transaction, optionally with raw call data
    Raw {
        /// Call data
        data: Option<Bytes>,
    },
}

impl Payload {
    /// Serialized call data: selector plus arguments, creation code plus
    /// constructor arguments, or the raw data.
    pub fn data(&self) -> Result<Option<Bytes>, TxError> {
        match self {
            Payload::Method { method, args } => Ok(Some(method.encode_call(args)?.into())),
            Payload::Deploy {
                bytecode,
                constructor,
                args,
            } => {
                let mut data = bytecode.to_vec();
                match constructor {
                    Some(ctor) => data.extend(ctor.encode_args(args)?),
                    None if !args.is_empty() => {
                        return Err(TxError::invalid("constructor arguments without a constructor"));
                    }
                    None => {}
                }
                Ok(Some(data.into()))
            }
            Payload::Raw { data } => Ok(data.clone()),
        }
    }

    /// Ordered argument values (empty for raw payloads)
    pub fn args(&self) -> &[Value] {
        match self {
            Payload::Method { args, .. } | Payload::Deploy { args, .. } => args,
            Payload::Raw { .. } => &[],
        }
    }
}

/// A transaction or call request as handed to the node
#[derive(Debug, Clone)]
pub struct TxRequest {
    /// Sender; always set for submissions and simulations
    pub from: Option<Address>,
    /// Recipient; `None` for contract creation
    pub to: Option<Address>,
    /// Method, creation or raw payload
    pub payload: Payload,
    /// Attached wei
    pub value: U256,
    /// Gas limit (the cap, when simulating)
    pub gas: Option<Gas>,
    /// Gas price
    pub gas_price: Option<u128>,
    /// Nonce
    pub nonce: Option<Nonce>,
}

impl TxRequest {
    /// Request with zero value and no gas settings
    pub fn new(to: Option<Address>, payload: Payload) -> Self {
        Self {
            from: None,
            to,
            payload,
            value: U256::zero(),
            gas: None,
            gas_price: None,
            nonce: None,
        }
    }

    /// Name of the invoked method, if any
    pub fn method_name(&self) -> Option<&str> {
        match &self.payload {
            Payload::Method { method, .. } => Some(&method.name),
            _ => None,
        }
    }
}

/// Transaction receipt as reported by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Transaction hash
    pub transaction_hash: H256,
    /// Block number the transaction was mined in
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<BlockNumber>,
    /// Block hash the transaction was mined in
    #[serde(default)]
    pub block_hash: Option<H256>,
    /// Execution succeeded
    #[serde(default = "default_status", with = "quantity::flag")]
    pub status: bool,
    /// Gas used by this transaction
    #[serde(with = "quantity")]
    pub gas_used: Gas,
    /// Gas used in the block up to and including this transaction
    #[serde(default, with = "quantity")]
    pub cumulative_gas_used: Gas,
    /// Created contract, for creation transactions
    #[serde(default)]
    pub contract_address: Option<Address>,
}

// pre-Byzantium receipts carry no status
fn default_status() -> bool {
    true
}

/// Block summary returned by [`Node::block`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    /// Block number (`None` when pending)
    #[serde(default, with = "quantity::option")]
    pub number: Option<BlockNumber>,
    /// Block hash (`None` when pending)
    #[serde(default)]
    pub hash: Option<H256>,
    /// Parent hash
    pub parent_hash: H256,
    /// Unix timestamp
    #[serde(with = "quantity")]
    pub timestamp: u64,
    /// Gas limit
    #[serde(with = "quantity")]
    pub gas_limit: Gas,
    /// Gas used
    #[serde(with = "quantity")]
    pub gas_used: Gas,
    /// Transaction hashes
    #[serde(default)]
    pub transactions: Vec<H256>,
}

/// Node capability (object-safe)
///
/// Implemented by [`RpcNode`](crate::RpcNode) over JSON-RPC and by
/// [`MockNode`](crate::MockNode) for tests.
#[async_trait]
pub trait Node: Send + Sync {
    /// Accounts the node can sign for
    async fn accounts(&self) -> Result<Vec<Address>, TxError>;

    /// Simulate `request` and report the gas it consumes
    async fn estimate_gas(&self, request: &TxRequest) -> Result<Gas, TxError>;

    /// Execute a read-only call and decode its return value
    async fn call(&self, request: &TxRequest) -> Result<Value, TxError>;

    /// Submit a transaction signed by the node
    async fn send_transaction(&self, request: &TxRequest) -> Result<H256, TxError>;

    /// Receipt for `hash`, `None` while pending
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, TxError>;

    /// Current block number
    async fn block_number(&self) -> Result<BlockNumber, TxError>;

    /// Balance of `address` at the latest block
    async fn balance(&self, address: Address) -> Result<U256, TxError>;

    /// Block by identifier
    async fn block(&self, id: BlockId) -> Result<Option<BlockInfo>, TxError>;
}

/// JSON-RPC quantity encoding (`0x`-prefixed hex) for integers.
pub(crate) mod quantity {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub(crate) fn parse_u64(value: &Value) -> Result<u64, String> {
        match value {
            Value::String(s) => match s.strip_prefix("0x") {
                Some("") => Ok(0),
                Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| e.to_string()),
                None => s.parse().map_err(|_| format!("invalid quantity: {}", s)),
            },
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| format!("invalid quantity: {}", n)),
            other => Err(format!("invalid quantity: {}", other)),
        }
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse_u64(&value).map_err(D::Error::custom)
    }

    pub mod option {
        use super::*;
        use serde::de::Error as _;

        pub fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            match Value::deserialize(deserializer)? {
                Value::Null => Ok(None),
                value => parse_u64(&value).map(Some).map_err(D::Error::custom),
            }
        }
    }

    /// `0x1` / `0x0` status flag
    pub mod flag {
        use super::*;
        use serde::de::Error as _;

        pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(if *value { "0x1" } else { "0x0" })
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
            match Value::deserialize(deserializer)? {
                Value::Bool(b) => Ok(b),
                Value::Null => Ok(true),
                value => parse_u64(&value).map(|n| n != 0).map_err(D::Error::custom),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Abi;
    use serde_json::json;

    #[test]
    fn test_block_id_serialization() {
        assert_eq!(serde_json::to_value(BlockId::Latest).unwrap(), json!("latest"));
        assert_eq!(serde_json::to_value(BlockId::from(255)).unwrap(), json!("0xff"));
        assert_eq!(serde_json::to_value(BlockId::Earliest).unwrap(), json!("earliest"));
    }

    #[test]
    fn test_receipt_from_rpc_json() {
        let receipt: Receipt = serde_json::from_value(json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "blockHash": null,
            "status": "0x1",
            "gasUsed": "0x5208",
            "cumulativeGasUsed": "0x5208",
            "contractAddress": null,
            "logs": []
        }))
        .unwrap();

        assert_eq!(receipt.block_number, Some(436));
        assert!(receipt.status);
        assert_eq!(receipt.gas_used, 21000);
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_receipt_failed_status_and_defaults() {
        let receipt: Receipt = serde_json::from_value(json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "status": "0x0",
            "gasUsed": "0x0",
            "contractAddress": "0x742d35cc6634c0532925a3b844bc9e7595f0ab3d"
        }))
        .unwrap();
        assert!(!receipt.status);
        assert_eq!(receipt.block_number, None);
        assert!(receipt.contract_address.is_some());

        let legacy: Receipt = serde_json::from_value(json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "gasUsed": "0x1"
        }))
        .unwrap();
        assert!(legacy.status);
    }

    #[test]
    fn test_receipt_serializes_quantities() {
        let receipt = Receipt {
            transaction_hash: H256::ZERO,
            block_number: Some(16),
            block_hash: None,
            status: false,
            gas_used: 21000,
            cumulative_gas_used: 0,
            contract_address: None,
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["blockNumber"], json!("0x10"));
        assert_eq!(json["status"], json!("0x0"));
        assert_eq!(json["gasUsed"], json!("0x5208"));
    }

    #[test]
    fn test_payload_data() {
        let abi = Abi::from_json(
            r#"[{"type":"constructor","inputs":[{"name":"_supply","type":"uint256"}]},
                {"type":"function","name":"flip","inputs":[]}]"#,
        )
        .unwrap();

        let deploy = Payload::Deploy {
            bytecode: Bytes::from_static(&[0x60, 0x80]),
            constructor: abi.constructor().cloned(),
            args: vec![json!(1)],
        };
        let data = deploy.data().unwrap().unwrap();
        assert_eq!(data.len(), 2 + 32);
        assert_eq!(&data[..2], &[0x60, 0x80]);
        assert_eq!(data[33], 1);

        let flip = Payload::Method {
            method: abi.functions()[0].clone(),
            args: vec![],
        };
        assert_eq!(flip.data().unwrap().unwrap().len(), 4);

        assert_eq!(Payload::Raw { data: None }.data().unwrap(), None);
    }

    #[test]
    fn test_deploy_args_without_constructor() {
        let payload = Payload::Deploy {
            bytecode: Bytes::new(),
            constructor: None,
            args: vec![json!(1)],
        };
        assert!(matches!(payload.data(), Err(TxError::InvalidArguments(_))));
    }
}
