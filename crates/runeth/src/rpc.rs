//! [`Node`] over Ethereum JSON-RPC

use async_trait::async_trait;
use runeth_primitives::{Address, BlockNumber, Gas, H256, U256};
use serde_json::{Map, Value};

use crate::abi::u256_from_str;
use crate::node::{quantity, BlockId, BlockInfo, Node, Payload, Receipt, TxRequest};
use crate::transport::{deserialize_response, Transport};
use crate::TxError;

#[cfg(feature = "http")]
use crate::transport::HttpTransport;

/// Node backed by a JSON-RPC endpoint.
///
/// Transactions are signed by the node (`eth_sendTransaction`), so the
/// sender must be one of its unlocked accounts.
pub struct RpcNode<T> {
    transport: T,
}

#[cfg(feature = "http")]
impl RpcNode<HttpTransport> {
    /// Node at an HTTP endpoint
    pub fn http(url: &str) -> Self {
        Self::new(HttpTransport::new(url))
    }
}

impl<T: Transport> RpcNode<T> {
    /// Node over a custom transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn request<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<R, TxError> {
        let value = self.transport.request_json(method, params).await?;
        deserialize_response(value)
    }

    async fn request_quantity(&self, method: &str, params: Vec<Value>) -> Result<u64, TxError> {
        let value = self.transport.request_json(method, params).await?;
        quantity::parse_u64(&value).map_err(TxError::Serialization)
    }
}

#[async_trait]
impl<T: Transport> Node for RpcNode<T> {
    async fn accounts(&self) -> Result<Vec<Address>, TxError> {
        self.request("eth_accounts", vec![]).await
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<Gas, TxError> {
        self.request_quantity("eth_estimateGas", vec![tx_object(request)?])
            .await
    }

    async fn call(&self, request: &TxRequest) -> Result<Value, TxError> {
        let result: String = self
            .request(
                "eth_call",
                vec![tx_object(request)?, serde_json::to_value(BlockId::Latest)?],
            )
            .await?;

        match &request.payload {
            Payload::Method { method, .. } => method.decode_output(&parse_hex_bytes(&result)?),
            _ => Ok(Value::String(result)),
        }
    }

    async fn send_transaction(&self, request: &TxRequest) -> Result<H256, TxError> {
        let result: String = self
            .request("eth_sendTransaction", vec![tx_object(request)?])
            .await?;
        Ok(H256::from_hex(&result)?)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, TxError> {
        self.request("eth_getTransactionReceipt", vec![Value::String(hash.to_hex())])
            .await
    }

    async fn block_number(&self) -> Result<BlockNumber, TxError> {
        self.request_quantity("eth_blockNumber", vec![]).await
    }

    async fn balance(&self, address: Address) -> Result<U256, TxError> {
        let result: String = self
            .request(
                "eth_getBalance",
                vec![
                    Value::String(address.to_hex()),
                    serde_json::to_value(BlockId::Latest)?,
                ],
            )
            .await?;
        u256_from_str(&result).map_err(|e| TxError::Serialization(e.to_string()))
    }

    async fn block(&self, id: BlockId) -> Result<Option<BlockInfo>, TxError> {
        self.request(
            "eth_getBlockByNumber",
            vec![serde_json::to_value(id)?, Value::Bool(false)],
        )
        .await
    }
}

// ==================== Helper Functions ====================

/// JSON-RPC transaction object for `request`
fn tx_object(request: &TxRequest) -> Result<Value, TxError> {
    let mut obj = Map::new();

    if let Some(from) = &request.from {
        obj.insert("from".into(), Value::String(from.to_hex()));
    }
    if let Some(to) = &request.to {
        obj.insert("to".into(), Value::String(to.to_hex()));
    }
    if let Some(gas) = request.gas {
        obj.insert("gas".into(), Value::String(format!("0x{:x}", gas)));
    }
    if let Some(gas_price) = request.gas_price {
        obj.insert("gasPrice".into(), Value::String(format!("0x{:x}", gas_price)));
    }
    obj.insert("value".into(), Value::String(format!("{:#x}", request.value)));
    if let Some(nonce) = request.nonce {
        obj.insert("nonce".into(), Value::String(format!("0x{:x}", nonce)));
    }
    if let Some(data) = request.payload.data()? {
        obj.insert("data".into(), Value::String(format!("0x{}", hex::encode(&data))));
    }

    Ok(Value::Object(obj))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, TxError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Abi;
    use crate::transport::MockTransport;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Arc;

    const SENDER: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0ab3d";
    const TOKEN: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const HASH: &str = "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b";

    fn erc20() -> Abi {
        Abi::from_json(
            r#"[
            {"type":"function","name":"transfer","inputs":[{"name":"_to","type":"address"},{"name":"_value","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]},
            {"type":"function","name":"balanceOf","constant":true,"inputs":[{"name":"_owner","type":"address"}],"outputs":[{"name":"balance","type":"uint256"}]}
        ]"#,
        )
        .unwrap()
    }

    fn method_request(abi: &Abi, index: usize, args: Vec<Value>) -> TxRequest {
        let mut request = TxRequest::new(
            Some(Address::from_hex(TOKEN).unwrap()),
            Payload::Method {
                method: Arc::clone(&abi.functions()[index]),
                args,
            },
        );
        request.from = Some(Address::from_hex(SENDER).unwrap());
        request
    }

    #[test]
    fn test_tx_object_fields() {
        let abi = erc20();
        let mut request = method_request(&abi, 0, vec![json!(SENDER), json!(1000)]);
        request.gas = Some(31_000);
        request.gas_price = Some(1_000_000_000);
        request.value = U256::from(255);

        let obj = tx_object(&request).unwrap();
        assert_eq!(obj["from"], json!(SENDER));
        assert_eq!(obj["to"], json!(TOKEN));
        assert_eq!(obj["gas"], json!("0x7918"));
        assert_eq!(obj["gasPrice"], json!("0x3b9aca00"));
        assert_eq!(obj["value"], json!("0xff"));
        assert!(obj.get("nonce").is_none());
        assert!(obj["data"].as_str().unwrap().starts_with("0xa9059cbb"));
    }

    #[test]
    fn test_tx_object_zero_value_and_raw_payload() {
        let mut request = TxRequest::new(None, Payload::Raw { data: None });
        request.nonce = Some(0);
        let obj = tx_object(&request).unwrap();
        assert_eq!(obj["value"], json!("0x0"));
        assert_eq!(obj["nonce"], json!("0x0"));
        assert!(obj.get("data").is_none());
        assert!(obj.get("to").is_none());

        let request = TxRequest::new(
            None,
            Payload::Raw {
                data: Some(Bytes::from_static(&[0xde, 0xad])),
            },
        );
        assert_eq!(tx_object(&request).unwrap()["data"], json!("0xdead"));
    }

    #[tokio::test]
    async fn test_accounts_and_block_number() {
        let transport = MockTransport::new();
        transport.set_response("eth_accounts", json!([SENDER]));
        let node = RpcNode::new(transport);

        assert_eq!(node.accounts().await.unwrap(), vec![Address::from_hex(SENDER).unwrap()]);
        assert_eq!(node.block_number().await.unwrap(), 256);
    }

    #[tokio::test]
    async fn test_estimate_and_send() {
        let transport = MockTransport::new();
        transport.set_response("eth_sendTransaction", json!(HASH));
        let node = RpcNode::new(transport);
        let abi = erc20();
        let request = method_request(&abi, 0, vec![json!(SENDER), json!(1)]);

        assert_eq!(node.estimate_gas(&request).await.unwrap(), 21000);
        assert_eq!(node.send_transaction(&request).await.unwrap(), H256::from_hex(HASH).unwrap());

        let sent = node.transport().requests_for("eth_sendTransaction");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].params[0]["from"], json!(SENDER));
    }

    #[tokio::test]
    async fn test_call_decodes_outputs() {
        let transport = MockTransport::new();
        transport.set_response(
            "eth_call",
            json!("0x00000000000000000000000000000000000000000000000000000000000003e8"),
        );
        let node = RpcNode::new(transport);
        let abi = erc20();
        let request = method_request(&abi, 1, vec![json!(SENDER)]);

        assert_eq!(node.call(&request).await.unwrap(), json!("1000"));
        let calls = node.transport().requests_for("eth_call");
        assert_eq!(calls[0].params[1], json!("latest"));
    }

    #[tokio::test]
    async fn test_receipt_pending_then_mined() {
        let transport = MockTransport::new();
        transport.push_response("eth_getTransactionReceipt", Value::Null);
        transport.push_response(
            "eth_getTransactionReceipt",
            json!({"transactionHash": HASH, "blockNumber": "0x2", "status": "0x1", "gasUsed": "0x5208"}),
        );
        let node = RpcNode::new(transport);
        let hash = H256::from_hex(HASH).unwrap();

        assert!(node.transaction_receipt(hash).await.unwrap().is_none());
        let receipt = node.transaction_receipt(hash).await.unwrap().unwrap();
        assert_eq!(receipt.block_number, Some(2));
    }

    #[tokio::test]
    async fn test_balance_and_block() {
        let transport = MockTransport::new();
        transport.set_response(
            "eth_getBlockByNumber",
            json!({
                "number": "0x10",
                "hash": HASH,
                "parentHash": HASH,
                "timestamp": "0x5f5e100",
                "gasLimit": "0x47b760",
                "gasUsed": "0x0",
                "transactions": []
            }),
        );
        let node = RpcNode::new(transport);

        let balance = node.balance(Address::from_hex(SENDER).unwrap()).await.unwrap();
        assert_eq!(balance, U256::from(1_000_000_000_000_000_000u64));

        let block = node.block(BlockId::Number(16)).await.unwrap().unwrap();
        assert_eq!(block.number, Some(16));
        assert_eq!(block.gas_limit, 4_700_000);
        let sent = node.transport().requests_for("eth_getBlockByNumber");
        assert_eq!(sent[0].params, vec![json!("0x10"), json!(false)]);
    }

    #[tokio::test]
    async fn test_rpc_error_passes_through() {
        let transport = MockTransport::new();
        transport.push_error(
            "eth_estimateGas",
            TxError::Rpc {
                code: -32000,
                message: "execution reverted".into(),
            },
        );
        let node = RpcNode::new(transport);
        let abi = erc20();
        let request = method_request(&abi, 0, vec![json!(SENDER), json!(1)]);
        let err = node.estimate_gas(&request).await.unwrap_err();
        assert!(err.is_external());
    }
}
