//! JSON-RPC transport layer

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::TxError;

/// Transport trait for RPC communication (object-safe)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an RPC request and get the `result` member of the response
    async fn request_json(&self, method: &str, params: Vec<Value>) -> Result<Value, TxError>;
}

/// Helper to deserialize a response
pub fn deserialize_response<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, TxError> {
    serde_json::from_value(value).map_err(|e| TxError::Serialization(e.to_string()))
}

/// A request seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// RPC method
    pub method: String,
    /// Positional params
    pub params: Vec<Value>,
}

#[derive(Default)]
struct MockState {
    queued: HashMap<String, VecDeque<Result<Value, TxError>>>,
    fixed: HashMap<String, Value>,
    requests: Vec<RecordedRequest>,
}

/// Canned-response transport for testing.
///
/// Queued responses are consumed first, then the fixed response for the
/// method, then a built-in default. Every request is recorded.
pub struct MockTransport {
    state: Mutex<MockState>,
    defaults: HashMap<&'static str, Value>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert("eth_accounts", Value::Array(vec![]));
        defaults.insert("eth_blockNumber", Value::String("0x100".to_string()));
        defaults.insert("eth_getBalance", Value::String("0xde0b6b3a7640000".to_string())); // 1 ETH
        defaults.insert("eth_estimateGas", Value::String("0x5208".to_string())); // 21000
        defaults.insert("eth_call", Value::String("0x".to_string()));
        defaults.insert("eth_getTransactionReceipt", Value::Null);
        defaults.insert("eth_getBlockByNumber", Value::Null);

        Self {
            state: Mutex::new(MockState::default()),
            defaults,
        }
    }

    /// Answer every `method` request with `response`
    pub fn set_response(&self, method: &str, response: Value) {
        self.state.lock().fixed.insert(method.to_string(), response);
    }

    /// Answer the next `method` request with `response`
    pub fn push_response(&self, method: &str, response: Value) {
        self.push_result(method, Ok(response));
    }

    /// Fail the next `method` request with `error`
    pub fn push_error(&self, method: &str, error: TxError) {
        self.push_result(method, Err(error));
    }

    fn push_result(&self, method: &str, result: Result<Value, TxError>) {
        self.state
            .lock()
            .queued
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests received for `method`
    pub fn requests_for(&self, method: &str) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Clear custom responses and the request log
    pub fn clear(&self) {
        *self.state.lock() = MockState::default();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request_json(&self, method: &str, params: Vec<Value>) -> Result<Value, TxError> {
        let mut state = self.state.lock();
        state.requests.push(RecordedRequest {
            method: method.to_string(),
            params,
        });

        if let Some(result) = state.queued.get_mut(method).and_then(VecDeque::pop_front) {
            return result;
        }
        if let Some(response) = state.fixed.get(method) {
            return Ok(response.clone());
        }
        if let Some(response) = self.defaults.get(method) {
            return Ok(response.clone());
        }

        Err(TxError::Rpc {
            code: -32601,
            message: format!("Method not found: {}", method),
        })
    }
}

/// HTTP transport for real RPC communication
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    request_id: std::sync::atomic::AtomicU64,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            request_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.request_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for HttpTransport {
    async fn request_json(&self, method: &str, params: Vec<Value>) -> Result<Value, TxError> {
        let id = self.next_id();
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::trace!(id, method, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TxError::Transport(e.to_string()))?;

        let response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| TxError::Transport(e.to_string()))?;

        if let Some(error) = response.error {
            tracing::debug!(id, method, code = error.code, "rpc error: {}", error.message);
            return Err(TxError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        // a missing result means null (e.g. a pending receipt)
        Ok(response.result.unwrap_or(Value::Null))
    }
}

#[cfg(feature = "http")]
#[derive(serde::Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[cfg(feature = "http")]
#[derive(serde::Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}
