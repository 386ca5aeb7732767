//! Transaction submission protocol
//!
//! Every submission runs the same sequence:
//! 1. resolve the sender ([`resolve_account`])
//! 2. choose a gas limit ([`estimate_gas`])
//! 3. submit, then emit the transaction hash
//! 4. poll for the receipt, then for confirmations if configured
//!
//! Read-only calls skip all of this and go straight to the node.

use std::sync::Arc;

use bytes::Bytes;
use runeth_primitives::{Address, H256, U256};
use serde_json::Value;

use crate::abi::{Abi, MethodDescriptor};
use crate::account::resolve_account;
use crate::args::{CallOptions, ParameterBinding};
use crate::config::TxConfig;
use crate::gas::estimate_gas;
use crate::node::{BlockId, BlockInfo, Node, Payload, Receipt, TxRequest};
use crate::outcome::{Completion, Deployment, EventSink, TxEvent, TxHandle};
use crate::TxError;

#[cfg(feature = "http")]
use crate::rpc::RpcNode;

/// Log at `info` for verbose invocations, `debug` otherwise.
macro_rules! step {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Drives calls, submissions and deployments against a [`Node`].
///
/// Cheap to clone; clones share the node.
#[derive(Clone)]
pub struct TxRunner {
    node: Arc<dyn Node>,
    config: TxConfig,
}

impl TxRunner {
    /// Runner with default configuration
    pub fn new(node: impl Node + 'static) -> Self {
        Self::with_config(Arc::new(node), TxConfig::default())
    }

    /// Runner over a shared node
    pub fn with_config(node: Arc<dyn Node>, config: TxConfig) -> Self {
        Self { node, config }
    }

    /// Runner talking JSON-RPC over HTTP to `config.rpc_url`
    #[cfg(feature = "http")]
    pub fn connect(config: TxConfig) -> Self {
        let node = RpcNode::http(&config.rpc_url);
        tracing::info!(url = %config.rpc_url, "connecting runner");
        Self::with_config(Arc::new(node), config)
    }

    /// The node
    pub fn node(&self) -> &Arc<dyn Node> {
        &self.node
    }

    /// The configuration
    pub fn config(&self) -> &TxConfig {
        &self.config
    }

    // ==================== Contract Methods ====================

    /// Submit a state-mutating call of `method` on the contract at `address`.
    ///
    /// Method lookup happens immediately; a lookup failure is still only
    /// reported once the handle is awaited.
    pub fn send_contract_tx(
        &self,
        address: Address,
        abi: &Abi,
        method: &str,
        binding: &ParameterBinding,
        mut options: CallOptions,
    ) -> TxHandle<Receipt> {
        let callback = options.on_complete.take();
        let payload = match resolve_method(abi, method, binding) {
            Ok(payload) => payload,
            Err(err) => return TxHandle::failed(err, callback),
        };
        step!(options.verbose, method, args = ?payload.args(), "contract transaction");

        let runner = self.clone();
        TxHandle::drive(callback, |r: &Receipt| Completion::Receipt(r.clone()), move |sink| async move {
            runner.submit(Some(address), payload, options, sink).await
        })
    }

    /// Execute a read-only call of `method` and decode its return value.
    ///
    /// No sender resolution or gas estimation takes place.
    pub fn send_contract_const_tx(
        &self,
        address: Address,
        abi: &Abi,
        method: &str,
        binding: &ParameterBinding,
        mut options: CallOptions,
    ) -> TxHandle<Value> {
        let callback = options.on_complete.take();
        let payload = match resolve_method(abi, method, binding) {
            Ok(payload) => payload,
            Err(err) => return TxHandle::failed(err, callback),
        };
        step!(options.verbose, method, args = ?payload.args(), "contract call");

        let node = Arc::clone(&self.node);
        TxHandle::drive(callback, |v: &Value| Completion::Value(v.clone()), move |_| async move {
            let request = TxRequest {
                from: options.from,
                to: Some(address),
                payload,
                value: options.value_or_zero(),
                gas: options.gas,
                gas_price: options.gas_price,
                nonce: None,
            };
            node.call(&request).await
        })
    }

    // ==================== Plain Transactions ====================

    /// Send a plain value transfer, or raw data when `options.data` is set.
    ///
    /// Fails with [`TxError::MissingRecipient`] without `options.to`.
    pub fn send_tx(&self, mut options: CallOptions) -> TxHandle<Receipt> {
        let callback = options.on_complete.take();
        let Some(to) = options.to else {
            return TxHandle::failed(TxError::MissingRecipient, callback);
        };
        let payload = Payload::Raw {
            data: options.data.take(),
        };
        step!(options.verbose, to = %to, value = %options.value_or_zero(), "plain transaction");

        let runner = self.clone();
        TxHandle::drive(callback, |r: &Receipt| Completion::Receipt(r.clone()), move |sink| async move {
            runner.submit(Some(to), payload, options, sink).await
        })
    }

    // ==================== Deployment ====================

    /// Deploy `bytecode` with constructor arguments taken from `binding`.
    ///
    /// The handle resolves once the creation receipt names a contract
    /// address.
    pub fn deploy(
        &self,
        abi: &Abi,
        bytecode: Bytes,
        binding: &ParameterBinding,
        mut options: CallOptions,
    ) -> TxHandle<Deployment> {
        let callback = options.on_complete.take();
        let constructor = abi.constructor().cloned();
        let args = match &constructor {
            Some(ctor) => match ctor.ordered_args(binding) {
                Ok(args) => args,
                Err(err) => return TxHandle::failed(err, callback),
            },
            None => Vec::new(),
        };
        step!(options.verbose, args = ?args, "constructor");

        let payload = Payload::Deploy {
            bytecode,
            constructor,
            args,
        };
        let runner = self.clone();
        TxHandle::drive(
            callback,
            |d: &Deployment| Completion::Deployed {
                address: d.address,
                receipt: d.receipt.clone(),
            },
            move |sink| async move {
                let receipt = runner.submit(None, payload, options, sink).await?;
                let address = receipt
                    .contract_address
                    .ok_or(TxError::ContractNotDeployed(receipt.transaction_hash))?;
                tracing::info!(address = %address, "contract deployed");
                Ok(Deployment { address, receipt })
            },
        )
    }

    // ==================== Queries ====================

    /// Balance of `address`
    pub async fn balance(&self, address: Address) -> Result<U256, TxError> {
        self.node.balance(address).await
    }

    /// Receipt for `hash`, `None` while pending
    pub async fn receipt(&self, hash: H256) -> Result<Option<Receipt>, TxError> {
        self.node.transaction_receipt(hash).await
    }

    /// Block by identifier
    pub async fn block(&self, id: BlockId) -> Result<Option<BlockInfo>, TxError> {
        self.node.block(id).await
    }

    // ==================== Protocol ====================

    async fn submit(
        &self,
        to: Option<Address>,
        payload: Payload,
        options: CallOptions,
        sink: EventSink,
    ) -> Result<Receipt, TxError> {
        let verbose = options.verbose;
        let from = resolve_account(self.node.as_ref(), options.from).await?;

        let mut request = TxRequest {
            from: Some(from),
            to,
            payload,
            value: options.value_or_zero(),
            gas: None,
            gas_price: options.gas_price,
            nonce: options.nonce,
        };

        let gas = estimate_gas(self.config.gas_policy(), &options, |cap| {
            let simulation = TxRequest {
                gas: Some(cap),
                gas_price: None,
                nonce: None,
                ..request.clone()
            };
            let node = Arc::clone(&self.node);
            async move { node.estimate_gas(&simulation).await }
        })
        .await?;
        step!(verbose, from = %from, gas, "gas selected");

        request.gas = Some(gas);
        let hash = self.node.send_transaction(&request).await?;
        step!(verbose, hash = %hash, "transaction submitted");
        sink.submitted(hash);

        self.wait_for_receipt(hash, &sink).await
    }

    async fn wait_for_receipt(&self, hash: H256, sink: &EventSink) -> Result<Receipt, TxError> {
        let interval = self.config.poll_interval();

        let receipt = loop {
            if let Some(receipt) = self.node.transaction_receipt(hash).await? {
                break receipt;
            }
            tokio::time::sleep(interval).await;
        };

        if !receipt.status {
            tracing::warn!(hash = %hash, "transaction reverted");
            return Err(TxError::Reverted(hash));
        }
        tracing::debug!(hash = %hash, block = ?receipt.block_number, gas_used = receipt.gas_used, "receipt");
        sink.emit(TxEvent::Receipt(receipt.clone()));

        let wanted = self.config.confirmations;
        if wanted == 0 {
            return Ok(receipt);
        }

        let mut mined = receipt.block_number;
        let mut seen = 0;
        loop {
            let head = self.node.block_number().await?;
            let depth = head.saturating_sub(*mined.get_or_insert(head));
            while seen < depth.min(wanted) {
                seen += 1;
                sink.emit(TxEvent::Confirmation {
                    count: seen,
                    receipt: receipt.clone(),
                });
            }
            if seen >= wanted {
                return Ok(receipt);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Look up `method` and order its arguments
fn resolve_method(abi: &Abi, method: &str, binding: &ParameterBinding) -> Result<Payload, TxError> {
    let method: Arc<MethodDescriptor> = abi.find_method(method, binding)?;
    let args = method.ordered_args(binding)?;
    Ok(Payload::Method { method, args })
}
