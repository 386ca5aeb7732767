//! In-memory [`Node`] for tests

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use runeth_primitives::{Address, BlockNumber, Gas, H256, U256};
use serde_json::Value;

use crate::node::{BlockId, BlockInfo, Node, Receipt, TxRequest};
use crate::TxError;

/// Account the mock controls unless told otherwise
pub const MOCK_ACCOUNT: Address = Address::from_bytes([0x11; 20]);

/// Address the mock assigns to deployed contracts unless told otherwise
pub const MOCK_CONTRACT: Address = Address::from_bytes([0xc0; 20]);

struct MockNodeState {
    accounts: Vec<Address>,
    gas_estimate: Result<Gas, TxError>,
    call_result: Result<Value, TxError>,
    send_error: Option<TxError>,
    receipt_error: Option<TxError>,
    revert: bool,
    deploy_address: Option<Address>,
    pending_polls: u32,
    block_number: BlockNumber,
    block_step: u64,
    balances: HashMap<Address, U256>,
    receipts: HashMap<H256, Receipt>,
    next_hash: u64,

    accounts_calls: usize,
    estimates: Vec<TxRequest>,
    calls: Vec<TxRequest>,
    sent: Vec<TxRequest>,
    receipt_polls: usize,
}

/// Programmable node that mines every submission instantly and records
/// every request.
///
/// ```rust
/// use runeth::MockNode;
///
/// let node = MockNode::new().with_gas_estimate(50_000).with_pending_polls(2);
/// assert_eq!(node.sent_requests().len(), 0);
/// ```
pub struct MockNode {
    state: Mutex<MockNodeState>,
}

impl MockNode {
    /// One account, 21000 gas, instant receipts, block 1 advancing by one
    /// per `block_number` query
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockNodeState {
                accounts: vec![MOCK_ACCOUNT],
                gas_estimate: Ok(21_000),
                call_result: Ok(Value::Null),
                send_error: None,
                receipt_error: None,
                revert: false,
                deploy_address: Some(MOCK_CONTRACT),
                pending_polls: 0,
                block_number: 1,
                block_step: 1,
                balances: HashMap::new(),
                receipts: HashMap::new(),
                next_hash: 1,
                accounts_calls: 0,
                estimates: Vec::new(),
                calls: Vec::new(),
                sent: Vec::new(),
                receipt_polls: 0,
            }),
        }
    }

    // ==================== Programming ====================

    /// Accounts returned by `accounts`
    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.state.get_mut().accounts = accounts;
        self
    }

    /// Gas reported by every simulation
    pub fn with_gas_estimate(mut self, gas: Gas) -> Self {
        self.state.get_mut().gas_estimate = Ok(gas);
        self
    }

    /// Fail every simulation
    pub fn fail_estimate(mut self, error: TxError) -> Self {
        self.state.get_mut().gas_estimate = Err(error);
        self
    }

    /// Value returned by every read-only call
    pub fn with_call_result(mut self, value: Value) -> Self {
        self.state.get_mut().call_result = Ok(value);
        self
    }

    /// Fail every read-only call
    pub fn fail_call(mut self, error: TxError) -> Self {
        self.state.get_mut().call_result = Err(error);
        self
    }

    /// Reject every submission
    pub fn fail_send(mut self, error: TxError) -> Self {
        self.state.get_mut().send_error = Some(error);
        self
    }

    /// Fail every receipt query once the submission itself went through
    pub fn fail_receipt(mut self, error: TxError) -> Self {
        self.state.get_mut().receipt_error = Some(error);
        self
    }

    /// Mine every submission with a failed status
    pub fn with_reverts(mut self) -> Self {
        self.state.get_mut().revert = true;
        self
    }

    /// Address assigned to the next contract creation
    pub fn with_deploy_address(mut self, address: Address) -> Self {
        self.state.get_mut().deploy_address = Some(address);
        self
    }

    /// Mine creation transactions without a contract address
    pub fn without_contract_address(mut self) -> Self {
        self.state.get_mut().deploy_address = None;
        self
    }

    /// Report `polls` receipt queries as pending before the first receipt
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.state.get_mut().pending_polls = polls;
        self
    }

    /// Starting block number and how far it advances per query
    pub fn with_block_number(mut self, number: BlockNumber, step: u64) -> Self {
        let state = self.state.get_mut();
        state.block_number = number;
        state.block_step = step;
        self
    }

    /// Balance reported for `address`
    pub fn with_balance(mut self, address: Address, balance: U256) -> Self {
        self.state.get_mut().balances.insert(address, balance);
        self
    }

    // ==================== Inspection ====================

    /// Number of `accounts` queries
    pub fn accounts_calls(&self) -> usize {
        self.state.lock().accounts_calls
    }

    /// Simulated requests, in order
    pub fn estimate_requests(&self) -> Vec<TxRequest> {
        self.state.lock().estimates.clone()
    }

    /// Read-only call requests, in order
    pub fn call_requests(&self) -> Vec<TxRequest> {
        self.state.lock().calls.clone()
    }

    /// Submitted requests, in order
    pub fn sent_requests(&self) -> Vec<TxRequest> {
        self.state.lock().sent.clone()
    }

    /// Number of receipt queries
    pub fn receipt_polls(&self) -> usize {
        self.state.lock().receipt_polls
    }
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for MockNode {
    async fn accounts(&self) -> Result<Vec<Address>, TxError> {
        let mut state = self.state.lock();
        state.accounts_calls += 1;
        Ok(state.accounts.clone())
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<Gas, TxError> {
        let mut state = self.state.lock();
        state.estimates.push(request.clone());
        state.gas_estimate.clone()
    }

    async fn call(&self, request: &TxRequest) -> Result<Value, TxError> {
        let mut state = self.state.lock();
        state.calls.push(request.clone());
        state.call_result.clone()
    }

    async fn send_transaction(&self, request: &TxRequest) -> Result<H256, TxError> {
        let mut state = self.state.lock();
        state.sent.push(request.clone());
        if let Some(err) = &state.send_error {
            return Err(err.clone());
        }

        let mut bytes = [0xaa; 32];
        bytes[24..].copy_from_slice(&state.next_hash.to_be_bytes());
        state.next_hash += 1;
        let hash = H256::from_bytes(bytes);

        let simulated = state.gas_estimate.clone().unwrap_or(21_000);
        let gas_used = request.gas.map_or(simulated, |limit| limit.min(simulated));
        let receipt = Receipt {
            transaction_hash: hash,
            block_number: Some(state.block_number),
            block_hash: None,
            status: !state.revert,
            gas_used,
            cumulative_gas_used: gas_used,
            contract_address: if request.to.is_none() {
                state.deploy_address
            } else {
                None
            },
        };
        state.receipts.insert(hash, receipt);
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, TxError> {
        let mut state = self.state.lock();
        state.receipt_polls += 1;
        if let Some(error) = &state.receipt_error {
            return Err(error.clone());
        }
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn block_number(&self) -> Result<BlockNumber, TxError> {
        let mut state = self.state.lock();
        let current = state.block_number;
        state.block_number += state.block_step;
        Ok(current)
    }

    async fn balance(&self, address: Address) -> Result<U256, TxError> {
        Ok(self
            .state
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn block(&self, id: BlockId) -> Result<Option<BlockInfo>, TxError> {
        let state = self.state.lock();
        let number = match id {
            BlockId::Number(n) if n > state.block_number => return Ok(None),
            BlockId::Number(n) => n,
            BlockId::Earliest => 0,
            BlockId::Latest | BlockId::Pending => state.block_number,
        };
        let transactions = state
            .receipts
            .values()
            .filter(|r| r.block_number == Some(number))
            .map(|r| r.transaction_hash)
            .collect();
        Ok(Some(BlockInfo {
            number: Some(number),
            hash: None,
            parent_hash: H256::ZERO,
            timestamp: number * 15,
            gas_limit: 8_000_000,
            gas_used: 0,
            transactions,
        }))
    }
}
