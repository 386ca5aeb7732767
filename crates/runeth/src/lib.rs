//! # runeth
//!
//! Transaction orchestration over Ethereum JSON-RPC.
//!
//! ## Features
//!
//! - **Argument normalization**: positional values, options records and
//!   named parameters mapped onto an ABI method
//! - **Gas selection**: simulation against a ceiling plus a safety margin
//! - **Submission protocol**: sender resolution, estimation, submission
//!   and receipt polling behind one awaitable [`TxHandle`]
//! - **Events and callbacks**: an [`EventStream`] per invocation plus an
//!   optional completion callback
//! - **Bindings**: per-ABI [`Binding`]s that deploy and attach to contracts
//! - **ABI**: Solidity ABI encoding and decoding
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runeth::{Arg, Binding, TxConfig, TxRunner};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = TxRunner::connect(TxConfig::load("runeth.toml")?);
//!
//!     let token = Binding::from_json(include_str!("../tests/data/token.abi.json"), "0x")?
//!         .at(&runner, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".parse()?);
//!
//!     // positional arguments, then an options record
//!     let receipt = token
//!         .method("transfer")?
//!         .send(vec![
//!             Arg::from("0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d"),
//!             Arg::from(json!(1000)),
//!             Arg::from(json!({"$extraGas": 20000})),
//!         ])
//!         .await?;
//!     println!("mined in block {:?}", receipt.block_number);
//!
//!     // named arguments, read-only
//!     let balance = token
//!         .method("balanceOf")?
//!         .call(vec![Arg::from(json!({"owner": "0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d"}))])
//!         .await?;
//!     println!("balance: {}", balance);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Observing Progress
//!
//! ```rust
//! use futures::StreamExt;
//! use runeth::{CallOptions, MockNode, TxEvent, TxRunner};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), runeth::TxError> {
//! let runner = TxRunner::new(MockNode::new());
//! let to = "0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d".parse()?;
//!
//! let mut handle = runner.send_tx(CallOptions::new().to(to).value(1_000u64));
//! let events = handle.subscribe().expect("fresh handle");
//! let receipt = handle.await?;
//!
//! let events: Vec<TxEvent> = events.collect().await;
//! assert_eq!(events[0], TxEvent::TransactionHash(receipt.transaction_hash));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
mod account;
pub mod args;
mod binding;
mod config;
mod error;
pub mod gas;
mod mock;
pub mod node;
mod outcome;
mod rpc;
mod submitter;
mod transport;

// Re-export main types
pub use account::resolve_account;
pub use args::{normalize, Arg, ArgShape, CallOptions, NormalizedCall, ParameterBinding};
pub use binding::{Binding, Contract, ContractMethod};
pub use config::TxConfig;
pub use error::TxError;
pub use gas::{estimate_gas, GasPolicy};
pub use mock::{MockNode, MOCK_ACCOUNT, MOCK_CONTRACT};
pub use node::{BlockId, BlockInfo, Node, Payload, Receipt, TxRequest};
pub use outcome::{
    Completion, CompletionCallback, Deployment, EventStream, TxEvent, TxHandle, TxOutcome,
};
pub use rpc::RpcNode;
pub use submitter::TxRunner;

/// Re-export Transport trait for custom implementations
pub use transport::{deserialize_response, MockTransport, RecordedRequest, Transport};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

// Re-export primitives for convenience
pub use runeth_primitives::{Address, BlockNumber, Gas, Nonce, H256, U256};
