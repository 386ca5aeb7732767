//! Contract interface descriptions and the Solidity ABI codec
//!
//! This module provides:
//! - Parsing of JSON ABI arrays into [`MethodDescriptor`]s
//! - Method lookup against a [`ParameterBinding`](crate::ParameterBinding)
//! - Encoding of calls and constructor arguments from JSON values
//! - Decoding of return data back into JSON
//!
//! # Example
//!
//! ```rust
//! use runeth::abi::Abi;
//! use serde_json::json;
//!
//! let abi = Abi::from_json(r#"[{"type":"function","name":"transfer",
//!     "inputs":[{"name":"_to","type":"address"},{"name":"_value","type":"uint256"}]}]"#)?;
//! let transfer = &abi.functions()[0];
//! let data = transfer.encode_call(&[
//!     json!("0x742d35cc6634c0532925a3b844bc9e7595f0ab3d"),
//!     json!(1000),
//! ])?;
//! assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
//! # Ok::<(), runeth::TxError>(())
//! ```

mod codec;
mod descriptor;
mod types;

pub use codec::{decode, detokenize, encode, function_selector, tokenize};
pub(crate) use codec::{u256_from_json, u256_from_str};
pub use descriptor::{
    canonical_name, Abi, AbiEntry, AbiParam, MethodDescriptor, MethodKind, ParamDescriptor,
};
pub use types::{ParamType, Token};
