//! # runeth-primitives
//!
//! Primitive types shared by the runeth crates.
//!
//! Everything here is plain data: 20-byte account addresses, 32-byte
//! transaction/block hashes and the 256-bit unsigned integer used for
//! ether amounts, plus aliases naming the `u64` quantities used for gas,
//! nonces and block heights.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod hash;

pub use address::{Address, AddressError};
pub use hash::{HashError, H256};

// Re-export primitive-types for U256
pub use primitive_types::U256;

/// Gas quantity
pub type Gas = u64;

/// Account nonce
pub type Nonce = u64;

/// Block number
pub type BlockNumber = u64;

/// Strip an optional `0x`/`0X` prefix.
pub(crate) fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}
