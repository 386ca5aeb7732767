//! ABI type definitions

use std::fmt;
use std::str::FromStr;

use runeth_primitives::{Address, U256};

use crate::TxError;

/// Solidity parameter types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// Address
    Address,
    /// Unsigned integer with bit size (8, 16, ..., 256)
    Uint(usize),
    /// Signed integer with bit size
    Int(usize),
    /// Boolean
    Bool,
    /// Dynamic bytes
    Bytes,
    /// Fixed-size bytes (size 1-32)
    FixedBytes(usize),
    /// UTF-8 string
    String,
    /// Dynamic array
    Array(Box<ParamType>),
    /// Fixed-size array
    FixedArray(Box<ParamType>, usize),
}

impl ParamType {
    /// Check if this type is dynamic (variable length)
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Bytes | ParamType::String | ParamType::Array(_) => true,
            ParamType::FixedArray(inner, _) => inner.is_dynamic(),
            _ => false,
        }
    }

    /// Bytes this type occupies in the head of an encoding
    pub(crate) fn head_len(&self) -> usize {
        match self {
            ParamType::FixedArray(inner, size) if !inner.is_dynamic() => inner.head_len() * size,
            _ => 32,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Address => f.write_str("address"),
            ParamType::Uint(bits) => write!(f, "uint{}", bits),
            ParamType::Int(bits) => write!(f, "int{}", bits),
            ParamType::Bool => f.write_str("bool"),
            ParamType::Bytes => f.write_str("bytes"),
            ParamType::FixedBytes(size) => write!(f, "bytes{}", size),
            ParamType::String => f.write_str("string"),
            ParamType::Array(inner) => write!(f, "{}[]", inner),
            ParamType::FixedArray(inner, size) => write!(f, "{}[{}]", inner, size),
        }
    }
}

impl FromStr for ParamType {
    type Err = TxError;

    /// Parse a Solidity type name such as `uint256`, `bytes32[]` or `address[2]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(prefix) = s.strip_suffix(']') {
            let open = prefix
                .rfind('[')
                .ok_or_else(|| TxError::invalid(format!("malformed array type: {}", s)))?;
            let inner: ParamType = prefix[..open].parse()?;
            let size = &prefix[open + 1..];
            if size.is_empty() {
                return Ok(ParamType::Array(Box::new(inner)));
            }
            let size: usize = size
                .parse()
                .map_err(|_| TxError::invalid(format!("malformed array size: {}", s)))?;
            return Ok(ParamType::FixedArray(Box::new(inner), size));
        }

        match s {
            "address" => Ok(ParamType::Address),
            "bool" => Ok(ParamType::Bool),
            "string" => Ok(ParamType::String),
            "bytes" => Ok(ParamType::Bytes),
            "uint" => Ok(ParamType::Uint(256)),
            "int" => Ok(ParamType::Int(256)),
            _ => {
                if let Some(bits) = s.strip_prefix("uint") {
                    parse_int_bits(s, bits).map(ParamType::Uint)
                } else if let Some(bits) = s.strip_prefix("int") {
                    parse_int_bits(s, bits).map(ParamType::Int)
                } else if let Some(size) = s.strip_prefix("bytes") {
                    match size.parse::<usize>() {
                        Ok(n) if (1..=32).contains(&n) => Ok(ParamType::FixedBytes(n)),
                        _ => Err(TxError::invalid(format!("unsupported ABI type: {}", s))),
                    }
                } else {
                    Err(TxError::invalid(format!("unsupported ABI type: {}", s)))
                }
            }
        }
    }
}

fn parse_int_bits(ty: &str, bits: &str) -> Result<usize, TxError> {
    match bits.parse::<usize>() {
        Ok(n) if n > 0 && n <= 256 && n % 8 == 0 => Ok(n),
        _ => Err(TxError::invalid(format!("unsupported ABI type: {}", ty))),
    }
}

/// A typed ABI value.
///
/// Signed integers are stored in 256-bit two's complement, which is also
/// their wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Address (20 bytes)
    Address(Address),
    /// Unsigned integer
    Uint(U256),
    /// Signed integer, two's complement
    Int(U256),
    /// Boolean
    Bool(bool),
    /// Dynamic bytes
    Bytes(Vec<u8>),
    /// Fixed-size bytes (1-32)
    FixedBytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Dynamic array
    Array(Vec<Token>),
    /// Fixed-size array
    FixedArray(Vec<Token>),
}

impl Token {
    /// Signed integer token from an `i128`
    pub fn int(value: i128) -> Self {
        let abs = U256::from(value.unsigned_abs());
        if value < 0 {
            Token::Int(negate(abs))
        } else {
            Token::Int(abs)
        }
    }
}

/// Two's complement negation in 256 bits
pub(crate) fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}
