//! Solidity ABI encoding and decoding, plus JSON <-> token conversion

use runeth_primitives::{Address, U256};
use serde_json::Value;
use sha3::{Digest, Keccak256};

use super::types::{negate, ParamType, Token};
use crate::TxError;

/// First four bytes of keccak-256 of a canonical signature
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// Encode tokens against their declared types.
pub fn encode(types: &[ParamType], tokens: &[Token]) -> Result<Vec<u8>, TxError> {
    if types.len() != tokens.len() {
        return Err(TxError::invalid(format!(
            "expected {} values, got {}",
            types.len(),
            tokens.len()
        )));
    }

    let head_size: usize = types.iter().map(ParamType::head_len).sum();
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for (ty, token) in types.iter().zip(tokens) {
        let encoded = encode_token(ty, token)?;
        if ty.is_dynamic() {
            head.extend(word(U256::from(head_size + tail.len())));
            tail.extend(encoded);
        } else {
            head.extend(encoded);
        }
    }

    head.extend(tail);
    Ok(head)
}

fn encode_token(ty: &ParamType, token: &Token) -> Result<Vec<u8>, TxError> {
    match (ty, token) {
        (ParamType::Address, Token::Address(addr)) => {
            let mut buf = [0u8; 32];
            buf[12..].copy_from_slice(addr.as_bytes());
            Ok(buf.to_vec())
        }
        (ParamType::Uint(_), Token::Uint(v)) | (ParamType::Int(_), Token::Int(v)) => Ok(word(*v)),
        (ParamType::Bool, Token::Bool(b)) => Ok(word(U256::from(*b as u8))),
        (ParamType::FixedBytes(size), Token::FixedBytes(data)) if data.len() <= *size => {
            let mut buf = [0u8; 32];
            buf[..data.len()].copy_from_slice(data);
            Ok(buf.to_vec())
        }
        (ParamType::Bytes, Token::Bytes(data)) => Ok(encode_dynamic_bytes(data)),
        (ParamType::String, Token::String(s)) => Ok(encode_dynamic_bytes(s.as_bytes())),
        (ParamType::Array(inner), Token::Array(items)) => {
            let types = vec![(**inner).clone(); items.len()];
            let mut out = word(U256::from(items.len()));
            out.extend(encode(&types, items)?);
            Ok(out)
        }
        (ParamType::FixedArray(inner, size), Token::FixedArray(items)) if items.len() == *size => {
            let types = vec![(**inner).clone(); *size];
            encode(&types, items)
        }
        _ => Err(TxError::invalid(format!("value {:?} does not match type {}", token, ty))),
    }
}

fn encode_dynamic_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = word(U256::from(data.len()));
    out.extend_from_slice(data);
    let padding = (32 - data.len() % 32) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

fn word(value: U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf.to_vec()
}

/// Decode `data` as a sequence of values of the given types.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, TxError> {
    decode_sequence(types.iter(), data)
}

/// Decode consecutive head slots, following offsets for dynamic types.
fn decode_sequence<'a, I>(types: I, data: &[u8]) -> Result<Vec<Token>, TxError>
where
    I: IntoIterator<Item = &'a ParamType>,
{
    let mut tokens = Vec::new();
    let mut cursor = 0usize;

    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, cursor)?;
            let region = data
                .get(offset..)
                .ok_or_else(|| TxError::Serialization(format!("offset {} out of bounds", offset)))?;
            tokens.push(decode_dynamic(ty, region)?);
        } else {
            let region = data
                .get(cursor..)
                .ok_or_else(|| TxError::Serialization("output too short".to_string()))?;
            tokens.push(decode_static(ty, region)?);
        }
        cursor = cursor
            .checked_add(ty.head_len())
            .ok_or_else(|| TxError::Serialization("output too short".to_string()))?;
    }

    Ok(tokens)
}

/// `count` elements of `inner`, each taking at least one head word of `data`.
fn decode_repeated(inner: &ParamType, count: usize, data: &[u8]) -> Result<Vec<Token>, TxError> {
    if count > data.len() / 32 {
        return Err(TxError::Serialization(format!(
            "{} elements of {} do not fit in {} bytes",
            count,
            inner,
            data.len()
        )));
    }
    decode_sequence(std::iter::repeat(inner).take(count), data)
}

fn decode_static(ty: &ParamType, data: &[u8]) -> Result<Token, TxError> {
    let w = read_word(data, 0)?;
    match ty {
        ParamType::Address => Ok(Token::Address(Address::from_slice(&w[12..])?)),
        ParamType::Uint(_) => Ok(Token::Uint(U256::from_big_endian(w))),
        ParamType::Int(_) => Ok(Token::Int(U256::from_big_endian(w))),
        ParamType::Bool => Ok(Token::Bool(w[31] != 0)),
        ParamType::FixedBytes(size) => Ok(Token::FixedBytes(w[..*size].to_vec())),
        ParamType::FixedArray(inner, size) => {
            decode_repeated(inner, *size, data).map(Token::FixedArray)
        }
        _ => Err(TxError::Serialization(format!("{} is not a static type", ty))),
    }
}

fn decode_dynamic(ty: &ParamType, data: &[u8]) -> Result<Token, TxError> {
    match ty {
        ParamType::Bytes => read_dynamic_bytes(data).map(|b| Token::Bytes(b.to_vec())),
        ParamType::String => {
            let bytes = read_dynamic_bytes(data)?;
            String::from_utf8(bytes.to_vec())
                .map(Token::String)
                .map_err(|e| TxError::Serialization(e.to_string()))
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, 0)?;
            decode_repeated(inner, len, &data[32..]).map(Token::Array)
        }
        ParamType::FixedArray(inner, size) => {
            decode_repeated(inner, *size, data).map(Token::FixedArray)
        }
        _ => decode_static(ty, data),
    }
}

fn read_word(data: &[u8], at: usize) -> Result<&[u8], TxError> {
    data.get(at..at + 32)
        .ok_or_else(|| TxError::Serialization("output too short".to_string()))
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, TxError> {
    let value = U256::from_big_endian(read_word(data, at)?);
    if value > U256::from(u32::MAX) {
        return Err(TxError::Serialization(format!("length {} too large", value)));
    }
    Ok(value.low_u64() as usize)
}

fn read_dynamic_bytes(data: &[u8]) -> Result<&[u8], TxError> {
    let len = read_usize(data, 0)?;
    data.get(32..32 + len)
        .ok_or_else(|| TxError::Serialization("bytes out of bounds".to_string()))
}

// ==================== JSON conversion ====================

/// Convert a caller-supplied JSON value into a token of the given type.
pub fn tokenize(ty: &ParamType, value: &Value) -> Result<Token, TxError> {
    let mismatch = || TxError::invalid(format!("cannot use {} as {}", value, ty));

    match ty {
        ParamType::Address => {
            let s = value.as_str().ok_or_else(mismatch)?;
            Ok(Token::Address(Address::from_hex(s)?))
        }
        ParamType::Uint(bits) => {
            let v = u256_from_json(value)?;
            if v.bits() > *bits {
                return Err(TxError::invalid(format!("{} overflows uint{}", value, bits)));
            }
            Ok(Token::Uint(v))
        }
        ParamType::Int(bits) => int_from_json(value, *bits).map(Token::Int),
        ParamType::Bool => value.as_bool().map(Token::Bool).ok_or_else(mismatch),
        ParamType::String => value
            .as_str()
            .map(|s| Token::String(s.to_string()))
            .ok_or_else(mismatch),
        ParamType::Bytes => bytes_from_json(value).map(Token::Bytes),
        ParamType::FixedBytes(size) => {
            let bytes = bytes_from_json(value)?;
            if bytes.len() > *size {
                return Err(TxError::invalid(format!("{} longer than bytes{}", value, size)));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Array(inner) => {
            let items = value.as_array().ok_or_else(mismatch)?;
            items
                .iter()
                .map(|item| tokenize(inner, item))
                .collect::<Result<_, _>>()
                .map(Token::Array)
        }
        ParamType::FixedArray(inner, size) => {
            let items = value.as_array().filter(|a| a.len() == *size).ok_or_else(mismatch)?;
            items
                .iter()
                .map(|item| tokenize(inner, item))
                .collect::<Result<_, _>>()
                .map(Token::FixedArray)
        }
    }
}

/// Render a decoded token as JSON.
///
/// Integers become decimal strings so no precision is lost.
pub fn detokenize(token: &Token) -> Value {
    match token {
        Token::Address(addr) => Value::String(addr.to_hex()),
        Token::Uint(v) => Value::String(v.to_string()),
        Token::Int(v) => {
            if v.bit(255) {
                Value::String(format!("-{}", negate(*v)))
            } else {
                Value::String(v.to_string())
            }
        }
        Token::Bool(b) => Value::Bool(*b),
        Token::Bytes(b) | Token::FixedBytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        Token::String(s) => Value::String(s.clone()),
        Token::Array(items) | Token::FixedArray(items) => {
            Value::Array(items.iter().map(detokenize).collect())
        }
    }
}

/// Parse a non-negative integer from a JSON number, a decimal string or a
/// `0x` hex string.
pub(crate) fn u256_from_json(value: &Value) -> Result<U256, TxError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| TxError::invalid(format!("{} is not an unsigned integer", n))),
        Value::String(s) => u256_from_str(s),
        other => Err(TxError::invalid(format!("{} is not an integer", other))),
    }
}

pub(crate) fn u256_from_str(s: &str) -> Result<U256, TxError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => Ok(U256::zero()),
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(s).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| TxError::invalid(format!("invalid integer {:?}: {}", s, e)))
}

fn int_from_json(value: &Value, bits: usize) -> Result<U256, TxError> {
    let (negative, abs) = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => (i < 0, U256::from(i.unsigned_abs())),
            None => return Err(TxError::invalid(format!("{} is not an integer", n))),
        },
        Value::String(s) => match s.trim().strip_prefix('-') {
            Some(rest) => (true, u256_from_str(rest)?),
            None => (false, u256_from_str(s)?),
        },
        other => return Err(TxError::invalid(format!("{} is not an integer", other))),
    };

    let limit = U256::one() << (bits - 1);
    if (negative && abs > limit) || (!negative && abs >= limit) {
        return Err(TxError::invalid(format!("{} overflows int{}", value, bits)));
    }
    Ok(if negative { negate(abs) } else { abs })
}

fn bytes_from_json(value: &Value) -> Result<Vec<u8>, TxError> {
    let s = value
        .as_str()
        .ok_or_else(|| TxError::invalid(format!("{} is not a hex string", value)))?;
    let s = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(s)?)
}
