//! Call-site argument normalization
//!
//! Contract methods accept a flexible argument list: positional values in
//! ABI order, then any number of options records, then optionally a
//! completion callback. [`normalize`] turns that list into a
//! [`ParameterBinding`] keyed by canonical parameter name plus the
//! [`CallOptions`] metadata record.
//!
//! ```rust
//! use runeth::abi::ParamDescriptor;
//! use runeth::args::normalize;
//! use serde_json::json;
//!
//! let params = vec![ParamDescriptor::new("_to", None), ParamDescriptor::new("_value", None)];
//! let call = normalize(
//!     vec![json!("0xabc").into(), json!(100).into(), json!({"gas": 50000}).into()],
//!     &params,
//! )?;
//! assert_eq!(call.binding.get("value"), Some(&json!(100)));
//! assert_eq!(call.options.gas, Some(50000));
//! # Ok::<(), runeth::TxError>(())
//! ```

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use runeth_primitives::{Address, Gas, Nonce, U256};
use serde_json::{Map, Value};

use crate::abi::{canonical_name, u256_from_json, ParamDescriptor};
use crate::outcome::{Completion, CompletionCallback};
use crate::TxError;

/// Caller-supplied values keyed by canonical parameter name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterBinding(Map<String, Value>);

impl ParameterBinding {
    /// Empty binding
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Value bound to `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether `name` is bound (a bound `null` counts)
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Bound names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of bound names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for ParameterBinding {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Transaction metadata that travels alongside the method arguments
#[derive(Default)]
pub struct CallOptions {
    /// Sender; resolved from the node's accounts when absent
    pub from: Option<Address>,
    /// Recipient; required for plain transfers
    pub to: Option<Address>,
    /// Wei to attach (0 when absent)
    pub value: Option<U256>,
    /// Explicit gas limit; skips estimation
    pub gas: Option<Gas>,
    /// Gas price in wei
    pub gas_price: Option<u128>,
    /// Explicit nonce
    pub nonce: Option<Nonce>,
    /// Margin added to the simulated gas instead of the default
    pub extra_gas: Option<Gas>,
    /// Submit with the ceiling as gas limit, without simulating
    pub no_estimate_gas: bool,
    /// Raise per-invocation log events from `debug` to `info`
    pub verbose: bool,
    /// Raw call data for plain transactions
    pub data: Option<Bytes>,
    /// Completion callback
    pub on_complete: Option<CompletionCallback>,
}

impl CallOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender
    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the recipient
    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    /// Set the value in wei
    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set an explicit gas limit
    pub fn gas(mut self, gas: Gas) -> Self {
        self.gas = Some(gas);
        self
    }

    /// Set the gas price
    pub fn gas_price(mut self, price: u128) -> Self {
        self.gas_price = Some(price);
        self
    }

    /// Set the nonce
    pub fn nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set the gas safety margin
    pub fn extra_gas(mut self, extra: Gas) -> Self {
        self.extra_gas = Some(extra);
        self
    }

    /// Skip gas simulation
    pub fn no_estimate_gas(mut self) -> Self {
        self.no_estimate_gas = true;
        self
    }

    /// Log this invocation at `info`
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Attach raw call data
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Register a completion callback
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnMut(Result<Completion, TxError>) + Send + 'static,
    {
        self.on_complete = Some(CompletionCallback::new(f));
        self
    }

    /// Value to attach, defaulting to zero
    pub fn value_or_zero(&self) -> U256 {
        self.value.unwrap_or_default()
    }

    /// Apply one legacy field (`from`, `gas`, ...) or `$` directive.
    fn apply(&mut self, key: &str, value: &Value) -> Result<(), TxError> {
        match key {
            "from" => self.from = Some(address_from_json(key, value)?),
            "to" => self.to = Some(address_from_json(key, value)?),
            "value" => self.value = Some(u256_from_json(value)?),
            "gas" => self.gas = Some(u64_from_json(key, value)?),
            "gasPrice" => self.gas_price = Some(u128_from_json(key, value)?),
            "nonce" => self.nonce = Some(u64_from_json(key, value)?),
            "extraGas" => self.extra_gas = Some(u64_from_json(key, value)?),
            "noEstimateGas" => self.no_estimate_gas = bool_from_json(key, value)?,
            "verbose" => self.verbose = bool_from_json(key, value)?,
            "data" => {
                let s = value
                    .as_str()
                    .ok_or_else(|| TxError::invalid("data must be a hex string"))?;
                let s = s.strip_prefix("0x").unwrap_or(s);
                self.data = Some(Bytes::from(hex::decode(s)?));
            }
            other => tracing::debug!(option = other, "ignoring unknown call option"),
        }
        Ok(())
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("value", &self.value)
            .field("gas", &self.gas)
            .field("gas_price", &self.gas_price)
            .field("nonce", &self.nonce)
            .field("extra_gas", &self.extra_gas)
            .field("no_estimate_gas", &self.no_estimate_gas)
            .field("verbose", &self.verbose)
            .field("data", &self.data)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// One call-site argument
pub enum Arg {
    /// Any JSON value: positional argument or options record
    Value(Value),
    /// Completion callback; only valid in last position
    Callback(CompletionCallback),
}

impl Arg {
    /// Wrap a closure as a trailing completion callback
    pub fn callback<F>(f: F) -> Self
    where
        F: FnMut(Result<Completion, TxError>) + Send + 'static,
    {
        Arg::Callback(CompletionCallback::new(f))
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Arg::Callback(_) => f.write_str("Callback"),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<CompletionCallback> for Arg {
    fn from(cb: CompletionCallback) -> Self {
        Arg::Callback(cb)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Value(Value::String(s.to_string()))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Value(Value::String(s))
    }
}

impl From<u64> for Arg {
    fn from(n: u64) -> Self {
        Arg::Value(Value::from(n))
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Value(Value::from(n))
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Value(Value::Bool(b))
    }
}

impl From<Address> for Arg {
    fn from(addr: Address) -> Self {
        Arg::Value(Value::String(addr.to_hex()))
    }
}

/// Static classification of a call-site argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// Bound to the next ABI parameter
    PositionalValue,
    /// Options and/or named parameters
    OptionsRecord,
    /// Trailing completion callback
    CompletionCallback,
}

/// Key set that marks an object as a plain value rather than options.
///
/// Historical special case: an object whose sorted keys concatenate to
/// `"ces"` (keys `c`, `e`, `s`) is treated as a positional value. Fragile;
/// kept as-is.
const VALUE_OBJECT_KEYS: &str = "ces";

impl ArgShape {
    /// Classify one argument
    pub fn of(arg: &Arg) -> Self {
        match arg {
            Arg::Callback(_) => ArgShape::CompletionCallback,
            Arg::Value(Value::Object(map)) if is_options_record(map) => ArgShape::OptionsRecord,
            Arg::Value(_) => ArgShape::PositionalValue,
        }
    }
}

fn is_options_record(map: &Map<String, Value>) -> bool {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys.concat() != VALUE_OBJECT_KEYS
}

/// Fields that identify an options record as transaction metadata
const LEGACY_FIELDS: [&str; 6] = ["from", "to", "gasPrice", "gas", "value", "nonce"];

/// Output of [`normalize`]
#[derive(Debug, Default)]
pub struct NormalizedCall {
    /// Parameter values by canonical name
    pub binding: ParameterBinding,
    /// Transaction metadata, including any trailing callback
    pub options: CallOptions,
}

/// Normalize call-site arguments against a parameter list.
///
/// Positional values bind left to right until the first options record.
/// Each remaining argument must be an options record: one carrying any
/// legacy field (`from`, `to`, `gasPrice`, `gas`, `value`, `nonce`)
/// sets only those fields; any other record is merged wholesale, with
/// `$`-prefixed keys as metadata directives and the rest as named
/// parameters.
pub fn normalize(mut args: Vec<Arg>, params: &[ParamDescriptor]) -> Result<NormalizedCall, TxError> {
    let mut call = NormalizedCall::default();
    call.options.on_complete = split_callback(&mut args);
    let mut args: VecDeque<Arg> = args.into();

    for param in params {
        match args.front() {
            Some(arg) if ArgShape::of(arg) == ArgShape::PositionalValue => {}
            _ => break,
        }
        if let Some(Arg::Value(value)) = args.pop_front() {
            call.binding.insert(param.canonical_name.clone(), value);
        }
    }

    for arg in args {
        match arg {
            Arg::Value(Value::Object(map)) if is_options_record(&map) => {
                merge_record(map, &mut call)?;
            }
            Arg::Value(value) => {
                return Err(TxError::invalid(format!(
                    "unexpected positional argument {}",
                    value
                )));
            }
            Arg::Callback(_) => {
                return Err(TxError::invalid(
                    "completion callback must be the last argument",
                ));
            }
        }
    }

    Ok(call)
}

/// Remove and return a trailing completion callback
pub fn split_callback(args: &mut Vec<Arg>) -> Option<CompletionCallback> {
    match args.last() {
        Some(Arg::Callback(_)) => match args.pop() {
            Some(Arg::Callback(cb)) => Some(cb),
            _ => None,
        },
        _ => None,
    }
}

fn merge_record(map: Map<String, Value>, call: &mut NormalizedCall) -> Result<(), TxError> {
    let legacy: Vec<&str> = LEGACY_FIELDS
        .into_iter()
        .filter(|field| map.get(*field).is_some_and(|v| !v.is_null()))
        .collect();

    if !legacy.is_empty() {
        for field in legacy {
            call.options.apply(field, &map[field])?;
        }
        return Ok(());
    }

    for (key, value) in map {
        match key.strip_prefix('$') {
            Some(directive) => call.options.apply(directive, &value)?,
            None => {
                call.binding.insert(canonical_name(&key), value);
            }
        }
    }
    Ok(())
}

fn address_from_json(field: &str, value: &Value) -> Result<Address, TxError> {
    let s = value
        .as_str()
        .ok_or_else(|| TxError::invalid(format!("{} must be an address string", field)))?;
    Address::from_hex(s).map_err(|e| TxError::invalid(format!("{}: {}", field, e)))
}

fn u64_from_json(field: &str, value: &Value) -> Result<u64, TxError> {
    let v = u256_from_json(value)?;
    if v > U256::from(u64::MAX) {
        return Err(TxError::invalid(format!("{} out of range", field)));
    }
    Ok(v.low_u64())
}

fn u128_from_json(field: &str, value: &Value) -> Result<u128, TxError> {
    let v = u256_from_json(value)?;
    if v > U256::from(u128::MAX) {
        return Err(TxError::invalid(format!("{} out of range", field)));
    }
    Ok(v.low_u128())
}

fn bool_from_json(field: &str, value: &Value) -> Result<bool, TxError> {
    value
        .as_bool()
        .ok_or_else(|| TxError::invalid(format!("{} must be a boolean", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const SENDER: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0ab3d";

    fn params(names: &[&str]) -> Vec<ParamDescriptor> {
        names.iter().map(|n| ParamDescriptor::new(*n, None)).collect()
    }

    #[test]
    fn test_positional_binding() {
        let call = normalize(
            vec![json!("0xABC").into(), json!(100).into()],
            &params(&["_to", "_value"]),
        )
        .unwrap();

        assert_eq!(call.binding.len(), 2);
        assert_eq!(call.binding.get("to"), Some(&json!("0xABC")));
        assert_eq!(call.binding.get("value"), Some(&json!(100)));
        assert!(call.options.from.is_none());
    }

    #[test]
    fn test_legacy_options_record() {
        let call = normalize(
            vec![
                json!(1).into(),
                json!({"from": SENDER, "gas": 90000, "gasPrice": "0x3b9aca00", "nonce": 3, "value": "1000"}).into(),
            ],
            &params(&["amount"]),
        )
        .unwrap();

        let opts = &call.options;
        assert_eq!(opts.from, Some(Address::from_hex(SENDER).unwrap()));
        assert_eq!(opts.gas, Some(90000));
        assert_eq!(opts.gas_price, Some(1_000_000_000));
        assert_eq!(opts.nonce, Some(3));
        assert_eq!(opts.value, Some(U256::from(1000)));
        assert_eq!(call.binding.len(), 1);
    }

    #[test]
    fn test_legacy_record_ignores_other_keys() {
        let call = normalize(
            vec![json!({"gas": 1, "amount": 5, "$verbose": true}).into()],
            &params(&["amount"]),
        )
        .unwrap();
        assert_eq!(call.options.gas, Some(1));
        assert!(!call.options.verbose);
        assert!(call.binding.is_empty());
    }

    #[test]
    fn test_named_parameters_and_directives() {
        let call = normalize(
            vec![json!({"to": null, "_amount": 5, "memo": "hi", "$extraGas": 500, "$noEstimateGas": true, "$from": SENDER}).into()],
            &params(&["amount", "memo"]),
        )
        .unwrap();

        assert_eq!(call.binding.get("amount"), Some(&json!(5)));
        assert_eq!(call.binding.get("memo"), Some(&json!("hi")));
        // a null legacy field does not make the record legacy
        assert_eq!(call.binding.get("to"), Some(&Value::Null));
        assert_eq!(call.options.extra_gas, Some(500));
        assert!(call.options.no_estimate_gas);
        assert!(call.options.from.is_some());
    }

    #[test]
    fn test_positional_then_named() {
        let call = normalize(
            vec![json!("a").into(), json!({"b": 2}).into()],
            &params(&["a", "b"]),
        )
        .unwrap();
        assert_eq!(call.binding.get("a"), Some(&json!("a")));
        assert_eq!(call.binding.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_ces_object_is_positional() {
        let point = json!({"s": 1, "c": 2, "e": 3});
        let call = normalize(vec![point.clone().into()], &params(&["p"])).unwrap();
        assert_eq!(call.binding.get("p"), Some(&point));
        assert_eq!(ArgShape::of(&Arg::from(point)), ArgShape::PositionalValue);
        assert_eq!(ArgShape::of(&Arg::from(json!({"c": 1}))), ArgShape::OptionsRecord);
        assert_eq!(ArgShape::of(&Arg::from(json!([1, 2]))), ArgShape::PositionalValue);
    }

    #[test]
    fn test_trailing_callback_extracted() {
        let seen = Arc::new(Mutex::new(0));
        let seen2 = Arc::clone(&seen);
        let call = normalize(
            vec![
                json!(1).into(),
                Arg::callback(move |_| *seen2.lock().unwrap() += 1),
            ],
            &params(&["x"]),
        )
        .unwrap();
        assert!(call.options.on_complete.is_some());
        assert_eq!(call.binding.len(), 1);
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_callback_not_last_is_invalid() {
        let result = normalize(
            vec![Arg::callback(|_| {}), json!(1).into()],
            &params(&["x"]),
        );
        assert!(matches!(result, Err(TxError::InvalidArguments(_))));
    }

    #[test]
    fn test_too_many_positional_is_invalid() {
        let result = normalize(vec![json!(1).into(), json!(2).into()], &params(&["x"]));
        assert!(matches!(result, Err(TxError::InvalidArguments(_))));
    }

    #[test]
    fn test_positional_after_options_is_invalid() {
        let result = normalize(
            vec![json!({"gas": 1}).into(), json!(2).into()],
            &params(&["x"]),
        );
        assert!(matches!(result, Err(TxError::InvalidArguments(_))));
    }

    #[test]
    fn test_malformed_option_values() {
        for record in [
            json!({"from": "nope"}),
            json!({"gas": -1}),
            json!({"gas": "lots"}),
            json!({"$verbose": "yes"}),
        ] {
            let result = normalize(vec![record.clone().into()], &[]);
            assert!(
                matches!(result, Err(TxError::InvalidArguments(_))),
                "{} should be rejected",
                record
            );
        }
    }

    #[test]
    fn test_missing_params_are_not_an_error_here() {
        let call = normalize(vec![json!(1).into()], &params(&["a", "b"])).unwrap();
        assert!(call.binding.contains("a"));
        assert!(!call.binding.contains("b"));
    }

    proptest! {
        #[test]
        fn prop_positional_keys_are_canonical_names(
            names in prop::collection::btree_set("_?[a-z][a-z0-9]{0,8}", 0..6),
            seed in any::<u64>(),
        ) {
            // drop names that collide after canonicalization
            let mut seen = std::collections::HashSet::new();
            let names: Vec<String> = names
                .into_iter()
                .filter(|n| seen.insert(canonical_name(n).to_string()))
                .collect();
            let params: Vec<ParamDescriptor> =
                names.iter().map(|n| ParamDescriptor::new(n.clone(), None)).collect();
            let args: Vec<Arg> = (0..params.len())
                .map(|i| json!(seed.wrapping_add(i as u64)).into())
                .collect();

            let call = normalize(args, &params).unwrap();

            let mut expected: Vec<&str> = params.iter().map(|p| p.canonical_name.as_str()).collect();
            expected.sort_unstable();
            let mut actual: Vec<&str> = call.binding.names().collect();
            actual.sort_unstable();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_canonical_name_strips_one_underscore(name in "_{0,3}[a-z]{1,6}") {
            let canonical = canonical_name(&name);
            match name.strip_prefix('_') {
                Some(rest) => prop_assert_eq!(canonical, rest),
                None => prop_assert_eq!(canonical, name.as_str()),
            }
        }
    }
}
