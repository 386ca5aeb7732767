//! Contract interface description: JSON entries and the method
//! descriptors derived from them.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::codec::{decode, detokenize, encode, function_selector, tokenize};
use super::types::ParamType;
use crate::args::ParameterBinding;
use crate::TxError;

/// One parameter as it appears in the JSON ABI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    /// Parameter name (may be empty)
    #[serde(default)]
    pub name: String,
    /// Solidity type name
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Event topic flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

/// One entry of a JSON ABI array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEntry {
    /// `function`, `constructor`, `event`, `fallback` or `receive`
    #[serde(rename = "type", default = "default_entry_type")]
    pub kind: String,
    /// Entry name (empty for constructors)
    #[serde(default)]
    pub name: String,
    /// Input parameters
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    /// Output parameters
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    /// Pre-0.5 solc read-only marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<bool>,
    /// `pure`, `view`, `nonpayable` or `payable`
    #[serde(
        rename = "stateMutability",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state_mutability: Option<String>,
    /// Pre-0.5 solc payable marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payable: Option<bool>,
}

fn default_entry_type() -> String {
    "function".to_string()
}

impl AbiEntry {
    fn is_constant(&self) -> bool {
        self.constant.unwrap_or(false)
            || matches!(self.state_mutability.as_deref(), Some("view") | Some("pure"))
    }

    fn is_payable(&self) -> bool {
        self.payable.unwrap_or(false) || self.state_mutability.as_deref() == Some("payable")
    }
}

/// What a method does to chain state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Read-only; executed with `eth_call`
    Constant,
    /// State-mutating; submitted as a transaction
    Mutating,
    /// Contract constructor
    Constructor,
}

/// A parameter with its canonical (lookup) name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    /// Name exactly as in the ABI
    pub raw_name: String,
    /// `raw_name` with one leading underscore stripped
    pub canonical_name: String,
    /// Solidity type name, if the ABI carries one
    pub type_name: Option<String>,
}

impl ParamDescriptor {
    /// Create a descriptor from a raw ABI name
    pub fn new(raw_name: impl Into<String>, type_name: Option<String>) -> Self {
        let raw_name = raw_name.into();
        Self {
            canonical_name: canonical_name(&raw_name).to_string(),
            raw_name,
            type_name,
        }
    }

    /// Parsed Solidity type
    pub fn param_type(&self) -> Result<ParamType, TxError> {
        self.type_name
            .as_deref()
            .ok_or_else(|| {
                TxError::invalid(format!("parameter {} has no ABI type", self.raw_name))
            })?
            .parse()
    }
}

/// Strip exactly one leading underscore.
///
/// `_amount` becomes `amount`, `__x` becomes `_x`, `amount` is unchanged.
pub fn canonical_name(raw: &str) -> &str {
    raw.strip_prefix('_').unwrap_or(raw)
}

/// A callable entry of the ABI. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Function name (empty for the constructor)
    pub name: String,
    /// Constant, mutating or constructor
    pub kind: MethodKind,
    /// Whether the method accepts value
    pub payable: bool,
    /// Ordered input parameters
    pub parameters: Vec<ParamDescriptor>,
    /// Ordered outputs
    pub outputs: Vec<ParamDescriptor>,
}

impl MethodDescriptor {
    /// Build a descriptor, rejecting duplicate canonical parameter names.
    ///
    /// Unnamed parameters are bound by their position, so the second
    /// input of `f(uint256,uint256)` is looked up as `"1"`.
    pub fn new(
        name: impl Into<String>,
        kind: MethodKind,
        mut parameters: Vec<ParamDescriptor>,
        outputs: Vec<ParamDescriptor>,
    ) -> Result<Self, TxError> {
        let name = name.into();
        for (index, p) in parameters.iter_mut().enumerate() {
            if p.canonical_name.is_empty() {
                p.canonical_name = index.to_string();
            }
        }

        let mut seen = HashSet::new();
        for p in &parameters {
            if !seen.insert(p.canonical_name.as_str()) {
                return Err(TxError::invalid(format!(
                    "duplicate parameter {} in {}",
                    p.canonical_name, name
                )));
            }
        }
        Ok(Self {
            name,
            kind,
            payable: false,
            parameters,
            outputs,
        })
    }

    fn from_entry(entry: &AbiEntry, kind: MethodKind) -> Result<Self, TxError> {
        let params = |list: &[AbiParam]| -> Vec<ParamDescriptor> {
            list.iter()
                .map(|p| ParamDescriptor::new(p.name.clone(), p.kind.clone()))
                .collect()
        };
        let mut method = Self::new(
            entry.name.clone(),
            kind,
            params(&entry.inputs),
            params(&entry.outputs),
        )?;
        method.payable = entry.is_payable();
        Ok(method)
    }

    /// Canonical names in declaration order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.canonical_name.as_str())
    }

    /// First declared parameter absent from `binding`
    pub fn first_missing(&self, binding: &ParameterBinding) -> Option<&str> {
        self.param_names().find(|name| !binding.contains(name))
    }

    /// Values from `binding` in declaration order.
    pub fn ordered_args(&self, binding: &ParameterBinding) -> Result<Vec<Value>, TxError> {
        self.parameters
            .iter()
            .map(|p| {
                binding
                    .get(&p.canonical_name)
                    .cloned()
                    .ok_or_else(|| TxError::MissingParameter(p.canonical_name.clone()))
            })
            .collect()
    }

    /// Canonical signature, e.g. `transfer(address,uint256)`
    pub fn signature(&self) -> Result<String, TxError> {
        let types = self
            .parameters
            .iter()
            .map(|p| p.param_type().map(|t| t.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("{}({})", self.name, types.join(",")))
    }

    /// ABI-encode `args` as this method's inputs (no selector).
    pub fn encode_args(&self, args: &[Value]) -> Result<Vec<u8>, TxError> {
        if args.len() != self.parameters.len() {
            return Err(TxError::invalid(format!(
                "{} expects {} arguments, got {}",
                self.name,
                self.parameters.len(),
                args.len()
            )));
        }
        let types = self
            .parameters
            .iter()
            .map(ParamDescriptor::param_type)
            .collect::<Result<Vec<_>, _>>()?;
        let tokens = types
            .iter()
            .zip(args)
            .map(|(ty, v)| tokenize(ty, v))
            .collect::<Result<Vec<_>, _>>()?;
        encode(&types, &tokens)
    }

    /// Selector followed by the encoded arguments
    pub fn encode_call(&self, args: &[Value]) -> Result<Vec<u8>, TxError> {
        let mut data = function_selector(&self.signature()?).to_vec();
        data.extend(self.encode_args(args)?);
        Ok(data)
    }

    /// Decode return data.
    ///
    /// No outputs yields `null`, one output yields that value, several
    /// yield an object keyed by output name (or position when unnamed).
    pub fn decode_output(&self, data: &[u8]) -> Result<Value, TxError> {
        let types = self
            .outputs
            .iter()
            .map(ParamDescriptor::param_type)
            .collect::<Result<Vec<_>, _>>()?;
        let tokens = decode(&types, data)?;

        match tokens.as_slice() {
            [] => Ok(Value::Null),
            [single] => Ok(detokenize(single)),
            _ => {
                let mut out = serde_json::Map::new();
                for (i, (out_param, token)) in self.outputs.iter().zip(&tokens).enumerate() {
                    let key = if out_param.canonical_name.is_empty() {
                        i.to_string()
                    } else {
                        out_param.canonical_name.clone()
                    };
                    out.insert(key, detokenize(token));
                }
                Ok(Value::Object(out))
            }
        }
    }
}

/// A parsed contract interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abi {
    entries: Vec<AbiEntry>,
    functions: Vec<Arc<MethodDescriptor>>,
    constructor: Option<Arc<MethodDescriptor>>,
}

impl Abi {
    /// Parse a JSON ABI array
    pub fn from_json(json: &str) -> Result<Self, TxError> {
        let entries: Vec<AbiEntry> =
            serde_json::from_str(json).map_err(|e| TxError::invalid(format!("bad ABI: {}", e)))?;
        Self::from_entries(entries)
    }

    /// Parse an ABI already held as a JSON value
    pub fn from_value(json: Value) -> Result<Self, TxError> {
        let entries: Vec<AbiEntry> =
            serde_json::from_value(json).map_err(|e| TxError::invalid(format!("bad ABI: {}", e)))?;
        Self::from_entries(entries)
    }

    /// Build descriptors for every function and the constructor
    pub fn from_entries(entries: Vec<AbiEntry>) -> Result<Self, TxError> {
        let mut functions = Vec::new();
        let mut constructor = None;

        for entry in &entries {
            match entry.kind.as_str() {
                "function" => {
                    let kind = if entry.is_constant() {
                        MethodKind::Constant
                    } else {
                        MethodKind::Mutating
                    };
                    functions.push(Arc::new(MethodDescriptor::from_entry(entry, kind)?));
                }
                "constructor" if constructor.is_none() => {
                    constructor = Some(Arc::new(MethodDescriptor::from_entry(
                        entry,
                        MethodKind::Constructor,
                    )?));
                }
                "constructor" => {
                    return Err(TxError::invalid("ABI declares more than one constructor"));
                }
                _ => {}
            }
        }

        Ok(Self {
            entries,
            functions,
            constructor,
        })
    }

    /// Raw entries in declaration order
    pub fn entries(&self) -> &[AbiEntry] {
        &self.entries
    }

    /// Function descriptors in declaration order
    pub fn functions(&self) -> &[Arc<MethodDescriptor>] {
        &self.functions
    }

    /// The constructor, if declared
    pub fn constructor(&self) -> Option<&Arc<MethodDescriptor>> {
        self.constructor.as_ref()
    }

    /// Find the function named `name` whose parameters are all bound.
    ///
    /// A name match with an unbound parameter is reported as
    /// [`TxError::MissingParameter`]; no name match at all is
    /// [`TxError::MethodNotFound`].
    pub fn find_method(
        &self,
        name: &str,
        binding: &ParameterBinding,
    ) -> Result<Arc<MethodDescriptor>, TxError> {
        let mut missing = None;

        for method in self.functions.iter().filter(|m| m.name == name) {
            match method.first_missing(binding) {
                None => return Ok(Arc::clone(method)),
                Some(param) => {
                    missing.get_or_insert_with(|| param.to_string());
                }
            }
        }

        Err(match missing {
            Some(param) => TxError::MissingParameter(param),
            None => TxError::MethodNotFound(name.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Token;
    use serde_json::json;

    const TOKEN_ABI: &str = r#"[
        {"type":"constructor","inputs":[{"name":"_supply","type":"uint256"}]},
        {"type":"function","name":"transfer","inputs":[{"name":"_to","type":"address"},{"name":"_value","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"balanceOf","constant":true,"inputs":[{"name":"_owner","type":"address"}],"outputs":[{"name":"balance","type":"uint256"}]},
        {"type":"function","name":"info","stateMutability":"view","inputs":[],"outputs":[{"name":"name","type":"string"},{"name":"","type":"uint8"}]},
        {"type":"event","name":"Transfer","inputs":[{"name":"from","type":"address","indexed":true}]}
    ]"#;

    fn binding(pairs: &[(&str, Value)]) -> ParameterBinding {
        let mut b = ParameterBinding::new();
        for (k, v) in pairs {
            b.insert(*k, v.clone());
        }
        b
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("_amount"), "amount");
        assert_eq!(canonical_name("amount"), "amount");
        assert_eq!(canonical_name("__x"), "_x");
        assert_eq!(canonical_name(""), "");
    }

    #[test]
    fn test_parse_abi() {
        let abi = Abi::from_json(TOKEN_ABI).unwrap();
        assert_eq!(abi.entries().len(), 5);
        assert_eq!(abi.functions().len(), 3);

        let ctor = abi.constructor().unwrap();
        assert_eq!(ctor.kind, MethodKind::Constructor);
        assert_eq!(ctor.param_names().collect::<Vec<_>>(), vec!["supply"]);

        let kinds: Vec<_> = abi.functions().iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![MethodKind::Mutating, MethodKind::Constant, MethodKind::Constant]
        );
    }

    #[test]
    fn test_entry_type_defaults_to_function() {
        let abi = Abi::from_json(r#"[{"name":"ping","inputs":[]}]"#).unwrap();
        assert_eq!(abi.functions()[0].name, "ping");
    }

    #[test]
    fn test_duplicate_canonical_names_rejected() {
        let result = Abi::from_json(
            r#"[{"type":"function","name":"f","inputs":[{"name":"_a"},{"name":"a"}]}]"#,
        );
        assert!(matches!(result, Err(TxError::InvalidArguments(_))));
    }

    #[test]
    fn test_unnamed_inputs_bind_by_position() {
        let abi = Abi::from_json(
            r#"[
            {"type":"function","name":"f","inputs":[{"name":"","type":"uint256"},{"name":"","type":"uint256"}]},
            {"type":"function","name":"g","inputs":[{"name":"_x","type":"bool"}]}
        ]"#,
        )
        .unwrap();

        let f = abi.find_method("f", &binding(&[("0", json!(1)), ("1", json!(2))])).unwrap();
        let names: Vec<&str> = f.parameters.iter().map(|p| p.canonical_name.as_str()).collect();
        assert_eq!(names, ["0", "1"]);
        assert_eq!(f.signature().unwrap(), "f(uint256,uint256)");

        let args = crate::args::normalize(vec![json!(7).into(), json!(8).into()], &f.parameters)
            .unwrap()
            .binding;
        assert_eq!(f.ordered_args(&args).unwrap(), vec![json!(7), json!(8)]);

        assert!(abi.find_method("g", &binding(&[("x", json!(true))])).is_ok());
    }

    #[test]
    fn test_find_method() {
        let abi = Abi::from_json(TOKEN_ABI).unwrap();
        let b = binding(&[("to", json!("0x01")), ("value", json!(1))]);
        assert_eq!(abi.find_method("transfer", &b).unwrap().name, "transfer");

        let b = binding(&[("to", json!("0x01"))]);
        assert_eq!(
            abi.find_method("transfer", &b),
            Err(TxError::MissingParameter("value".into()))
        );

        assert_eq!(
            abi.find_method("mint", &b),
            Err(TxError::MethodNotFound("mint".into()))
        );
        // events are not callable
        assert_eq!(
            abi.find_method("Transfer", &ParameterBinding::new()),
            Err(TxError::MethodNotFound("Transfer".into()))
        );
    }

    #[test]
    fn test_ordered_args_follow_declaration() {
        let abi = Abi::from_json(TOKEN_ABI).unwrap();
        let b = binding(&[("value", json!(5)), ("to", json!("0xabc"))]);
        let method = abi.find_method("transfer", &b).unwrap();
        assert_eq!(method.ordered_args(&b).unwrap(), vec![json!("0xabc"), json!(5)]);
    }

    #[test]
    fn test_encode_call() {
        let abi = Abi::from_json(TOKEN_ABI).unwrap();
        let transfer = &abi.functions()[0];
        assert_eq!(transfer.signature().unwrap(), "transfer(address,uint256)");

        let data = transfer
            .encode_call(&[json!("0x1234567890123456789012345678901234567890"), json!(1000)])
            .unwrap();
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 68);
    }

    #[test]
    fn test_encode_untyped_param_fails() {
        let abi = Abi::from_json(
            r#"[{"type":"function","name":"transfer","inputs":[{"name":"_to"},{"name":"_value"}]}]"#,
        )
        .unwrap();
        let result = abi.functions()[0].encode_call(&[json!("0xABC"), json!(100)]);
        assert!(matches!(result, Err(TxError::InvalidArguments(_))));
    }

    #[test]
    fn test_decode_output_shapes() {
        let abi = Abi::from_json(TOKEN_ABI).unwrap();

        let mut word = [0u8; 32];
        word[31] = 100;
        assert_eq!(abi.functions()[1].decode_output(&word).unwrap(), json!("100"));

        let info = &abi.functions()[2];
        let data = encode(
            &[ParamType::String, ParamType::Uint(8)],
            &[
                Token::String("Gold".into()),
                Token::Uint(18u64.into()),
            ],
        )
        .unwrap();
        assert_eq!(
            info.decode_output(&data).unwrap(),
            json!({"name": "Gold", "1": "18"})
        );
    }
}
