//! Typed-at-runtime contract bindings generated from an ABI
//!
//! A [`Binding`] is built once per ABI. It deploys new instances and
//! attaches to existing ones; each [`Contract`] exposes one invocable
//! method per ABI function.
//!
//! ```rust
//! use runeth::{Arg, Binding, MockNode, TxRunner};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), runeth::TxError> {
//! let binding = Binding::from_json(
//!     r#"[{"type":"function","name":"set","inputs":[{"name":"_value","type":"uint256"}]}]"#,
//!     "0x6080",
//! )?;
//! let runner = TxRunner::new(MockNode::new());
//!
//! let contract = binding.deploy(&runner, vec![]).await?;
//! let receipt = contract.method("set")?.send(vec![Arg::from(json!(42))]).await?;
//! assert!(receipt.status);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use runeth_primitives::{Address, H256, U256};
use serde_json::Value;

use crate::abi::{Abi, MethodDescriptor, MethodKind, ParamDescriptor};
use crate::args::{normalize, split_callback, Arg};
use crate::node::Receipt;
use crate::outcome::{TxHandle, TxOutcome};
use crate::submitter::TxRunner;
use crate::TxError;

struct BindingInner {
    abi: Abi,
    bytecode: Bytes,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

/// Contract binding generated from an ABI and creation bytecode
#[derive(Clone)]
pub struct Binding {
    inner: Arc<BindingInner>,
}

impl Binding {
    /// Generate a binding.
    ///
    /// Fails with [`TxError::UnsupportedOverload`] if two functions share a
    /// name.
    pub fn generate(abi: Abi, bytecode: impl Into<Bytes>) -> Result<Self, TxError> {
        let mut methods = HashMap::new();
        for method in abi.functions() {
            if methods
                .insert(method.name.clone(), Arc::clone(method))
                .is_some()
            {
                return Err(TxError::UnsupportedOverload(method.name.clone()));
            }
        }

        tracing::debug!(methods = methods.len(), "binding generated");
        Ok(Self {
            inner: Arc::new(BindingInner {
                abi,
                bytecode: bytecode.into(),
                methods,
            }),
        })
    }

    /// Generate from a JSON ABI and hex bytecode (`0x` optional)
    pub fn from_json(abi_json: &str, bytecode_hex: &str) -> Result<Self, TxError> {
        let abi = Abi::from_json(abi_json)?;
        let code = bytecode_hex.strip_prefix("0x").unwrap_or(bytecode_hex);
        Self::generate(abi, hex::decode(code)?)
    }

    /// The parsed ABI
    pub fn abi(&self) -> &Abi {
        &self.inner.abi
    }

    /// Creation bytecode
    pub fn bytecode(&self) -> &Bytes {
        &self.inner.bytecode
    }

    /// Function names in declaration order
    pub fn method_names(&self) -> Vec<&str> {
        self.inner
            .abi
            .functions()
            .iter()
            .map(|m| m.name.as_str())
            .collect()
    }

    fn constructor_params(&self) -> &[ParamDescriptor] {
        self.inner
            .abi
            .constructor()
            .map(|c| c.parameters.as_slice())
            .unwrap_or(&[])
    }

    /// Deploy a new instance.
    ///
    /// `args` are normalized against the constructor's parameters; the
    /// handle resolves to an instance bound to the deployed address.
    pub fn deploy(&self, runner: &TxRunner, mut args: Vec<Arg>) -> TxHandle<Contract> {
        let callback = split_callback(&mut args);
        let mut call = match normalize(args, self.constructor_params()) {
            Ok(call) => call,
            Err(err) => return TxHandle::failed(err, callback),
        };
        call.options.on_complete = callback;

        let binding = self.clone();
        let owner = runner.clone();
        runner
            .deploy(
                &self.inner.abi,
                self.inner.bytecode.clone(),
                &call.binding,
                call.options,
            )
            .map(move |deployment| binding.at(&owner, deployment.address))
    }

    /// Attach to an already deployed instance
    pub fn at(&self, runner: &TxRunner, address: Address) -> Contract {
        Contract {
            binding: self.clone(),
            runner: runner.clone(),
            address,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("methods", &self.method_names())
            .field("bytecode_len", &self.inner.bytecode.len())
            .finish()
    }
}

/// A binding attached to a contract address
#[derive(Clone)]
pub struct Contract {
    binding: Binding,
    runner: TxRunner,
    address: Address,
}

impl Contract {
    /// Contract address
    pub fn address(&self) -> Address {
        self.address
    }

    /// The generating binding
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Function names in declaration order
    pub fn method_names(&self) -> Vec<&str> {
        self.binding.method_names()
    }

    /// Method handle for `name`
    pub fn method(&self, name: &str) -> Result<ContractMethod, TxError> {
        let method = self
            .binding
            .inner
            .methods
            .get(name)
            .ok_or_else(|| TxError::MethodNotFound(name.to_string()))?;
        Ok(ContractMethod {
            contract: self.clone(),
            method: Arc::clone(method),
        })
    }

    /// Invoke `name`: constant methods are called, others submitted
    pub fn invoke(&self, name: &str, mut args: Vec<Arg>) -> TxHandle<TxOutcome> {
        match self.method(name) {
            Ok(method) => method.invoke(args),
            Err(err) => TxHandle::failed(err, split_callback(&mut args)),
        }
    }

    /// Balance of this contract
    pub async fn balance(&self) -> Result<U256, TxError> {
        self.runner.balance(self.address).await
    }

    /// Receipt lookup through this contract's runner
    pub async fn receipt(&self, hash: H256) -> Result<Option<Receipt>, TxError> {
        self.runner.receipt(hash).await
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("address", &self.address)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// One invocable function of a [`Contract`]
#[derive(Clone)]
pub struct ContractMethod {
    contract: Contract,
    method: Arc<MethodDescriptor>,
}

impl ContractMethod {
    /// Function name
    pub fn name(&self) -> &str {
        &self.method.name
    }

    /// ABI description
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Whether the function is read-only
    pub fn is_constant(&self) -> bool {
        self.method.kind == MethodKind::Constant
    }

    /// Call constant functions, submit the rest
    pub fn invoke(&self, args: Vec<Arg>) -> TxHandle<TxOutcome> {
        if self.is_constant() {
            self.call(args).map(TxOutcome::Value)
        } else {
            self.send(args).map(TxOutcome::Receipt)
        }
    }

    /// Execute as a read-only call regardless of kind
    pub fn call(&self, mut args: Vec<Arg>) -> TxHandle<Value> {
        let callback = split_callback(&mut args);
        let mut call = match normalize(args, &self.method.parameters) {
            Ok(call) => call,
            Err(err) => return TxHandle::failed(err, callback),
        };
        call.options.on_complete = callback;

        let c = &self.contract;
        c.runner.send_contract_const_tx(
            c.address,
            &c.binding.inner.abi,
            &self.method.name,
            &call.binding,
            call.options,
        )
    }

    /// Submit as a transaction
    pub fn send(&self, mut args: Vec<Arg>) -> TxHandle<Receipt> {
        let callback = split_callback(&mut args);
        let mut call = match normalize(args, &self.method.parameters) {
            Ok(call) => call,
            Err(err) => return TxHandle::failed(err, callback),
        };
        call.options.on_complete = callback;

        let c = &self.contract;
        c.runner.send_contract_tx(
            c.address,
            &c.binding.inner.abi,
            &self.method.name,
            &call.binding,
            call.options,
        )
    }
}

impl fmt::Debug for ContractMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractMethod")
            .field("name", &self.method.name)
            .field("kind", &self.method.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockNode, MOCK_CONTRACT};
    use serde_json::json;

    const COUNTER: &str = r#"[
        {"type":"constructor","inputs":[{"name":"_start","type":"uint256"}]},
        {"type":"function","name":"increment","inputs":[{"name":"_by","type":"uint256"}]},
        {"type":"function","name":"count","constant":true,"inputs":[],"outputs":[{"name":"","type":"uint256"}]},
        {"type":"event","name":"Incremented","inputs":[{"name":"by","type":"uint256","indexed":false}]}
    ]"#;

    #[test]
    fn test_generate_lists_functions() {
        let binding = Binding::from_json(COUNTER, "0x6080").unwrap();
        assert_eq!(binding.method_names(), vec!["increment", "count"]);
        assert_eq!(binding.bytecode()[..], [0x60u8, 0x80]);
    }

    #[test]
    fn test_overload_rejected() {
        let abi = r#"[
            {"type":"function","name":"f","inputs":[]},
            {"type":"function","name":"f","inputs":[{"name":"x","type":"uint256"}]}
        ]"#;
        assert_eq!(
            Binding::from_json(abi, "").unwrap_err(),
            TxError::UnsupportedOverload("f".into())
        );
    }

    #[test]
    fn test_bad_bytecode_hex() {
        assert!(matches!(
            Binding::from_json(COUNTER, "0xzz"),
            Err(TxError::InvalidHex(_))
        ));
    }

    #[tokio::test]
    async fn test_deploy_then_invoke() {
        let node = Arc::new(MockNode::new().with_call_result(json!("8")));
        let runner = TxRunner::with_config(node.clone(), Default::default());
        let binding = Binding::from_json(COUNTER, "0x6080").unwrap();

        let contract = binding.deploy(&runner, vec![json!(5).into()]).await.unwrap();
        assert_eq!(contract.address(), MOCK_CONTRACT);

        let outcome = contract.invoke("increment", vec![json!(3).into()]).await.unwrap();
        assert!(outcome.receipt().is_some());
        let outcome = contract.invoke("count", vec![]).await.unwrap();
        assert_eq!(outcome.value(), Some(&json!("8")));

        let sent = node.sent_requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].payload.args(), &[json!(5)]);
        assert_eq!(sent[1].to, Some(MOCK_CONTRACT));
        assert_eq!(sent[1].method_name(), Some("increment"));
    }

    #[tokio::test]
    async fn test_call_variant_on_mutating_method() {
        let node = Arc::new(MockNode::new().with_call_result(json!(null)));
        let runner = TxRunner::with_config(node.clone(), Default::default());
        let contract = Binding::from_json(COUNTER, "").unwrap().at(&runner, MOCK_CONTRACT);

        let method = contract.method("increment").unwrap();
        assert!(!method.is_constant());
        method.call(vec![json!(1).into()]).await.unwrap();

        assert!(node.sent_requests().is_empty());
        assert_eq!(node.call_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_args() {
        let node = Arc::new(MockNode::new());
        let runner = TxRunner::with_config(node.clone(), Default::default());
        let contract = Binding::from_json(COUNTER, "").unwrap().at(&runner, MOCK_CONTRACT);

        assert_eq!(
            contract.method("decrement").unwrap_err(),
            TxError::MethodNotFound("decrement".into())
        );

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let err = contract
            .invoke(
                "increment",
                vec![json!(1).into(), json!(2).into(), Arg::callback(move |r| seen2.lock().unwrap().push(r))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::InvalidArguments(_)));
        assert_eq!(*seen.lock().unwrap(), vec![Err(err)]);
        assert_eq!(node.accounts_calls(), 0);
    }
}
