//! Contracts for types with methods
//!
//! A [`ClassContract`] registers, up front, a contract for each method name
//! plus class invariants over `self` that must hold whenever a method is
//! entered or returns. The receiver is converted with [`ToValue`] and bound
//! as `self`, and re-read after the method body runs.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::EnforcementMode;
use crate::contract::{Condition, Contract};
use crate::error::CallError;
use crate::eval::{Ambient, Functions};
use crate::spec::{ContractSpec, Section};
use crate::value::ToValue;
use crate::verifier::SELF;
use crate::wrapper::{bind_arguments, prepare, Arguments};
use crate::{Error, Result};

/// Per-method contracts sharing one set of class invariants
#[derive(Debug, Clone)]
pub struct ClassContract {
    methods: BTreeMap<String, Contract>,
}

impl ClassContract {
    pub fn builder() -> ClassContractBuilder {
        ClassContractBuilder::default()
    }

    /// Compiled contract of `method`, class invariants included
    pub fn method(&self, method: &str) -> Option<&Contract> {
        self.methods.get(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Wrap a method body `f(&mut receiver, args)` under the contract
    /// registered for `method`.
    ///
    /// # Errors
    /// `UnknownMethod` if nothing was registered under `method`, plus the
    /// same checks as [`Contract::wrap`].
    pub fn wrap_method<T, A, R, F>(
        &self,
        method: &str,
        params: &[&str],
        f: F,
    ) -> Result<ContractedMethod<T, A, F>>
    where
        T: ToValue,
        A: Arguments,
        F: Fn(&mut T, A) -> R,
    {
        let contract = self.methods.get(method).ok_or_else(|| Error::UnknownMethod {
            method: method.to_string(),
        })?;
        prepare(contract, method, params, A::ARITY)?;
        Ok(ContractedMethod {
            name: method.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            contract: Arc::new(contract.clone()),
            f,
            _marker: PhantomData,
        })
    }
}

/// Explicit registration of class invariants and method contracts
#[derive(Debug, Default)]
pub struct ClassContractBuilder {
    invariants: Vec<String>,
    methods: Vec<(String, ContractSpec)>,
    ambient: Ambient,
    functions: Functions,
    mode: Option<EnforcementMode>,
}

impl ClassContractBuilder {
    /// Boolean expression over `self` that must hold on entry and exit
    pub fn invariant(mut self, expression: impl Into<String>) -> Self {
        self.invariants.push(expression.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>, spec: ContractSpec) -> Self {
        self.methods.push((name.into(), spec));
        self
    }

    pub fn ambient(mut self, ambient: Ambient) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn functions(mut self, functions: Functions) -> Self {
        self.functions = functions;
        self
    }

    pub fn mode(mut self, mode: EnforcementMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Compile every method contract. A method registered twice keeps the
    /// last registration.
    pub fn build(self) -> Result<ClassContract> {
        let invariants = self
            .invariants
            .iter()
            .map(|source| Condition::compile(Section::ClassInvariant, source))
            .collect::<Result<Vec<_>>>()?;
        let mode = self.mode.unwrap_or_else(EnforcementMode::from_env);

        let mut methods = BTreeMap::new();
        for (name, spec) in self.methods {
            let contract = Contract::compile(&spec)?
                .with_class_invariants(invariants.clone())
                .with_ambient(self.ambient.clone())
                .with_functions(self.functions.clone())
                .with_mode(mode);
            if methods.insert(name.clone(), contract).is_some() {
                tracing::warn!(method = %name, "method contract registered twice");
            }
        }
        Ok(ClassContract { methods })
    }
}

/// A method body wrapped in its class contract
pub struct ContractedMethod<T, A, F> {
    name: String,
    params: Vec<String>,
    contract: Arc<Contract>,
    f: F,
    _marker: PhantomData<fn(&mut T, A)>,
}

impl<T: ToValue, A: Arguments, F> ContractedMethod<T, A, F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call<R>(&self, target: &mut T, args: A) -> Result<R>
    where
        F: Fn(&mut T, A) -> R,
        R: ToValue,
    {
        if self.contract.mode().is_disabled() {
            return Ok((self.f)(target, args));
        }
        let mut bindings = bind_arguments(&self.params, args.values());
        bindings.push((SELF.to_string(), target.to_value()));
        let mut invocation = self.contract.enter(&self.name, bindings)?;

        let returned = (self.f)(target, args);
        invocation.bind(SELF, &*target);
        invocation.exit(&returned.to_value())?;
        Ok(returned)
    }

    pub fn try_call<R, E>(&self, target: &mut T, args: A) -> std::result::Result<R, CallError<E>>
    where
        F: Fn(&mut T, A) -> std::result::Result<R, E>,
        R: ToValue,
    {
        if self.contract.mode().is_disabled() {
            return (self.f)(target, args).map_err(CallError::Callee);
        }
        let mut bindings = bind_arguments(&self.params, args.values());
        bindings.push((SELF.to_string(), target.to_value()));
        let mut invocation = self.contract.enter(&self.name, bindings)?;

        let returned = (self.f)(target, args).map_err(CallError::Callee)?;
        invocation.bind(SELF, &*target);
        invocation.exit(&returned.to_value())?;
        Ok(returned)
    }
}

impl<T, A, F> std::fmt::Debug for ContractedMethod<T, A, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractedMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    struct Account {
        balance: i64,
    }

    impl ToValue for Account {
        fn to_value(&self) -> Value {
            Value::Object(BTreeMap::from([(
                "balance".to_string(),
                Value::Integer(self.balance),
            )]))
        }
    }

    fn account_contract() -> ClassContract {
        ClassContract::builder()
            .invariant("self.balance >= 0")
            .method(
                "withdraw",
                ContractSpec::builder()
                    .pre("amount > 0")
                    .post("RETURN == self.balance")
                    .build(),
            )
            .mode(EnforcementMode::Full)
            .build()
            .unwrap()
    }

    #[test]
    fn test_method_call_binds_self() {
        let withdraw = account_contract()
            .wrap_method("withdraw", &["amount"], |acct: &mut Account, (amount,): (i64,)| {
                acct.balance -= amount;
                acct.balance
            })
            .unwrap();
        let mut acct = Account { balance: 10 };
        assert_eq!(withdraw.call(&mut acct, (4,)).unwrap(), 6);
        assert_eq!(acct.balance, 6);
    }

    #[test]
    fn test_class_invariant_checked_on_exit() {
        let withdraw = account_contract()
            .wrap_method("withdraw", &["amount"], |acct: &mut Account, (amount,): (i64,)| {
                acct.balance -= amount;
                acct.balance
            })
            .unwrap();
        let mut acct = Account { balance: 3 };
        let err = withdraw.call(&mut acct, (5,)).unwrap_err();
        let violation = err.violation().unwrap();
        assert_eq!(violation.section, Section::ClassInvariant);
        assert_eq!(violation.expression, "self.balance >= 0");
    }

    #[test]
    fn test_class_invariant_checked_on_entry() {
        let ran = std::cell::Cell::new(false);
        let withdraw = account_contract()
            .wrap_method("withdraw", &["amount"], |acct: &mut Account, (_,): (i64,)| {
                ran.set(true);
                acct.balance
            })
            .unwrap();
        let mut acct = Account { balance: -1 };
        assert!(matches!(
            withdraw.call(&mut acct, (1,)),
            Err(Error::InvariantViolation(_))
        ));
        assert!(!ran.get());
    }

    #[test]
    fn test_unknown_method() {
        let err = account_contract()
            .wrap_method("deposit", &["amount"], |acct: &mut Account, (_,): (i64,)| acct.balance)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMethod { ref method } if method == "deposit"));
    }

    #[test]
    fn test_methods_listed_sorted() {
        let class = ClassContract::builder()
            .method("b", ContractSpec::default())
            .method("a", ContractSpec::default())
            .build()
            .unwrap();
        assert_eq!(class.methods().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
