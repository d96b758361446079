//! Wrapping callables with a contract
//!
//! A wrapped callable keeps its calling convention: arguments go in as a
//! tuple, the callee's return value comes back unchanged. Only the contract
//! outcome is added around it.
//!
//! ```
//! use dbc_core::{Contract, ContractSpec, EnforcementMode};
//!
//! let spec = ContractSpec::builder()
//!     .pre("isinstance(x, int) and isinstance(y, int)")
//!     .post("RETURN == x + y")
//!     .build();
//! let add = Contract::compile(&spec)
//!     .unwrap()
//!     .with_mode(EnforcementMode::Full)
//!     .wrap("add", &["x", "y"], |(x, y): (i64, i64)| x + y)
//!     .unwrap();
//! assert_eq!(add.call((3, 5)).unwrap(), 8);
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use crate::contract::Contract;
use crate::error::CallError;
use crate::value::{ToValue, Value};
use crate::{Error, Result};

/// Argument tuples a contracted callable can take
pub trait Arguments {
    const ARITY: usize;

    /// Argument values in declaration order
    fn values(&self) -> Vec<Value>;
}

impl Arguments for () {
    const ARITY: usize = 0;

    fn values(&self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! tuple_arguments {
    ($($arity:literal => ($($name:ident),+);)+) => {
        $(impl<$($name: ToValue),+> Arguments for ($($name,)+) {
            const ARITY: usize = $arity;

            #[allow(non_snake_case)]
            fn values(&self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.to_value()),+]
            }
        })+
    };
}

tuple_arguments! {
    1 => (A);
    2 => (A, B);
    3 => (A, B, C);
    4 => (A, B, C, D);
    5 => (A, B, C, D, E);
    6 => (A, B, C, D, E, F);
    7 => (A, B, C, D, E, F, G);
    8 => (A, B, C, D, E, F, G, H);
}

/// Check arity and run the verifier before anything is wrapped.
pub(crate) fn prepare(contract: &Contract, callable: &str, params: &[&str], arity: usize) -> Result<()> {
    if params.len() != arity {
        return Err(Error::Arity {
            callable: callable.to_string(),
            expected: params.len(),
            found: arity,
        });
    }

    let result = contract.verify(params);
    for warning in result.warnings() {
        tracing::warn!(callable, %warning, "contract warning");
    }
    if !result.is_valid() {
        return Err(Error::InvalidContract {
            callable: callable.to_string(),
            diagnostics: result.errors().into_iter().cloned().collect(),
        });
    }
    Ok(())
}

pub(crate) fn bind_arguments(params: &[String], values: Vec<Value>) -> Vec<(String, Value)> {
    params.iter().cloned().zip(values).collect()
}

impl Contract {
    /// Wrap `f` so every call runs through this contract.
    ///
    /// `params` names the elements of the argument tuple, in order.
    ///
    /// # Errors
    /// `Arity` if `params` does not match the tuple size, `InvalidContract`
    /// if static verification finds errors.
    pub fn wrap<A, R, F>(self, name: impl Into<String>, params: &[&str], f: F) -> Result<Contracted<A, F>>
    where
        A: Arguments,
        F: Fn(A) -> R,
    {
        let name = name.into();
        prepare(&self, &name, params, A::ARITY)?;
        Ok(Contracted {
            name,
            params: params.iter().map(|p| p.to_string()).collect(),
            contract: Arc::new(self),
            f,
            _args: PhantomData,
        })
    }
}

/// A callable wrapped in a contract
pub struct Contracted<A, F> {
    name: String,
    params: Vec<String>,
    contract: Arc<Contract>,
    f: F,
    _args: PhantomData<fn(A)>,
}

impl<A: Arguments, F> Contracted<A, F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Call through the contract; returns exactly what the callee returned.
    pub fn call<R>(&self, args: A) -> Result<R>
    where
        F: Fn(A) -> R,
        R: ToValue,
    {
        if self.contract.mode().is_disabled() {
            return Ok((self.f)(args));
        }
        let invocation = self
            .contract
            .enter(&self.name, bind_arguments(&self.params, args.values()))?;
        let returned = (self.f)(args);
        invocation.exit(&returned.to_value())?;
        Ok(returned)
    }

    /// Call a fallible callee. Its `Err` passes through untouched and skips
    /// the remaining checks.
    pub fn try_call<R, E>(&self, args: A) -> std::result::Result<R, CallError<E>>
    where
        F: Fn(A) -> std::result::Result<R, E>,
        R: ToValue,
    {
        if self.contract.mode().is_disabled() {
            return (self.f)(args).map_err(CallError::Callee);
        }
        let invocation = self
            .contract
            .enter(&self.name, bind_arguments(&self.params, args.values()))?;
        let returned = (self.f)(args).map_err(CallError::Callee)?;
        invocation.exit(&returned.to_value())?;
        Ok(returned)
    }
}

impl<A, F> std::fmt::Debug for Contracted<A, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contracted")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnforcementMode;
    use crate::spec::ContractSpec;
    use std::cell::Cell;

    fn compile(spec: ContractSpec) -> Contract {
        Contract::compile(&spec).unwrap().with_mode(EnforcementMode::Full)
    }

    #[test]
    fn test_arguments_values() {
        assert_eq!(().values(), Vec::<Value>::new());
        assert_eq!((1, "a").values(), vec![Value::Integer(1), Value::String("a".into())]);
        assert_eq!(<(i64, i64, bool) as Arguments>::ARITY, 3);
    }

    #[test]
    fn test_call_returns_callee_value() {
        let square = compile(ContractSpec::builder().post("RETURN == x * x").build())
            .wrap("square", &["x"], |(x,): (i64,)| x * x)
            .unwrap();
        assert_eq!(square.call((7,)).unwrap(), 49);
    }

    #[test]
    fn test_arity_mismatch() {
        let err = compile(ContractSpec::default())
            .wrap("f", &["x", "y"], |(x,): (i64,)| x)
            .unwrap_err();
        assert!(matches!(err, Error::Arity { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_invalid_contract_rejected_at_wrap() {
        let err = compile(ContractSpec::builder().pre("RETURN > 0").build())
            .wrap("f", &["x"], |(x,): (i64,)| x)
            .unwrap_err();
        match err {
            Error::InvalidContract { callable, diagnostics } => {
                assert_eq!(callable, "f");
                assert_eq!(diagnostics.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_precondition_blocks_callee() {
        let ran = Cell::new(false);
        let f = compile(ContractSpec::builder().pre("x > 0").build())
            .wrap("f", &["x"], |(x,): (i64,)| {
                ran.set(true);
                x
            })
            .unwrap();
        assert!(matches!(f.call((0,)), Err(Error::PreconditionViolation(_))));
        assert!(!ran.get());
    }

    #[test]
    fn test_try_call_passes_callee_error() {
        let parse = compile(ContractSpec::builder().post("RETURN >= 0").build())
            .wrap("parse", &["text"], |(text,): (&str,)| text.parse::<i64>())
            .unwrap();
        assert_eq!(parse.try_call(("12",)).unwrap(), 12);
        assert!(matches!(parse.try_call(("x",)), Err(CallError::Callee(_))));
        assert!(matches!(
            parse.try_call(("-1",)),
            Err(CallError::Contract(Error::PostconditionViolation(_)))
        ));
    }

    #[test]
    fn test_disabled_is_transparent() {
        let f = compile(ContractSpec::builder().pre("False").build())
            .with_mode(EnforcementMode::Disabled)
            .wrap("f", &[], |(): ()| 1)
            .unwrap();
        assert_eq!(f.call(()).unwrap(), 1);
    }
}
