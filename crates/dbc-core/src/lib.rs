//! dbc-core - design-by-contract enforcement for Rust callables
//!
//! Preconditions, postconditions and invariants are written as small
//! expressions, compiled once, and checked around every call of the wrapped
//! callable.
//!
//! # Architecture
//!
//! ```text
//! Contract text / builder / JSON → ContractSpec → Contract (compiled AST)
//!                                                    ↓
//!                               Verifier → scope, functions, redundancy
//!                                                    ↓
//! call → bind args → snapshot invariants → pre → callee → invariants → post
//!                                                    ↓
//!                                            Violation report
//! ```
//!
//! # Guarantees
//!
//! - **Transparent**: a passing call returns exactly what the callee returned
//! - **Fail fast**: a false precondition means the callee never runs
//! - **No code evaluation**: expressions are a restricted grammar, parsed once
//! - **Re-entrant**: every invocation owns its invariant snapshot
//!
//! # Example
//!
//! ```
//! use dbc_core::{Contract, EnforcementMode, Error};
//!
//! let contract = Contract::parse(
//!     "Adds two integers.
//!
//!     pre:
//!       - isinstance(x, int) and isinstance(y, int)
//!     post:
//!       - RETURN == x + y
//!     ",
//! )
//! .unwrap()
//! .with_mode(EnforcementMode::Full);
//!
//! let add = contract
//!     .wrap("add", &["x", "y"], |(x, y): (i64, f64)| x as f64 + y)
//!     .unwrap();
//! assert!(matches!(add.call((3, 5.0)), Err(Error::PreconditionViolation(_))));
//! ```

pub mod class;
pub mod config;
pub mod contract;
pub mod error;
pub mod eval;
pub mod parser;
pub mod report;
pub mod spec;
pub mod stack;
pub mod value;
pub mod verifier;
pub mod wrapper;

pub use class::{ClassContract, ContractedMethod};
pub use config::EnforcementMode;
pub use contract::{Condition, Contract, Invocation, Stage};
pub use error::{CallError, Error, EvalError, Result};
pub use eval::{Ambient, Environment, ExpressionEvaluator, Functions, RETURN};
pub use report::Violation;
pub use spec::{ContractSpec, Section};
pub use value::{ToValue, Value};
pub use wrapper::{Arguments, Contracted};
