//! Error types for contract enforcement
//!
//! All fallible operations return `Result<T, Error>`.
//! Violations carry a full [`Violation`] report; evaluation failures keep the
//! underlying [`EvalError`] as their source so a broken contract is never
//! mistaken for a failed one.

use crate::report::Violation;
use crate::spec::Section;
use crate::verifier::Diagnostic;

/// Contract layer error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed contract block or expression syntax
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// An expression supplied through a builder or JSON failed to compile
    #[error("Invalid {section} '{expression}': {message}")]
    InvalidExpression {
        section: Section,
        expression: String,
        message: String,
    },

    /// A precondition evaluated false; the callee never ran
    #[error("{0}")]
    PreconditionViolation(Box<Violation>),

    /// A postcondition evaluated false after the callee returned
    #[error("{0}")]
    PostconditionViolation(Box<Violation>),

    /// An invariant changed value, or a class invariant did not hold
    #[error("{0}")]
    InvariantViolation(Box<Violation>),

    /// The contract itself could not be evaluated
    #[error("Evaluation error in {section} of '{callable}': {expression}: {source}")]
    Evaluation {
        callable: String,
        section: Section,
        expression: String,
        #[source]
        source: EvalError,
    },

    /// Static verification found errors when the contract was bound
    #[error("Invalid contract for '{callable}': {}", summarize(.diagnostics))]
    InvalidContract {
        callable: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// Declared parameter names do not match the callable's argument count
    #[error("Arity mismatch for '{callable}': {expected} parameter names for {found} arguments")]
    Arity {
        callable: String,
        expected: usize,
        found: usize,
    },

    /// A class contract has no entry for the requested method
    #[error("No contract registered for method '{method}'")]
    UnknownMethod { method: String },
}

impl Error {
    /// The violation report, if this error is a contract violation
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Error::PreconditionViolation(v)
            | Error::PostconditionViolation(v)
            | Error::InvariantViolation(v) => Some(v),
            _ => None,
        }
    }

    /// Re-anchor a parse error at a line of an enclosing text block.
    pub(crate) fn at_line(self, line: usize, expression: &str) -> Self {
        match self {
            Error::Parse { message, .. } => Error::Parse {
                line,
                message: format!("in '{}': {}", expression, message),
            },
            other => other,
        }
    }

    pub(crate) fn from_violation(violation: Violation) -> Self {
        match violation.section {
            Section::Pre => Error::PreconditionViolation(Box::new(violation)),
            Section::Post => Error::PostconditionViolation(Box::new(violation)),
            Section::Invariant | Section::ClassInvariant => {
                Error::InvariantViolation(Box::new(violation))
            }
        }
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure to evaluate an expression against an environment.
///
/// Always distinct from an expression evaluating to `false`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("name '{name}' is not defined")]
    UnresolvedName { name: String },

    #[error("unsupported operand types for {op}: {left} and {right}")]
    UnsupportedOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in {op}")]
    Overflow { op: &'static str },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("no attribute or key '{name}'")]
    MissingAttribute { name: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("{function}() expects {expected} arguments, found {found}")]
    Arity {
        function: String,
        expected: &'static str,
        found: usize,
    },

    #[error("unknown type name '{name}' in isinstance()")]
    UnknownType { name: String },

    #[error("predicate '{name}' failed: {message}")]
    Predicate { name: String, message: String },
}

/// Outcome of calling a fallible contracted callable.
///
/// Callee errors pass through untouched; contract failures are kept apart.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    #[error(transparent)]
    Contract(#[from] Error),

    #[error("{0}")]
    Callee(E),
}

/// Result type alias for contract operations
pub type Result<T> = std::result::Result<T, Error>;
