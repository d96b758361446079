//! Compiled contracts and the per-call state machine
//!
//! A [`Contract`] is compiled once from a [`ContractSpec`]; calls never
//! re-parse. Each call is an [`Invocation`] that walks
//!
//! ```text
//! Entry → PreChecked → Invoked → InvariantsRechecked → PostChecked → Returned
//! ```
//!
//! or stops in `Failed(section)`. [`Contract::enter`] runs up to
//! `PreChecked`; [`Invocation::exit`] runs the rest once the callee returned.
//! The invariant snapshot lives in the invocation itself, so nested and
//! recursive calls never see each other's snapshot.

use crate::config::EnforcementMode;
use crate::error::EvalError;
use crate::eval::{Ambient, Environment, ExpressionEvaluator, Functions, RETURN};
use crate::parser::ast::Expr;
use crate::parser::parse_expression;
use crate::report::{render_template, Violation};
use crate::spec::{ContractSpec, Section};
use crate::stack::{self, FrameGuard};
use crate::value::{ToValue, Value};
use crate::verifier::{self, VerificationResult};
use crate::{Error, Result};

/// One compiled expression together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn compile(section: Section, source: &str) -> Result<Self> {
        let expr = parse_expression(source).map_err(|e| Error::InvalidExpression {
            section,
            expression: source.to_string(),
            message: match e {
                Error::Parse { message, .. } => message,
                other => other.to_string(),
            },
        })?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// A compiled contract: expression lists plus the names they may call or read
#[derive(Debug, Clone, Default)]
pub struct Contract {
    pre: Vec<Condition>,
    post: Vec<Condition>,
    invariants: Vec<Condition>,
    class_invariants: Vec<Condition>,
    message: Option<String>,
    ambient: Ambient,
    functions: Functions,
    mode: EnforcementMode,
}

impl Contract {
    /// Compile every expression of `spec`.
    ///
    /// The enforcement mode is taken from `DBC_MODE`; see [`Contract::with_mode`].
    pub fn compile(spec: &ContractSpec) -> Result<Self> {
        let compile_all = |section: Section| -> Result<Vec<Condition>> {
            spec.section(section)
                .iter()
                .map(|source| Condition::compile(section, source))
                .collect()
        };
        let contract = Self {
            pre: compile_all(Section::Pre)?,
            post: compile_all(Section::Post)?,
            invariants: compile_all(Section::Invariant)?,
            class_invariants: Vec::new(),
            message: spec.message.clone(),
            ambient: Ambient::new(),
            functions: Functions::new(),
            mode: EnforcementMode::from_env(),
        };
        tracing::debug!(
            pre = contract.pre.len(),
            post = contract.post.len(),
            invariants = contract.invariants.len(),
            "contract compiled"
        );
        Ok(contract)
    }

    /// Extract a contract block from documentation text and compile it
    pub fn parse(text: &str) -> Result<Self> {
        Self::compile(&ContractSpec::parse(text)?)
    }

    pub fn with_ambient(mut self, ambient: Ambient) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn with_functions(mut self, functions: Functions) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_mode(mut self, mode: EnforcementMode) -> Self {
        self.mode = mode;
        self
    }

    pub(crate) fn with_class_invariants(mut self, invariants: Vec<Condition>) -> Self {
        self.class_invariants = invariants;
        self
    }

    pub fn conditions(&self, section: Section) -> &[Condition] {
        match section {
            Section::Pre => &self.pre,
            Section::Post => &self.post,
            Section::Invariant => &self.invariants,
            Section::ClassInvariant => &self.class_invariants,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn ambient(&self) -> &Ambient {
        &self.ambient
    }

    pub fn functions(&self) -> &Functions {
        &self.functions
    }

    pub fn mode(&self) -> EnforcementMode {
        self.mode
    }

    /// Static checks against the parameter names the contract will be bound to
    pub fn verify(&self, params: &[&str]) -> VerificationResult {
        verifier::verify(self, params)
    }

    /// Start a call: snapshot invariants, then check preconditions.
    ///
    /// Manual mode: call the body yourself, then hand its result to
    /// [`Invocation::exit`]. Locals can be exposed to postconditions with
    /// [`Invocation::bind`].
    ///
    /// # Errors
    /// `PreconditionViolation` on the first false precondition,
    /// `InvariantViolation` if a class invariant does not hold, and
    /// `Evaluation` if any expression cannot be evaluated.
    pub fn enter<I, N>(&self, callable: &str, bindings: I) -> Result<Invocation<'_>>
    where
        I: IntoIterator<Item = (N, Value)>,
        N: Into<String>,
    {
        let bindings = bindings.into_iter().map(|(name, value)| (name.into(), value));
        let mut invocation = Invocation {
            contract: self,
            callable: callable.to_string(),
            env: Environment::with_bindings(&self.ambient, bindings),
            snapshot: Vec::new(),
            stage: Stage::Entry,
            _frame: None,
        };
        if self.mode.is_disabled() {
            invocation.stage = Stage::PreChecked;
            return Ok(invocation);
        }

        invocation._frame = Some(FrameGuard::push(callable));
        if self.mode.checks_exit() {
            invocation.require(Section::ClassInvariant)?;
            invocation.snapshot = invocation.snapshot_invariants()?;
        }
        invocation.require(Section::Pre)?;
        invocation.advance(Stage::PreChecked);
        Ok(invocation)
    }
}

// ── Invocation ────────────────────────────────────────────

/// Position of a call in the contract state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Entry,
    PreChecked,
    Invoked,
    InvariantsRechecked,
    PostChecked,
    Returned,
    Failed(Section),
}

/// One in-flight call of a contracted callable
#[derive(Debug)]
pub struct Invocation<'c> {
    contract: &'c Contract,
    callable: String,
    env: Environment<'c>,
    /// Invariant values taken before the callee ran, in declaration order
    snapshot: Vec<Value>,
    stage: Stage,
    _frame: Option<FrameGuard>,
}

impl<'c> Invocation<'c> {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn callable(&self) -> &str {
        &self.callable
    }

    pub fn environment(&self) -> &Environment<'c> {
        &self.env
    }

    /// Add or replace a binding visible to the remaining checks
    pub fn bind(&mut self, name: impl Into<String>, value: impl ToValue) {
        self.env.bind(name, value.to_value());
    }

    /// Finish the call: re-check invariants, bind `RETURN`, check postconditions.
    ///
    /// Callee side effects are never rolled back.
    pub fn exit(mut self, returned: &Value) -> Result<()> {
        self.advance(Stage::Invoked);
        if !self.contract.mode.checks_exit() {
            self.advance(Stage::Returned);
            return Ok(());
        }

        self.require(Section::ClassInvariant)?;
        self.recheck_invariants()?;
        self.advance(Stage::InvariantsRechecked);

        self.env.bind(RETURN, returned.clone());
        self.require(Section::Post)?;
        self.advance(Stage::PostChecked);

        self.advance(Stage::Returned);
        Ok(())
    }

    fn advance(&mut self, stage: Stage) {
        tracing::trace!(callable = %self.callable, ?stage, "contract stage");
        self.stage = stage;
    }

    fn evaluator(&self) -> ExpressionEvaluator<'c> {
        ExpressionEvaluator::new(&self.contract.functions)
    }

    /// Every condition of `section` must be truthy; first failure wins.
    fn require(&mut self, section: Section) -> Result<()> {
        let contract = self.contract;
        for condition in contract.conditions(section) {
            match self.evaluator().check(condition.expr(), &self.env) {
                Ok(true) => {
                    tracing::trace!(%section, expression = condition.source(), "check passed")
                }
                Ok(false) => return Err(self.violated(section, condition, None)),
                Err(source) => return Err(self.evaluation_failed(section, condition, source)),
            }
        }
        Ok(())
    }

    fn snapshot_invariants(&mut self) -> Result<Vec<Value>> {
        let contract = self.contract;
        let mut values = Vec::with_capacity(contract.invariants.len());
        for condition in &contract.invariants {
            match self.evaluator().evaluate(condition.expr(), &self.env) {
                Ok(value) => values.push(value),
                Err(source) => {
                    return Err(self.evaluation_failed(Section::Invariant, condition, source))
                }
            }
        }
        Ok(values)
    }

    fn recheck_invariants(&mut self) -> Result<()> {
        let contract = self.contract;
        let before = std::mem::take(&mut self.snapshot);
        for (condition, before) in contract.invariants.iter().zip(before) {
            let after = match self.evaluator().evaluate(condition.expr(), &self.env) {
                Ok(value) => value,
                Err(source) => {
                    return Err(self.evaluation_failed(Section::Invariant, condition, source))
                }
            };
            if !before.same_as(&after) {
                return Err(self.violated(Section::Invariant, condition, Some((before, after))));
            }
        }
        Ok(())
    }

    fn violated(
        &mut self,
        section: Section,
        condition: &Condition,
        change: Option<(Value, Value)>,
    ) -> Error {
        self.stage = Stage::Failed(section);
        let (before, after) = match change {
            Some((before, after)) => (Some(before), Some(after)),
            None => (None, None),
        };
        let message = self
            .contract
            .message()
            .map(|template| render_template(template, |name| self.env.lookup(name)));
        let violation = Violation {
            section,
            callable: self.callable.clone(),
            expression: condition.source().to_string(),
            bindings: self.env.snapshot(condition.expr()),
            before,
            after,
            message,
            call_path: stack::call_path(),
        };
        tracing::debug!(
            %section,
            callable = %violation.callable,
            expression = %violation.expression,
            "contract violated"
        );
        Error::from_violation(violation)
    }

    fn evaluation_failed(&mut self, section: Section, condition: &Condition, source: EvalError) -> Error {
        self.stage = Stage::Failed(section);
        tracing::debug!(
            %section,
            callable = %self.callable,
            expression = condition.source(),
            error = %source,
            "contract could not be evaluated"
        );
        Error::Evaluation {
            callable: self.callable.clone(),
            section,
            expression: condition.source().to_string(),
            source,
        }
    }
}
