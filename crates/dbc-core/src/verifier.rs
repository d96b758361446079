//! Contract verifier - static checks before a contract is first used
//!
//! Runs over the compiled expressions and the parameter names a callable
//! declares. It accumulates all diagnostics rather than stopping at the
//! first error, giving authors a complete picture.
//!
//! # Checks
//!
//! 1. **Scope** - `RETURN` only in postconditions; every name resolvable
//! 2. **Functions** - every call is a built-in or a registered predicate
//! 3. **Redundancy** - constant expressions, duplicates, and invariants that
//!    can never change during a call

use std::collections::BTreeSet;

use crate::contract::{Condition, Contract};
use crate::eval::RETURN;
use crate::spec::Section;

/// Name bound to the receiver of a class method
pub const SELF: &str = "self";

// ── Verification Result Types ─────────────────────────────

/// Result of contract verification - accumulates all diagnostics
#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no errors were found (warnings are OK)
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    fn add_error(&mut self, kind: DiagnosticKind, section: Section, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            kind,
            section,
            message,
        });
    }

    fn add_warning(&mut self, kind: DiagnosticKind, section: Section, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            section,
            message,
        });
    }
}

/// A single verification diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub section: Section,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} [{}] in {}: {}", prefix, self.kind, self.section, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Category of verification issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    ScopeError,
    UnknownFunction,
    Redundancy,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DiagnosticKind::ScopeError => write!(f, "scope"),
            DiagnosticKind::UnknownFunction => write!(f, "function"),
            DiagnosticKind::Redundancy => write!(f, "redundancy"),
        }
    }
}

// ── Public API ────────────────────────────────────────────

/// Verify a compiled contract against the parameter names it is bound to.
pub fn verify(contract: &Contract, params: &[&str]) -> VerificationResult {
    let mut result = VerificationResult::new();
    let params: BTreeSet<&str> = params.iter().copied().collect();

    for section in [
        Section::ClassInvariant,
        Section::Pre,
        Section::Invariant,
        Section::Post,
    ] {
        let conditions = contract.conditions(section);
        verify_scope(contract, section, conditions, &params, &mut result);
        verify_functions(contract, section, conditions, &mut result);
        verify_redundancy(section, conditions, &params, &mut result);
    }

    result
}

// ── Scope ─────────────────────────────────────────────────

fn verify_scope(
    contract: &Contract,
    section: Section,
    conditions: &[Condition],
    params: &BTreeSet<&str>,
    result: &mut VerificationResult,
) {
    for condition in conditions {
        for name in condition.expr().names() {
            if name == RETURN {
                if section != Section::Post {
                    result.add_error(
                        DiagnosticKind::ScopeError,
                        section,
                        format!(
                            "'{}' references RETURN, which is only bound for postconditions",
                            condition.source()
                        ),
                    );
                }
                continue;
            }
            if name == SELF || params.contains(name.as_str()) || contract.ambient().contains(&name) {
                continue;
            }
            result.add_warning(
                DiagnosticKind::ScopeError,
                section,
                format!(
                    "'{}' references '{}', which is neither a parameter nor an ambient name",
                    condition.source(),
                    name
                ),
            );
        }
    }
}

// ── Functions ─────────────────────────────────────────────

fn verify_functions(
    contract: &Contract,
    section: Section,
    conditions: &[Condition],
    result: &mut VerificationResult,
) {
    for condition in conditions {
        for function in condition.expr().functions() {
            if !contract.functions().contains(&function) {
                result.add_error(
                    DiagnosticKind::UnknownFunction,
                    section,
                    format!(
                        "'{}' calls '{}', which is neither built-in nor registered",
                        condition.source(),
                        function
                    ),
                );
            }
        }
    }
}

// ── Redundancy ────────────────────────────────────────────

fn verify_redundancy(
    section: Section,
    conditions: &[Condition],
    params: &BTreeSet<&str>,
    result: &mut VerificationResult,
) {
    let mut seen = BTreeSet::new();
    for condition in conditions {
        if !seen.insert(condition.source().trim()) {
            result.add_warning(
                DiagnosticKind::Redundancy,
                section,
                format!("'{}' is listed more than once", condition.source()),
            );
        }

        let names = condition.expr().names();
        if names.is_empty() {
            result.add_warning(
                DiagnosticKind::Redundancy,
                section,
                format!("'{}' references no names and is constant", condition.source()),
            );
        } else if section == Section::Invariant
            && names.iter().all(|n| params.contains(n.as_str()))
        {
            result.add_warning(
                DiagnosticKind::Redundancy,
                section,
                format!(
                    "'{}' only references parameters and cannot change during the call",
                    condition.source()
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Ambient, Functions};
    use crate::spec::ContractSpec;

    fn check(spec: ContractSpec, params: &[&str]) -> VerificationResult {
        Contract::compile(&spec)
            .unwrap()
            .with_ambient(Ambient::new().with_value("shared_list", Vec::<i64>::new()))
            .with_functions(Functions::new().predicate("even", |_| true))
            .verify(params)
    }

    fn kinds(diagnostics: Vec<&Diagnostic>) -> Vec<DiagnosticKind> {
        diagnostics.into_iter().map(|d| d.kind).collect()
    }

    // ── Valid contracts ───────────────────────────────────

    #[test]
    fn test_valid_contract() {
        let spec = ContractSpec::builder()
            .pre("isinstance(x, int) and even(y)")
            .post("RETURN == x + y")
            .invariant("len(shared_list)")
            .build();
        let result = check(spec, &["x", "y"]);
        assert!(result.is_valid());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn test_empty_contract_is_valid() {
        assert!(check(ContractSpec::default(), &[]).diagnostics.is_empty());
    }

    // ── Scope ─────────────────────────────────────────────

    #[test]
    fn test_return_outside_postcondition() {
        let spec = ContractSpec::builder().pre("RETURN > 0").invariant("RETURN").build();
        let result = check(spec, &[]);
        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 2);
        assert!(result.errors().iter().all(|d| d.kind == DiagnosticKind::ScopeError));
    }

    #[test]
    fn test_unknown_name_is_warning() {
        let result = check(ContractSpec::builder().pre("z > 0").build(), &["x"]);
        assert!(result.is_valid());
        assert_eq!(kinds(result.warnings()), vec![DiagnosticKind::ScopeError]);
    }

    #[test]
    fn test_self_is_always_in_scope() {
        let result = check(ContractSpec::builder().pre("self.z == 'Zyxxy'").build(), &[]);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_scope_reads_ambient_and_functions_from_contract() {
        let spec = ContractSpec::builder().pre("even(len(shared_list))").build();
        let bare = verify(&Contract::compile(&spec).unwrap(), &[]);
        assert_eq!(kinds(bare.errors()), vec![DiagnosticKind::UnknownFunction]);
        assert_eq!(kinds(bare.warnings()), vec![DiagnosticKind::ScopeError]);

        let configured = check(spec, &[]);
        assert!(configured.diagnostics.is_empty(), "{:?}", configured.diagnostics);
    }

    // ── Functions ─────────────────────────────────────────

    #[test]
    fn test_unknown_function_is_error() {
        let result = check(ContractSpec::builder().post("odd(RETURN)").build(), &[]);
        assert_eq!(kinds(result.errors()), vec![DiagnosticKind::UnknownFunction]);
    }

    // ── Redundancy ────────────────────────────────────────

    #[test]
    fn test_constant_expression_warns() {
        let result = check(ContractSpec::builder().pre("1 < 2").build(), &[]);
        assert_eq!(kinds(result.warnings()), vec![DiagnosticKind::Redundancy]);
    }

    #[test]
    fn test_duplicate_warns() {
        let result = check(ContractSpec::builder().pre("x > 0").pre("x > 0").build(), &["x"]);
        assert_eq!(kinds(result.warnings()), vec![DiagnosticKind::Redundancy]);
    }

    #[test]
    fn test_parameter_only_invariant_warns() {
        let result = check(ContractSpec::builder().invariant("len(items)").build(), &["items"]);
        assert_eq!(kinds(result.warnings()), vec![DiagnosticKind::Redundancy]);
    }

    #[test]
    fn test_accumulates_all_diagnostics() {
        let spec = ContractSpec::builder()
            .pre("RETURN > missing")
            .post("nope(RETURN)")
            .build();
        let result = check(spec, &[]);
        assert_eq!(result.errors().len(), 2);
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn test_diagnostic_display() {
        let result = check(ContractSpec::builder().pre("RETURN").build(), &[]);
        assert_eq!(
            result.errors()[0].to_string(),
            "error [scope] in precondition: 'RETURN' references RETURN, which is only bound for postconditions"
        );
    }
}
