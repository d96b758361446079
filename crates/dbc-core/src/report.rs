//! Violation reports
//!
//! A [`Violation`] is everything known about a failed check. Its `Display`
//! is the diagnostic shown to users:
//!
//! ```text
//! precondition violated in add: isinstance(x, int) and isinstance(y, int)
//!   x = 3.0
//!   y = 5
//! ```
//!
//! Reporting only formats; it never suppresses or retries a check.

use std::collections::BTreeMap;

use crate::spec::Section;
use crate::value::Value;

/// Placeholder text for a template name that cannot be resolved
pub const UNRESOLVED: &str = "???";

/// A failed contract check
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Violation {
    pub section: Section,
    pub callable: String,
    /// Expression text as written in the contract
    pub expression: String,
    /// Environment at the time of the check, sorted by name
    pub bindings: BTreeMap<String, Value>,
    /// Snapshot value for invariant changes
    pub before: Option<Value>,
    pub after: Option<Value>,
    /// Rendered message template, if the contract has one
    pub message: Option<String>,
    /// In-flight contracted calls on this thread, outermost first
    pub call_path: Vec<String>,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} violated in {}: {}",
            self.section, self.callable, self.expression
        )?;
        if let Some(ref message) = self.message {
            write!(f, "\n  {}", message)?;
        }
        if let Some(ref before) = self.before {
            write!(f, "\n  before = {}", before)?;
        }
        if let Some(ref after) = self.after {
            write!(f, "\n  after = {}", after)?;
        }
        for (name, value) in &self.bindings {
            write!(f, "\n  {} = {}", name, value)?;
        }
        if self.call_path.len() > 1 {
            write!(f, "\n  call path: {}", self.call_path.join(" > "))?;
        }
        Ok(())
    }
}

/// Render `{name}` / `{name.field}` placeholders.
///
/// `{{` and `}}` produce literal braces. Strings render without quotes;
/// anything `lookup` cannot resolve renders as `???`.
pub fn render_template(template: &str, lookup: impl Fn(&str) -> Option<Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut path = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    path.push(next);
                }
                if !closed {
                    out.push('{');
                    out.push_str(&path);
                    break;
                }
                match resolve(path.trim(), &lookup) {
                    Some(Value::String(s)) => out.push_str(&s),
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str(UNRESOLVED),
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn resolve(path: &str, lookup: &impl Fn(&str) -> Option<Value>) -> Option<Value> {
    let mut parts = path.split('.');
    let root = lookup(parts.next()?)?;
    parts.try_fold(root, |value, field| match value {
        Value::Object(mut fields) => fields.remove(field),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation() -> Violation {
        Violation {
            section: Section::Pre,
            callable: "add".into(),
            expression: "isinstance(x, int)".into(),
            bindings: BTreeMap::from([
                ("y".to_string(), Value::Integer(5)),
                ("x".to_string(), Value::Float(3.0)),
            ]),
            before: None,
            after: None,
            message: None,
            call_path: vec!["add".into()],
        }
    }

    // ── Display ───────────────────────────────────────────

    #[test]
    fn test_display_precondition() {
        assert_eq!(
            violation().to_string(),
            "precondition violated in add: isinstance(x, int)\n  x = 3.0\n  y = 5"
        );
    }

    #[test]
    fn test_display_invariant_change_and_path() {
        let v = Violation {
            section: Section::Invariant,
            callable: "g".into(),
            expression: "len(items)".into(),
            bindings: BTreeMap::new(),
            before: Some(Value::Integer(0)),
            after: Some(Value::Integer(1)),
            message: Some("items must not grow".into()),
            call_path: vec!["f".into(), "g".into()],
        };
        assert_eq!(
            v.to_string(),
            "invariant violated in g: len(items)\n  items must not grow\n  before = 0\n  after = 1\n  call path: f > g"
        );
    }

    #[test]
    fn test_display_is_deterministic_100_iterations() {
        let first = violation().to_string();
        for i in 0..100 {
            assert_eq!(first, violation().to_string(), "Non-determinism at iteration {}", i);
        }
    }

    // ── Templates ─────────────────────────────────────────

    fn lookup(name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::String("Ada".into())),
            "foo" => Some(Value::from_json(&serde_json::json!({"a": 7}))),
            _ => None,
        }
    }

    #[test]
    fn test_render_template() {
        assert_eq!(render_template("hello {name}, a={foo.a}", lookup), "hello Ada, a=7");
    }

    #[test]
    fn test_render_unresolved() {
        assert_eq!(render_template("{missing} / {foo.b}", lookup), "??? / ???");
    }

    #[test]
    fn test_render_escapes_and_unclosed() {
        assert_eq!(render_template("{{literal}} {name}", lookup), "{literal} Ada");
        assert_eq!(render_template("open {name", lookup), "open {name");
    }
}
