//! Expression evaluation against a call-time environment
//!
//! An [`Environment`] layers argument bindings (and `RETURN`) over an
//! [`Ambient`] table of named values. [`ExpressionEvaluator`] walks a compiled
//! [`Expr`] against it. Evaluation is pure: the same expression and the same
//! environment always give the same value, and failures are [`EvalError`]s,
//! never `false`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::EvalError;
use crate::parser::ast::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp, ISINSTANCE};
use crate::value::{ToValue, Value};

/// Name bound to the callee's return value in postconditions
pub const RETURN: &str = "RETURN";

/// Functions every expression can call
pub const BUILTINS: &[&str] = &[
    "len", "abs", "min", "max", "sum", "all", "any", "isinstance", "int", "float", "str", "bool",
];

// ── Ambient values ────────────────────────────────────────

type Provider = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Clone)]
enum AmbientEntry {
    Constant(Value),
    Provider(Provider),
}

/// Named values visible to expressions without being passed as arguments.
///
/// Providers are read every time the name is evaluated, so an invariant over
/// shared state observes the state as it is at that moment.
#[derive(Clone, Default)]
pub struct Ambient {
    entries: BTreeMap<String, AmbientEntry>,
}

impl Ambient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl ToValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_provider<F, T>(mut self, name: impl Into<String>, provider: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: ToValue,
    {
        self.insert_provider(name, provider);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToValue) {
        self.entries
            .insert(name.into(), AmbientEntry::Constant(value.to_value()));
    }

    pub fn insert_provider<F, T>(&mut self, name: impl Into<String>, provider: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: ToValue,
    {
        let provider: Provider = Arc::new(move || provider().to_value());
        self.entries
            .insert(name.into(), AmbientEntry::Provider(provider));
    }

    /// Current value of `name`, calling its provider if it has one
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.get(name).map(|entry| match entry {
            AmbientEntry::Constant(value) => value.clone(),
            AmbientEntry::Provider(provider) => provider(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Ambient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, entry) in &self.entries {
            match entry {
                AmbientEntry::Constant(value) => map.entry(name, value),
                AmbientEntry::Provider(_) => map.entry(name, &"<provider>"),
            };
        }
        map.finish()
    }
}

// ── Named predicates ──────────────────────────────────────

/// Native function callable from expressions by name
pub type NativeFn = Arc<dyn Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync>;

/// Registry of named predicates.
///
/// Built-ins always win: registering `len` does not shadow the built-in.
#[derive(Clone, Default)]
pub struct Functions {
    registered: BTreeMap<String, NativeFn>,
}

impl Functions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function over the evaluated argument list
    pub fn register<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.insert(name, function);
        self
    }

    /// Register a one-argument boolean predicate, e.g. `even(x)`
    pub fn predicate<F>(self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        self.register(name, move |args| match args {
            [value] => Ok(Value::Boolean(predicate(value))),
            _ => Err(format!("{}() takes exactly 1 argument ({} given)", label, args.len())),
        })
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let name = name.into();
        if Self::is_builtin(&name) {
            tracing::warn!(function = %name, "named predicate is shadowed by a built-in");
        }
        self.registered.insert(name, Arc::new(function));
    }

    pub fn is_builtin(name: &str) -> bool {
        BUILTINS.contains(&name)
    }

    /// True if `name` resolves to a built-in or a registered predicate
    pub fn contains(&self, name: &str) -> bool {
        Self::is_builtin(name) || self.registered.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<&NativeFn> {
        self.registered.get(name)
    }
}

impl std::fmt::Debug for Functions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.registered.keys()).finish()
    }
}

// ── Environment ───────────────────────────────────────────

/// Per-call name → value mapping.
///
/// Bindings (arguments, `self`, `RETURN`) take precedence over ambient names.
#[derive(Debug, Clone)]
pub struct Environment<'a> {
    bindings: BTreeMap<String, Value>,
    ambient: &'a Ambient,
}

impl<'a> Environment<'a> {
    pub fn new(ambient: &'a Ambient) -> Self {
        Self {
            bindings: BTreeMap::new(),
            ambient,
        }
    }

    pub fn with_bindings(
        ambient: &'a Ambient,
        bindings: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
            ambient,
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name) {
            Some(value) => Some(value.clone()),
            None => self.ambient.get(name),
        }
    }

    pub fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    /// All bindings plus the ambient values `expr` refers to, for reporting
    pub fn snapshot(&self, expr: &Expr) -> BTreeMap<String, Value> {
        let mut values = self.bindings.clone();
        for name in expr.names() {
            if values.contains_key(&name) {
                continue;
            }
            if let Some(value) = self.ambient.get(&name) {
                values.insert(name, value);
            }
        }
        values
    }
}

// ── Evaluator ─────────────────────────────────────────────

/// Evaluates compiled expressions
#[derive(Debug, Clone, Copy)]
pub struct ExpressionEvaluator<'f> {
    functions: &'f Functions,
}

impl<'f> ExpressionEvaluator<'f> {
    pub fn new(functions: &'f Functions) -> Self {
        Self { functions }
    }

    /// Evaluate and reduce to truthiness
    pub fn check(&self, expr: &Expr, env: &Environment) -> Result<bool, EvalError> {
        self.evaluate(expr, env).map(|value| value.is_truthy())
    }

    pub fn evaluate(&self, expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => env
                .lookup(name)
                .ok_or_else(|| EvalError::UnresolvedName { name: name.clone() }),
            Expr::List(items) => items
                .iter()
                .map(|item| self.evaluate(item, env))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Unary { op, operand } => unary(*op, self.evaluate(operand, env)?),
            Expr::Binary { op, left, right } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.evaluate(left, env)?.is_truthy();
                let result = match op {
                    LogicalOp::And if !left => false,
                    LogicalOp::Or if left => true,
                    _ => self.evaluate(right, env)?.is_truthy(),
                };
                Ok(Value::Boolean(result))
            }
            Expr::Compare { first, rest } => {
                let mut left = self.evaluate(first, env)?;
                for (op, operand) in rest {
                    let right = self.evaluate(operand, env)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Boolean(false));
                    }
                    left = right;
                }
                Ok(Value::Boolean(true))
            }
            Expr::Attribute { object, name } => match self.evaluate(object, env)? {
                Value::Object(mut fields) => fields
                    .remove(name)
                    .ok_or_else(|| EvalError::MissingAttribute { name: name.clone() }),
                other => Err(EvalError::TypeMismatch {
                    expected: format!("Object with field '{}'", name),
                    found: other.type_name().to_string(),
                }),
            },
            Expr::Index { object, index } => {
                let object = self.evaluate(object, env)?;
                let index = self.evaluate(index, env)?;
                subscript(object, &index)
            }
            Expr::Call { function, args } if function == ISINSTANCE => {
                self.isinstance(args, env)
            }
            Expr::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg, env))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(function, &values)
            }
        }
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value, EvalError> {
        match function {
            "len" => len(one(function, args)?),
            "abs" => match one(function, args)? {
                Value::Integer(i) => i
                    .checked_abs()
                    .map(Value::Integer)
                    .ok_or(EvalError::Overflow { op: "abs" }),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(mismatch("number", other)),
            },
            "min" => extreme(function, args, Ordering::Less),
            "max" => extreme(function, args, Ordering::Greater),
            "sum" => sum(args),
            "all" => Ok(Value::Boolean(
                sequence(one(function, args)?)?.iter().all(Value::is_truthy),
            )),
            "any" => Ok(Value::Boolean(
                sequence(one(function, args)?)?.iter().any(Value::is_truthy),
            )),
            "int" => to_int(one(function, args)?),
            "float" => to_float(one(function, args)?),
            "str" => Ok(Value::String(text(one(function, args)?))),
            "bool" => Ok(Value::Boolean(one(function, args)?.is_truthy())),
            _ => match self.functions.get(function) {
                Some(native) => native(args).map_err(|message| EvalError::Predicate {
                    name: function.to_string(),
                    message,
                }),
                None => Err(EvalError::UnknownFunction {
                    name: function.to_string(),
                }),
            },
        }
    }

    /// `isinstance(value, int)` / `isinstance(value, (int, float))`;
    /// the second argument names types and is never looked up.
    fn isinstance(&self, args: &[Expr], env: &Environment) -> Result<Value, EvalError> {
        let [value, types] = args else {
            return Err(EvalError::Arity {
                function: ISINSTANCE.to_string(),
                expected: "2",
                found: args.len(),
            });
        };
        let value = self.evaluate(value, env)?;
        let names: Vec<&Expr> = match types {
            Expr::List(items) => items.iter().collect(),
            single => vec![single],
        };
        for name in names {
            if type_matches(&value, name)? {
                return Ok(Value::Boolean(true));
            }
        }
        Ok(Value::Boolean(false))
    }
}

// ── Operators ─────────────────────────────────────────────

fn mismatch(expected: &str, found: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}

fn unsupported(op: &'static str, left: &Value, right: &Value) -> EvalError {
    EvalError::UnsupportedOperands {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
        (UnaryOp::Neg, Value::Integer(i)) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or(EvalError::Overflow { op: "-" }),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, value @ (Value::Integer(_) | Value::Float(_))) => Ok(value),
        (_, other) => Err(mismatch("number", &other)),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let symbol = op.symbol();
    match (op, left, right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (BinaryOp::Add, Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        (_, Value::Integer(a), Value::Integer(b)) => integer_op(op, *a, *b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => float_op(op, a, b),
            _ => Err(unsupported(symbol, left, right)),
        },
    }
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let overflow = EvalError::Overflow { op: op.symbol() };
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => return float_op(op, a as f64, b as f64),
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b).map(|q| {
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_rem(b)
                .map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinaryOp::Pow if b < 0 => return Ok(Value::Float((a as f64).powf(b as f64))),
        BinaryOp::Pow => u32::try_from(b).ok().and_then(|e| a.checked_pow(e)),
    };
    result.map(Value::Integer).ok_or(overflow)
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(EvalError::DivisionByZero)
        }
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => {
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => a.powf(b),
    };
    Ok(Value::Float(result))
}

/// Ordering between comparable values. `Ok(None)` means unordered (NaN).
fn order(op: &'static str, left: &Value, right: &Value) -> Result<Option<Ordering>, EvalError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Some(a.cmp(b))),
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b) {
                match order(op, x, y)? {
                    Some(Ordering::Equal) => continue,
                    other => return Ok(other),
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(unsupported(op, left, right)),
        },
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Array(items), item) => Ok(items.iter().any(|x| x.loose_eq(item))),
        (Value::Object(fields), Value::String(key)) => Ok(fields.contains_key(key)),
        _ => Err(unsupported("in", item, container)),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    let symbol = op.symbol();
    Ok(match op {
        CompareOp::Eq => left.loose_eq(right),
        CompareOp::NotEq => !left.loose_eq(right),
        CompareOp::Lt => order(symbol, left, right)? == Some(Ordering::Less),
        CompareOp::LtEq => matches!(
            order(symbol, left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => order(symbol, left, right)? == Some(Ordering::Greater),
        CompareOp::GtEq => matches!(
            order(symbol, left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::In => contains(right, left)?,
        CompareOp::NotIn => !contains(right, left)?,
        CompareOp::Is => left.same_as(right),
        CompareOp::IsNot => !left.same_as(right),
    })
}

fn subscript(object: Value, index: &Value) -> Result<Value, EvalError> {
    match (object, index) {
        (Value::Array(mut items), Value::Integer(i)) => {
            let position = resolve_index(*i, items.len())?;
            Ok(items.swap_remove(position))
        }
        (Value::String(s), Value::Integer(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let position = resolve_index(*i, chars.len())?;
            Ok(Value::String(chars[position].to_string()))
        }
        (Value::Object(mut fields), Value::String(key)) => fields
            .remove(key)
            .ok_or_else(|| EvalError::MissingAttribute { name: key.clone() }),
        (object, index) => Err(unsupported("[]", &object, index)),
    }
}

fn resolve_index(index: i64, len: usize) -> Result<usize, EvalError> {
    let out_of_range = EvalError::IndexOutOfRange { index, len };
    let position = if index < 0 {
        i64::try_from(len)
            .ok()
            .and_then(|n| n.checked_add(index))
            .ok_or_else(|| out_of_range.clone())?
    } else {
        index
    };
    match usize::try_from(position) {
        Ok(p) if p < len => Ok(p),
        _ => Err(out_of_range),
    }
}

// ── Built-ins ─────────────────────────────────────────────

fn one<'v>(function: &str, args: &'v [Value]) -> Result<&'v Value, EvalError> {
    match args {
        [value] => Ok(value),
        _ => Err(EvalError::Arity {
            function: function.to_string(),
            expected: "1",
            found: args.len(),
        }),
    }
}

fn sequence(value: &Value) -> Result<&[Value], EvalError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(mismatch("Array", other)),
    }
}

fn len(value: &Value) -> Result<Value, EvalError> {
    let n = match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(fields) => fields.len(),
        other => return Err(mismatch("String, Array or Object", other)),
    };
    i64::try_from(n)
        .map(Value::Integer)
        .map_err(|_| EvalError::Overflow { op: "len" })
}

/// `min`/`max` over one sequence argument or over several arguments
fn extreme(function: &str, args: &[Value], wanted: Ordering) -> Result<Value, EvalError> {
    let candidates = match args {
        [] => {
            return Err(EvalError::Arity {
                function: function.to_string(),
                expected: "at least 1",
                found: 0,
            })
        }
        [single] => sequence(single)?,
        many => many,
    };
    let Some((first, rest)) = candidates.split_first() else {
        return Err(EvalError::TypeMismatch {
            expected: "non-empty Array".to_string(),
            found: "empty Array".to_string(),
        });
    };
    let mut best = first;
    for candidate in rest {
        if order("comparison", candidate, best)? == Some(wanted) {
            best = candidate;
        }
    }
    Ok(best.clone())
}

fn sum(args: &[Value]) -> Result<Value, EvalError> {
    let (items, start) = match args {
        [items] => (sequence(items)?, Value::Integer(0)),
        [items, start] => (sequence(items)?, start.clone()),
        _ => {
            return Err(EvalError::Arity {
                function: "sum".to_string(),
                expected: "1 or 2",
                found: args.len(),
            })
        }
    };
    items
        .iter()
        .try_fold(start, |total, item| binary(BinaryOp::Add, &total, item))
}

fn to_int(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        Value::Float(f) if f.is_finite() && f.trunc().abs() < 9.223_372_036_854_775_807e18 => {
            Ok(Value::Integer(f.trunc() as i64))
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| mismatch("integer literal", value)),
        other => Err(mismatch("number or numeric String", other)),
    }
}

fn to_float(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Boolean(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| mismatch("float literal", value)),
        other => other
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| mismatch("number or numeric String", other)),
    }
}

/// Text form used by `str()`: strings unquoted, booleans capitalized
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Boolean(true) => "True".to_string(),
        Value::Boolean(false) => "False".to_string(),
        other => other.to_string(),
    }
}

fn type_matches(value: &Value, name: &Expr) -> Result<bool, EvalError> {
    let type_name = match name {
        Expr::Name(type_name) => type_name.as_str(),
        Expr::Literal(Value::Null) => "None",
        other => {
            return Err(EvalError::UnknownType {
                name: format!("{:?}", other),
            })
        }
    };
    Ok(match type_name {
        "int" => matches!(value, Value::Integer(_)),
        "float" => matches!(value, Value::Float(_)),
        "number" => matches!(value, Value::Integer(_) | Value::Float(_)),
        "str" => matches!(value, Value::String(_)),
        "bool" => matches!(value, Value::Boolean(_)),
        "list" | "tuple" => matches!(value, Value::Array(_)),
        "dict" => matches!(value, Value::Object(_)),
        "None" => matches!(value, Value::Null),
        unknown => {
            return Err(EvalError::UnknownType {
                name: unknown.to_string(),
            })
        }
    })
}
