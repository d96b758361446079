//! Expression AST - compiled form of a contract expression
//!
//! Built once by the parser and never mutated. Evaluation walks this tree;
//! the verifier inspects it for the names and functions it references.

use std::collections::BTreeSet;

use crate::value::Value;

/// A compiled contract expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    /// List or tuple display: `[a, b]`, `(a, b)`
    List(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Possibly chained comparison: `a < b <= c`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Attribute {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// Only named functions can be called
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

/// The type-name argument of `isinstance(value, types)` is syntax, not a lookup.
pub(crate) const ISINSTANCE: &str = "isinstance";

impl Expr {
    /// Free variable names referenced by this expression, sorted.
    pub fn names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names
    }

    /// Names of all functions this expression calls, sorted.
    pub fn functions(&self) -> BTreeSet<String> {
        let mut functions = BTreeSet::new();
        self.collect_functions(&mut functions);
        functions
    }

    fn collect_names(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Name(name) => {
                out.insert(name.clone());
            }
            Expr::List(items) => items.iter().for_each(|e| e.collect_names(out)),
            Expr::Unary { operand, .. } => operand.collect_names(out),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.collect_names(out);
                right.collect_names(out);
            }
            Expr::Compare { first, rest } => {
                first.collect_names(out);
                rest.iter().for_each(|(_, e)| e.collect_names(out));
            }
            Expr::Attribute { object, .. } => object.collect_names(out),
            Expr::Index { object, index } => {
                object.collect_names(out);
                index.collect_names(out);
            }
            Expr::Call { function, args } if function == ISINSTANCE => {
                if let Some(value) = args.first() {
                    value.collect_names(out);
                }
            }
            Expr::Call { args, .. } => args.iter().for_each(|e| e.collect_names(out)),
        }
    }

    fn collect_functions(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) | Expr::Name(_) => {}
            Expr::List(items) => items.iter().for_each(|e| e.collect_functions(out)),
            Expr::Unary { operand, .. } => operand.collect_functions(out),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.collect_functions(out);
                right.collect_functions(out);
            }
            Expr::Compare { first, rest } => {
                first.collect_functions(out);
                rest.iter().for_each(|(_, e)| e.collect_functions(out));
            }
            Expr::Attribute { object, .. } => object.collect_functions(out),
            Expr::Index { object, index } => {
                object.collect_functions(out);
                index.collect_functions(out);
            }
            Expr::Call { function, args } => {
                out.insert(function.clone());
                if function == ISINSTANCE {
                    if let Some(value) = args.first() {
                        value.collect_functions(out);
                    }
                } else {
                    args.iter().for_each(|e| e.collect_functions(out));
                }
            }
        }
    }
}
