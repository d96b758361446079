//! Expression parser - tokenizer, AST types, and recursive descent parser
//!
//! Converts contract expression text into an [`Expr`] tree once, when the
//! contract is compiled. Nothing is ever evaluated as code.
//!
//! # Grammar
//!
//! ```text
//! expr       := or
//! or         := and ("or" and)*
//! and        := not ("and" not)*
//! not        := "not" not | comparison
//! comparison := sum (cmp_op sum)*
//! cmp_op     := == | != | < | <= | > | >= | in | not in | is | is not
//! sum        := product (("+" | "-") product)*
//! product    := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := ("-" | "+") unary | power
//! power      := postfix ("**" unary)?
//! postfix    := primary ("." IDENT | "[" expr "]" | "(" args ")")*
//! primary    := literal | IDENT | "(" expr ")" | "(" tuple ")" | "[" list "]"
//! ```

pub mod ast;
pub mod tokenizer;

use crate::value::Value;
use crate::{Error, Result};
use ast::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
use tokenizer::{Span, SpannedToken, Token, Tokenizer};

/// Deepest nesting of groups, displays, calls and prefix operators accepted
pub const MAX_DEPTH: usize = 64;

/// Parse expression text into an AST
///
/// # Errors
/// Returns `Error::Parse` naming the column of the offending token, including
/// for expressions nested deeper than [`MAX_DEPTH`].
///
/// # Example
/// ```
/// let expr = dbc_core::parser::parse_expression("RETURN == x + y").unwrap();
/// assert_eq!(expr.names().len(), 3);
/// ```
pub fn parse_expression(input: &str) -> Result<Expr> {
    let tokens = Tokenizer::new(input).tokenize()?;
    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
    };

    if parser.check(&Token::Eof) {
        return Err(Error::Parse {
            line: 1,
            message: "Empty expression".into(),
        });
    }

    let expr = parser.parse_or()?;

    if !parser.check(&Token::Eof) {
        return Err(parser.unexpected("end of expression"));
    }

    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    position: usize,
    depth: usize,
}

impl Parser {
    // ── Token helpers ──────────────────────────────────────

    fn current(&self) -> &SpannedToken {
        // The tokenizer always terminates the stream with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.position + 1).map(|t| &t.token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) -> Token {
        let token = self.current().token.clone();
        if token != Token::Eof {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let SpannedToken { token, span } = self.current();
        error_at(span, format!("Expected {}, found {}", expected, describe(token)))
    }

    /// Run one recursive step, failing once nesting passes [`MAX_DEPTH`]
    fn nested<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            return Err(error_at(
                &self.current().span,
                format!("Expression nested too deeply (limit {})", MAX_DEPTH),
            ));
        }
        self.depth += 1;
        let result = step(self);
        self.depth -= 1;
        result
    }

    // ── Boolean layers ─────────────────────────────────────

    fn parse_or(&mut self) -> Result<Expr> {
        self.nested(Self::parse_disjunction)
    }

    fn parse_disjunction(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    // ── Comparisons ────────────────────────────────────────

    fn parse_comparison(&mut self) -> Result<Expr> {
        let first = self.parse_sum()?;
        let mut rest = Vec::new();

        while let Some(op) = self.comparison_operator() {
            let operand = self.parse_sum()?;
            rest.push((op, operand));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn comparison_operator(&mut self) -> Option<CompareOp> {
        let op = match self.peek() {
            Token::EqEq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::Less => CompareOp::Lt,
            Token::LessEq => CompareOp::LtEq,
            Token::Greater => CompareOp::Gt,
            Token::GreaterEq => CompareOp::GtEq,
            Token::In => CompareOp::In,
            Token::Not if self.peek_next() == Some(&Token::In) => {
                self.advance();
                CompareOp::NotIn
            }
            Token::Is if self.peek_next() == Some(&Token::Not) => {
                self.advance();
                CompareOp::IsNot
            }
            Token::Is => CompareOp::Is,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    // ── Arithmetic ─────────────────────────────────────────

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_product()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            // Right associative, and binds tighter than a unary minus on its left
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    // ── Access & calls ─────────────────────────────────────

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let Token::Identifier(name) = self.peek().clone() else {
                        return Err(self.unexpected("attribute name after '.'"));
                    };
                    self.advance();
                    expr = Expr::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Token::LParen => {
                    let Expr::Name(function) = expr else {
                        return Err(error_at(
                            &self.current().span,
                            "Only named functions can be called".into(),
                        ));
                    };
                    self.advance();
                    let args = self.parse_sequence(&Token::RParen, "')'")?;
                    expr = Expr::Call { function, args };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Comma separated expressions up to `close`, trailing comma allowed
    fn parse_sequence(&mut self, close: &Token, what: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.parse_or()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(close, what)?;
        Ok(items)
    }

    // ── Primaries ──────────────────────────────────────────

    fn parse_primary(&mut self) -> Result<Expr> {
        let expr = match self.peek().clone() {
            Token::IntegerLiteral(i) => Expr::Literal(Value::Integer(i)),
            Token::FloatLiteral(f) => Expr::Literal(Value::Float(f)),
            Token::StringLiteral(s) => Expr::Literal(Value::String(s)),
            Token::True => Expr::Literal(Value::Boolean(true)),
            Token::False => Expr::Literal(Value::Boolean(false)),
            Token::None => Expr::Literal(Value::Null),
            Token::Identifier(name) => Expr::Name(name),
            Token::LParen => {
                self.advance();
                return self.parse_parenthesized();
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_sequence(&Token::RBracket, "']'")?;
                return Ok(Expr::List(items));
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_parenthesized(&mut self) -> Result<Expr> {
        if self.eat(&Token::RParen) {
            return Ok(Expr::List(Vec::new()));
        }

        let first = self.parse_or()?;
        if !self.eat(&Token::Comma) {
            self.expect(&Token::RParen, "')'")?;
            return Ok(first);
        }

        let mut items = vec![first];
        items.extend(self.parse_sequence(&Token::RParen, "')'")?);
        Ok(Expr::List(items))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn error_at(span: &Span, message: String) -> Error {
    Error::Parse {
        line: span.line,
        message: format!("{} at column {}", message, span.column),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Eof => "end of expression".into(),
        Token::Identifier(name) => format!("name '{}'", name),
        Token::StringLiteral(s) => format!("string {:?}", s),
        Token::IntegerLiteral(i) => format!("number {}", i),
        Token::FloatLiteral(f) => format!("number {}", f),
        other => format!("{:?}", other),
    }
}
