//! Expression tokenizer - converts predicate text into a token stream
//!
//! Handles: keywords, identifiers, string literals (single or double quoted),
//! integer/float literals, arithmetic and comparison operators, brackets.
//!
//! Guarantees:
//! - Deterministic: same input always produces same token stream
//! - Every error names the line:column where it occurred

/// Token types for the expression language
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And,
    Or,
    Not,
    In,
    Is,
    True,
    False,
    None,

    // Literals
    StringLiteral(String),
    IntegerLiteral(i64),
    FloatLiteral(f64),

    // Arithmetic
    Plus,        // +
    Minus,       // -
    Star,        // *
    DoubleStar,  // **
    Slash,       // /
    DoubleSlash, // //
    Percent,     // %

    // Comparison
    EqEq,      // ==
    NotEq,     // !=
    Less,      // <
    LessEq,    // <=
    Greater,   // >
    GreaterEq, // >=

    // Symbols
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Dot,      // .

    // Other
    Identifier(String),
    Eof,
}

/// Position in source text for error reporting
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token with source position
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenizer for expression source text
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Tokenizer {
    /// Create a new tokenizer for the given input text
    pub fn new(text: &str) -> Self {
        Tokenizer {
            input: text.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire input into a stream of spanned tokens
    pub fn tokenize(&mut self) -> crate::Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_at_end() {
                tokens.push(SpannedToken {
                    token: Token::Eof,
                    span: self.current_span(),
                });
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        Ok(tokens)
    }

    // ── Character helpers ──────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    fn error(span: &Span, message: String) -> crate::Error {
        crate::Error::Parse {
            line: span.line,
            message: format!("{} at column {}", message, span.column),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    // ── Main dispatch ──────────────────────────────────────

    fn next_token(&mut self) -> crate::Result<SpannedToken> {
        let span = self.current_span();
        let Some(ch) = self.peek() else {
            return Ok(SpannedToken { token: Token::Eof, span });
        };

        let token = match ch {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            ',' => self.single(Token::Comma),
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '%' => self.single(Token::Percent),
            '*' => self.one_or_two('*', Token::Star, Token::DoubleStar),
            '/' => self.one_or_two('/', Token::Slash, Token::DoubleSlash),
            '<' => self.one_or_two('=', Token::Less, Token::LessEq),
            '>' => self.one_or_two('=', Token::Greater, Token::GreaterEq),
            '=' if self.peek_ahead(1) == Some('=') => self.one_or_two('=', Token::EqEq, Token::EqEq),
            '!' if self.peek_ahead(1) == Some('=') => self.one_or_two('=', Token::NotEq, Token::NotEq),
            '.' if !self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) => self.single(Token::Dot),
            '"' | '\'' => return self.read_string(span, ch),
            c if c.is_ascii_digit() || c == '.' => return self.read_number(span),
            c if c.is_ascii_alphabetic() || c == '_' => return Ok(self.read_identifier_or_keyword(span)),
            '=' => {
                return Err(Self::error(&span, "Unexpected '=' (use '==' for comparison)".into()));
            }
            _ => {
                return Err(Self::error(&span, format!("Unexpected character '{}'", ch)));
            }
        };

        Ok(SpannedToken { token, span })
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn one_or_two(&mut self, second: char, one: Token, two: Token) -> Token {
        self.advance();
        if self.peek() == Some(second) {
            self.advance();
            two
        } else {
            one
        }
    }

    // ── String literals ────────────────────────────────────

    fn read_string(&mut self, span: Span, quote: char) -> crate::Result<SpannedToken> {
        self.advance(); // consume opening quote
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(Self::error(&span, "Unterminated string".into()));
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    Some(c) => {
                        return Err(Self::error(
                            &self.current_span(),
                            format!("Invalid escape sequence '\\{}'", c),
                        ));
                    }
                    None => {
                        return Err(Self::error(&self.current_span(), "Unterminated escape sequence".into()));
                    }
                },
                Some(c) => value.push(c),
            }
        }

        Ok(SpannedToken {
            token: Token::StringLiteral(value),
            span,
        })
    }

    // ── Numbers ────────────────────────────────────────────

    fn read_number(&mut self, span: Span) -> crate::Result<SpannedToken> {
        let start = self.position;
        let mut is_float = false;

        self.consume_digits();

        // Fraction only when a digit follows, so `x[0].name` style access stays intact
        if self.peek() == Some('.') && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            self.consume_digits();
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = usize::from(matches!(self.peek_ahead(1), Some('+') | Some('-')));
            if self.peek_ahead(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..=sign {
                    self.advance();
                }
                self.consume_digits();
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        let digits = text.replace('_', "");

        if is_float {
            let val: f64 = digits
                .parse()
                .map_err(|_| Self::error(&span, format!("Invalid float '{}'", text)))?;
            Ok(SpannedToken {
                token: Token::FloatLiteral(val),
                span,
            })
        } else {
            let val: i64 = digits
                .parse()
                .map_err(|_| Self::error(&span, format!("Invalid integer '{}'", text)))?;
            Ok(SpannedToken {
                token: Token::IntegerLiteral(val),
                span,
            })
        }
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    // ── Identifiers & Keywords ─────────────────────────────

    fn read_identifier_or_keyword(&mut self, span: Span) -> SpannedToken {
        let start = self.position;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();

        let token = match text.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "is" => Token::Is,
            "True" | "true" => Token::True,
            "False" | "false" => Token::False,
            "None" | "null" => Token::None,
            _ => Token::Identifier(text),
        };

        SpannedToken { token, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> Vec<Token> {
        Tokenizer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|st| st.token)
            .collect()
    }

    fn tokenize_err(input: &str) -> String {
        Tokenizer::new(input).tokenize().unwrap_err().to_string()
    }

    // ── Keywords ───────────────────────────────────────

    #[test]
    fn test_tokenize_keywords() {
        let tokens = tokenize("and or not in is");
        assert_eq!(
            tokens,
            vec![Token::And, Token::Or, Token::Not, Token::In, Token::Is, Token::Eof]
        );
    }

    #[test]
    fn test_tokenize_constant_spellings() {
        let tokens = tokenize("True true False false None null");
        assert_eq!(
            tokens,
            vec![
                Token::True,
                Token::True,
                Token::False,
                Token::False,
                Token::None,
                Token::None,
                Token::Eof,
            ]
        );
    }

    // ── String literals ────────────────────────────────

    #[test]
    fn test_tokenize_both_quote_styles() {
        let tokens = tokenize(r#"'GOOD' "BAD""#);
        assert_eq!(
            tokens,
            vec![
                Token::StringLiteral("GOOD".into()),
                Token::StringLiteral("BAD".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_string_escape_sequences() {
        let tokens = tokenize(r#""line\none\ttab\\slash\"quote\'""#);
        assert_eq!(
            tokens,
            vec![
                Token::StringLiteral("line\none\ttab\\slash\"quote'".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_quote_of_other_kind_is_literal() {
        let tokens = tokenize(r#""it's""#);
        assert_eq!(tokens, vec![Token::StringLiteral("it's".into()), Token::Eof]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize_err("'hello");
        assert!(err.contains("Unterminated string"));
    }

    // ── Numbers ────────────────────────────────────────

    #[test]
    fn test_tokenize_integer() {
        let tokens = tokenize("42 0 1_000");
        assert_eq!(
            tokens,
            vec![
                Token::IntegerLiteral(42),
                Token::IntegerLiteral(0),
                Token::IntegerLiteral(1000),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_float_forms() {
        let tokens = tokenize("1.000000001 .5 2e3 1.5E-2");
        assert_eq!(
            tokens,
            vec![
                Token::FloatLiteral(1.000000001),
                Token::FloatLiteral(0.5),
                Token::FloatLiteral(2000.0),
                Token::FloatLiteral(0.015),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_integer_overflow_is_error() {
        let err = tokenize_err("99999999999999999999");
        assert!(err.contains("Invalid integer"));
    }

    // ── Operators ──────────────────────────────────────

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("+ - * ** / // % == != < <= > >=");
        assert_eq!(
            tokens,
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::DoubleStar,
                Token::Slash,
                Token::DoubleSlash,
                Token::Percent,
                Token::EqEq,
                Token::NotEq,
                Token::Less,
                Token::LessEq,
                Token::Greater,
                Token::GreaterEq,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_access_chain() {
        let tokens = tokenize("foo.a[0]");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("foo".into()),
                Token::Dot,
                Token::Identifier("a".into()),
                Token::LBracket,
                Token::IntegerLiteral(0),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_single_equals_is_rejected() {
        let err = tokenize_err("x = 1");
        assert!(err.contains("use '=='"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize_err("x @ y");
        assert!(err.contains("Unexpected character '@'"));
        assert!(err.contains("column 3"));
    }

    // ── Span tracking ──────────────────────────────────

    #[test]
    fn test_span_tracking() {
        let tokens = Tokenizer::new("len(y) > 3").tokenize().unwrap();
        assert_eq!(tokens[0].span, Span { line: 1, column: 1, offset: 0 });
        assert_eq!(tokens[1].span, Span { line: 1, column: 4, offset: 3 });
        assert_eq!(tokens[4].span, Span { line: 1, column: 8, offset: 7 });
        assert_eq!(tokens[5].token, Token::IntegerLiteral(3));
    }

    // ── Edge cases ─────────────────────────────────────

    #[test]
    fn test_empty_input() {
        assert_eq!(tokenize(""), vec![Token::Eof]);
        assert_eq!(tokenize("   \t "), vec![Token::Eof]);
    }

    #[test]
    fn test_tokenize_determinism_100_iterations() {
        let input = "(a ** 2 + b ** 2) < 2500 and len(y) > 3";
        let first = Tokenizer::new(input).tokenize().unwrap();

        for i in 0..100 {
            let result = Tokenizer::new(input).tokenize().unwrap();
            assert_eq!(first, result, "Determinism failure at iteration {}", i);
        }
    }
}
