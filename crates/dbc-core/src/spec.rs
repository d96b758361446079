//! Contract specifications - the `pre` / `post` / `invariant` lists
//!
//! A [`ContractSpec`] is plain structured data. It can be built explicitly,
//! deserialized from JSON, or extracted from a block of documentation text
//! with [`ContractSpec::parse`].
//!
//! # Block grammar
//!
//! ```text
//! header  := INDENT ("pre" | "post" | "invariant") ":" [" #" comment] EOL
//! item    := INDENT' "-" WS expression [" #" comment] EOL     INDENT' > INDENT
//! comment := INDENT' "#" text EOL
//! ```
//!
//! Lines outside a section are prose and ignored. Comment lines inside a
//! section are skipped at any indentation. A section ends at the first
//! non-blank, non-comment line indented no deeper than its header. Items may
//! be quoted (`- "x > 0"`). Malformed sections are errors, never skipped.

use std::collections::BTreeSet;

use crate::parser::parse_expression;
use crate::{Error, Result};

/// Which list of a contract an expression belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Pre,
    Post,
    Invariant,
    /// Class-level invariant that must hold on method entry and exit
    ClassInvariant,
}

impl Section {
    /// Header keyword introducing this section in a contract block
    pub fn header(self) -> &'static str {
        match self {
            Section::Pre => "pre",
            Section::Post => "post",
            Section::Invariant => "invariant",
            Section::ClassInvariant => "class invariant",
        }
    }

    fn from_header(keyword: &str) -> Option<Self> {
        match keyword {
            "pre" => Some(Section::Pre),
            "post" => Some(Section::Post),
            "invariant" => Some(Section::Invariant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Section::Pre => write!(f, "precondition"),
            Section::Post => write!(f, "postcondition"),
            Section::Invariant => write!(f, "invariant"),
            Section::ClassInvariant => write!(f, "class invariant"),
        }
    }
}

/// The three ordered expression lists of one callable's contract
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContractSpec {
    #[serde(default)]
    pub pre: Vec<String>,
    #[serde(default)]
    pub post: Vec<String>,
    #[serde(default, rename = "invariant")]
    pub invariants: Vec<String>,
    /// Optional narrative template rendered into violation reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ContractSpec {
    pub fn builder() -> ContractSpecBuilder {
        ContractSpecBuilder::default()
    }

    /// Deserialize a spec from JSON, e.g. `{"pre": ["x > 0"], "post": ["RETURN > x"]}`
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Parse {
            line: e.line(),
            message: format!("Invalid contract JSON: {}", e),
        })
    }

    /// True when no section holds any expression
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty() && self.invariants.is_empty()
    }

    pub fn section(&self, section: Section) -> &[String] {
        match section {
            Section::Pre => &self.pre,
            Section::Post => &self.post,
            Section::Invariant => &self.invariants,
            Section::ClassInvariant => &[],
        }
    }

    /// Append an expression to one of the block sections.
    ///
    /// Class invariants belong to a class contract, never to a callable's spec.
    fn push(&mut self, section: Section, expression: String, line: usize) -> Result<()> {
        let list = match section {
            Section::Pre => &mut self.pre,
            Section::Post => &mut self.post,
            Section::Invariant => &mut self.invariants,
            Section::ClassInvariant => {
                return Err(Error::Parse {
                    line,
                    message: format!(
                        "'{}' expressions cannot be listed in a callable's contract",
                        section.header()
                    ),
                })
            }
        };
        list.push(expression);
        Ok(())
    }

    /// Extract a contract from a block of text (typically documentation).
    ///
    /// Every item is syntax-checked as it is read, so a bad expression
    /// reports the line it came from.
    ///
    /// # Errors
    /// `Error::Parse` with the 1-based line number for: a non-item line
    /// inside a section, an empty item, inconsistent item indentation, a
    /// header with an inline value, a repeated header, or an expression that
    /// does not parse.
    pub fn parse(text: &str) -> Result<Self> {
        let mut spec = ContractSpec::default();
        let mut seen = BTreeSet::new();
        let mut open: Option<OpenSection> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end();
            let content = line.trim_start();
            if content.is_empty() {
                continue;
            }
            if open.is_some() && content.starts_with('#') {
                continue;
            }
            let indent = line.chars().count() - content.chars().count();

            if let Some(section) = open.as_mut() {
                if indent > section.header_indent {
                    let expression = section.accept_item(content, indent, line_no)?;
                    parse_expression(&expression).map_err(|e| e.at_line(line_no, &expression))?;
                    spec.push(section.section, expression, line_no)?;
                    continue;
                }
                open = None;
            }

            if let Some(section) = parse_header(content, line_no)? {
                if !seen.insert(section) {
                    return Err(Error::Parse {
                        line: line_no,
                        message: format!("Duplicate '{}:' section", section.header()),
                    });
                }
                open = Some(OpenSection {
                    section,
                    header_indent: indent,
                    item_indent: None,
                });
            }
        }

        Ok(spec)
    }
}

// ── Block parsing helpers ─────────────────────────────────

struct OpenSection {
    section: Section,
    header_indent: usize,
    item_indent: Option<usize>,
}

impl OpenSection {
    fn accept_item(&mut self, content: &str, indent: usize, line: usize) -> Result<String> {
        let Some(rest) = content.strip_prefix('-') else {
            return Err(Error::Parse {
                line,
                message: format!(
                    "Expected '- <expression>' under '{}:', found '{}'",
                    self.section.header(),
                    content
                ),
            });
        };

        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Err(Error::Parse {
                line,
                message: format!("Expected a space after '-' in '{}'", content),
            });
        }

        match self.item_indent {
            None => self.item_indent = Some(indent),
            Some(expected) if expected != indent => {
                return Err(Error::Parse {
                    line,
                    message: format!(
                        "Inconsistent indentation in '{}:' list: expected {} columns, found {}",
                        self.section.header(),
                        expected,
                        indent
                    ),
                });
            }
            Some(_) => {}
        }

        let expression = unquote(strip_comment(rest).trim());
        if expression.trim().is_empty() {
            return Err(Error::Parse {
                line,
                message: format!("Empty item in '{}:' list", self.section.header()),
            });
        }
        Ok(expression)
    }
}

/// Recognize `pre:`, `post:` or `invariant:` as the whole line content.
fn parse_header(content: &str, line: usize) -> Result<Option<Section>> {
    let Some((keyword, rest)) = content.split_once(':') else {
        return Ok(None);
    };
    let Some(section) = Section::from_header(keyword) else {
        return Ok(None);
    };
    if !strip_comment(rest).trim().is_empty() {
        return Err(Error::Parse {
            line,
            message: format!(
                "Inline values are not supported after '{}:'; list one '- <expression>' per line",
                keyword
            ),
        });
    }
    Ok(Some(section))
}

/// Drop a trailing `# comment` that sits outside any quoted string.
fn strip_comment(text: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut previous = ' ';
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q && previous != '\\' => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && previous.is_whitespace() => return &text[..i],
            None => {}
        }
        previous = c;
    }
    text
}

/// Remove YAML scalar quotes when the whole item is one quoted string.
fn unquote(item: &str) -> String {
    let mut chars = item.chars();
    let Some(quote @ ('"' | '\'')) = chars.next() else {
        return item.to_string();
    };

    let mut value = String::new();
    let mut rest = chars.peekable();
    while let Some(c) = rest.next() {
        match c {
            '\\' if quote == '"' => match rest.next() {
                Some(escaped) => value.push(escaped),
                None => return item.to_string(),
            },
            c if c == quote => {
                if quote == '\'' && rest.peek() == Some(&'\'') {
                    rest.next();
                    value.push('\'');
                    continue;
                }
                // Closing quote must end the item, else it was part of the expression
                return if rest.next().is_none() {
                    value
                } else {
                    item.to_string()
                };
            }
            c => value.push(c),
        }
    }
    item.to_string()
}

// ── Builder ───────────────────────────────────────────────

/// Explicit construction of a [`ContractSpec`]
#[derive(Debug, Clone, Default)]
pub struct ContractSpecBuilder {
    spec: ContractSpec,
}

impl ContractSpecBuilder {
    pub fn pre(mut self, expression: impl Into<String>) -> Self {
        self.spec.pre.push(expression.into());
        self
    }

    pub fn post(mut self, expression: impl Into<String>) -> Self {
        self.spec.post.push(expression.into());
        self
    }

    pub fn invariant(mut self, expression: impl Into<String>) -> Self {
        self.spec.invariants.push(expression.into());
        self
    }

    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.spec.message = Some(template.into());
        self
    }

    pub fn build(self) -> ContractSpec {
        self.spec
    }
}
