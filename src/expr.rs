//! Validation expressions (`vd` directive)
//!
//! Evaluated against the current field value, written `$`:
//!
//! ```text
//! $ > 0 && $ < 100
//! len($) >= 3 || $ == null
//! regexp('^[a-z]+$')
//! in($, 'asc', 'desc')
//! ```
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or      := and ('||' and)*
//! and     := cmp ('&&' cmp)*
//! cmp     := unary (('=='|'!='|'<'|'<='|'>'|'>=') unary)?
//! unary   := ('!'|'-') unary | primary
//! primary := number | 'string' | true | false | null | $ | call | '(' or ')'
//! call    := ident '(' (or (',' or)*)? ')'
//! ```
//!
//! Regex patterns must be string literals and are compiled once, with the
//! expression.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Number, Value};
use thiserror::Error;

/// Deepest nesting of parentheses, calls and unary operators.
pub const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unterminated string starting at position {position}")]
    UnterminatedString { position: usize },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("{name}() {expected}")]
    Arity { name: String, expected: &'static str },

    #[error("invalid regex '{pattern}': {details}")]
    InvalidRegex { pattern: String, details: String },

    #[error("expression nested deeper than {limit} levels at position {position}")]
    TooDeep { limit: usize, position: usize },
}

/// A compiled validation expression.
#[derive(Debug, Clone)]
pub struct Expr {
    source: String,
    root: Node,
}

impl Expr {
    pub fn compile(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.or()?;
        if let Some(token) = parser.peek() {
            return Err(ExprError::UnexpectedToken {
                found: token.kind.describe(),
                position: token.position,
            });
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `$` bound to `current`.
    pub fn eval(&self, current: &Value) -> Value {
        self.root.eval(current)
    }

    /// A value is valid only when the expression yields `true`.
    pub fn is_satisfied_by(&self, current: &Value) -> bool {
        self.eval(current) == Value::Bool(true)
    }
}

// ═══════════════════════════════════════════════════════════════
// Tokens
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Num(f64),
    Str(String),
    Ident(String),
    Dollar,
    LParen,
    RParen,
    Comma,
    Op(&'static str),
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Num(n) => format!("number {n}"),
            TokenKind::Str(s) => format!("string '{s}'"),
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Dollar => "'$'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Op(op) => format!("'{op}'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

const OPERATORS: [&str; 10] = ["==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "-"];

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let position = i;

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let kind = match b {
            b'$' => {
                i += 1;
                TokenKind::Dollar
            }
            b'(' => {
                i += 1;
                TokenKind::LParen
            }
            b')' => {
                i += 1;
                TokenKind::RParen
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b'\'' => {
                let (text, end) = read_string(source, i)?;
                i = end;
                TokenKind::Str(text)
            }
            b'0'..=b'9' | b'.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &source[start..i];
                let n = text.parse::<f64>().map_err(|_| ExprError::UnexpectedToken {
                    found: format!("number '{text}'"),
                    position,
                })?;
                TokenKind::Num(n)
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                TokenKind::Ident(source[start..i].to_string())
            }
            _ => {
                let rest = &source[i..];
                match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
                    Some(op) => {
                        i += op.len();
                        TokenKind::Op(*op)
                    }
                    None => {
                        let ch = rest.chars().next().unwrap_or('?');
                        return Err(ExprError::UnexpectedChar { ch, position });
                    }
                }
            }
        };

        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

/// Read a single-quoted string starting at `start`; returns text and end offset.
///
/// Only `\'` is an escape; other backslashes are kept so regex classes survive.
fn read_string(source: &str, start: usize) -> Result<(String, usize), ExprError> {
    let mut out = String::new();
    let mut chars = source[start + 1..].char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '\\' if matches!(chars.peek(), Some((_, '\''))) => {
                out.push('\'');
                chars.next();
            }
            '\'' => return Ok((out, start + 1 + offset + 1)),
            _ => out.push(ch),
        }
    }

    Err(ExprError::UnterminatedString { position: start })
}

// ═══════════════════════════════════════════════════════════════
// Parser
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Node {
    Lit(Value),
    Current,
    Not(Box<Node>),
    Neg(Box<Node>),
    Cmp(CmpOp, Box<Node>, Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
    Len(Box<Node>),
    Regexp(Regex, Box<Node>),
    In(Box<Node>, Vec<Node>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Op(found),
                ..
            }) if *found == op => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExprError> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                found: token.kind.describe(),
                position: token.position,
            })
        }
    }

    // Chains are flat so that long `a || b || c` runs do not deepen the tree.
    fn or(&mut self) -> Result<Node, ExprError> {
        let mut terms = vec![self.and()?];
        while self.eat_op("||") {
            terms.push(self.and()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Node::Or(terms),
        })
    }

    fn and(&mut self) -> Result<Node, ExprError> {
        let mut terms = vec![self.cmp()?];
        while self.eat_op("&&") {
            terms.push(self.cmp()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Node::And(terms),
        })
    }

    fn cmp(&mut self) -> Result<Node, ExprError> {
        let left = self.unary()?;
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Op("==")) => CmpOp::Eq,
            Some(TokenKind::Op("!=")) => CmpOp::Ne,
            Some(TokenKind::Op("<")) => CmpOp::Lt,
            Some(TokenKind::Op("<=")) => CmpOp::Le,
            Some(TokenKind::Op(">")) => CmpOp::Gt,
            Some(TokenKind::Op(">=")) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.unary()?;
        Ok(Node::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn unary(&mut self) -> Result<Node, ExprError> {
        if self.depth == MAX_DEPTH {
            return Err(ExprError::TooDeep {
                limit: MAX_DEPTH,
                position: self.peek().map_or(0, |t| t.position),
            });
        }
        self.depth += 1;
        let node = self.unary_inner();
        self.depth -= 1;
        node
    }

    fn unary_inner(&mut self) -> Result<Node, ExprError> {
        if self.eat_op("!") {
            return Ok(Node::Not(Box::new(self.unary()?)));
        }
        if self.eat_op("-") {
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node, ExprError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Num(n) => Ok(Node::Lit(number(n))),
            TokenKind::Str(s) => Ok(Node::Lit(Value::String(s))),
            TokenKind::Dollar => Ok(Node::Current),
            TokenKind::LParen => {
                let inner = self.or()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Node::Lit(Value::Bool(true))),
                "false" => Ok(Node::Lit(Value::Bool(false))),
                "null" => Ok(Node::Lit(Value::Null)),
                _ => self.call(name),
            },
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                position: token.position,
            }),
        }
    }

    fn call(&mut self, name: String) -> Result<Node, ExprError> {
        if !matches!(name.as_str(), "len" | "regexp" | "in") {
            return Err(ExprError::UnknownFunction { name });
        }
        self.expect(TokenKind::LParen)?;

        let mut args = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.or()?);
                let token = self.next()?;
                match token.kind {
                    TokenKind::Comma => continue,
                    TokenKind::RParen => break,
                    other => {
                        return Err(ExprError::UnexpectedToken {
                            found: other.describe(),
                            position: token.position,
                        })
                    }
                }
            }
        }

        match name.as_str() {
            "len" => {
                let [arg] = <[Node; 1]>::try_from(args).map_err(|_| ExprError::Arity {
                    name,
                    expected: "takes exactly one argument",
                })?;
                Ok(Node::Len(Box::new(arg)))
            }
            "regexp" => {
                let mut args = args.into_iter();
                let pattern = match args.next() {
                    Some(Node::Lit(Value::String(pattern))) => pattern,
                    _ => {
                        return Err(ExprError::Arity {
                            name,
                            expected: "expects a string literal pattern first",
                        })
                    }
                };
                let target = args.next().unwrap_or(Node::Current);
                if args.next().is_some() {
                    return Err(ExprError::Arity {
                        name,
                        expected: "takes a pattern and an optional value",
                    });
                }
                let regex = Regex::new(&pattern).map_err(|e| ExprError::InvalidRegex {
                    pattern: pattern.clone(),
                    details: e.to_string(),
                })?;
                Ok(Node::Regexp(regex, Box::new(target)))
            }
            _ => {
                let mut args = args.into_iter();
                let Some(needle) = args.next() else {
                    return Err(ExprError::Arity {
                        name,
                        expected: "needs a value and candidates",
                    });
                };
                Ok(Node::In(Box::new(needle), args.collect()))
            }
        }
    }
}

fn number(n: f64) -> Value {
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

// ═══════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════

impl Node {
    fn eval(&self, current: &Value) -> Value {
        match self {
            Node::Lit(value) => value.clone(),
            Node::Current => current.clone(),
            Node::Not(inner) => Value::Bool(!truthy(&inner.eval(current))),
            Node::Neg(inner) => match inner.eval(current).as_f64() {
                Some(n) => number(-n),
                None => Value::Null,
            },
            Node::Cmp(op, left, right) => {
                Value::Bool(compare(*op, &left.eval(current), &right.eval(current)))
            }
            Node::And(terms) => Value::Bool(terms.iter().all(|t| truthy(&t.eval(current)))),
            Node::Or(terms) => Value::Bool(terms.iter().any(|t| truthy(&t.eval(current)))),
            Node::Len(inner) => match inner.eval(current) {
                Value::String(s) => Value::from(s.chars().count()),
                Value::Array(items) => Value::from(items.len()),
                Value::Object(map) => Value::from(map.len()),
                Value::Null => Value::from(0),
                _ => Value::Null,
            },
            Node::Regexp(regex, target) => match target.eval(current) {
                Value::String(s) => Value::Bool(regex.is_match(&s)),
                Value::Number(n) => Value::Bool(regex.is_match(&n.to_string())),
                _ => Value::Bool(false),
            },
            Node::In(needle, candidates) => {
                let needle = needle.eval(current);
                Value::Bool(
                    candidates
                        .iter()
                        .any(|c| values_equal(&needle, &c.eval(current))),
                )
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) if left.is_number() && right.is_number() => a == b,
        _ => left == right,
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    let ordered = |test: fn(Ordering) -> bool| ordering(left, right).is_some_and(test);
    match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Lt => ordered(Ordering::is_lt),
        CmpOp::Le => ordered(Ordering::is_le),
        CmpOp::Gt => ordered(Ordering::is_gt),
        CmpOp::Ge => ordered(Ordering::is_ge),
    }
}

/// Defined for number/number and string/string only.
fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
