//! Field rule compiler
//!
//! Rule text attached to a field is a list of directives:
//!
//! ```text
//! query:'page'; required; vd: $ > 0 && $ < 100; msg:'page out of range'
//! ```
//!
//! - `name` alone, or `name:argument`
//! - directives separated by `;` (a `;` inside single quotes does not split)
//! - argument forms: `'quoted'` (`\'` escapes a quote), `true`/`false`, or bare text
//!
//! This module only parses; meaning is assigned by the plan builder
//! (sources, `required`) and the validation evaluator (`vd`, `msg`).

use thiserror::Error;

/// Directive names the binder understands.
pub const REQUIRED: &str = "required";
pub const RAW_BODY: &str = "raw_body";
pub const BODY: &str = "body";
pub const QUERY: &str = "query";
pub const PATH: &str = "path";
pub const HEADER: &str = "header";
pub const COOKIE: &str = "cookie";
/// Validation expression.
pub const VD: &str = "vd";
/// Validation error message.
pub const MSG: &str = "msg";

/// Directives that make a nested field eligible under `Level::FirstAndTagged`.
pub const BINDING_DIRECTIVES: [&str; 7] = [REQUIRED, RAW_BODY, BODY, QUERY, PATH, HEADER, COOKIE];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("directive at position {position} has no name")]
    EmptyName { position: usize },

    #[error("'{name}' is not a valid directive name")]
    InvalidName { name: String },

    #[error("unterminated quote starting at position {position}")]
    UnterminatedQuote { position: usize },

    #[error("directive '{name}' appears more than once")]
    Duplicate { name: String },
}

/// Parsed argument of a directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    None,
    Str(String),
    Bool(bool),
    Bare(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    name: String,
    arg: Arg,
    raw: String,
}

impl Directive {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg(&self) -> &Arg {
        &self.arg
    }

    /// Argument text exactly as written (trimmed), quotes included.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// All directives of one field, in written order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRules {
    directives: Vec<Directive>,
}

impl FieldRules {
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let mut directives: Vec<Directive> = Vec::new();

        for (start, segment) in split_top_level(text)? {
            if segment.trim().is_empty() {
                continue;
            }

            let (name, raw) = match segment.split_once(':') {
                Some((name, raw)) => (name.trim(), raw.trim()),
                None => (segment.trim(), ""),
            };

            if name.is_empty() {
                return Err(RuleError::EmptyName { position: start });
            }
            if !is_identifier(name) {
                return Err(RuleError::InvalidName {
                    name: name.to_string(),
                });
            }
            if directives.iter().any(|d| d.name == name) {
                return Err(RuleError::Duplicate {
                    name: name.to_string(),
                });
            }

            directives.push(Directive {
                name: name.to_string(),
                arg: classify(raw),
                raw: raw.to_string(),
            });
        }

        Ok(Self { directives })
    }

    pub fn get(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// True when any directive recognised by the binder is present.
    pub fn has_binding_directive(&self) -> bool {
        self.directives
            .iter()
            .any(|d| BINDING_DIRECTIVES.contains(&d.name.as_str()))
    }
}

/// Split on `;` outside single quotes, yielding `(byte offset, segment)`.
fn split_top_level(text: &str) -> Result<Vec<(usize, &str)>, RuleError> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote_start = None;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if quote_start.is_some() => escape_next = true,
            '\'' => {
                quote_start = match quote_start {
                    Some(_) => None,
                    None => Some(i),
                }
            }
            ';' if quote_start.is_none() => {
                segments.push((start, &text[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }

    if let Some(position) = quote_start {
        return Err(RuleError::UnterminatedQuote { position });
    }
    segments.push((start, &text[start..]));
    Ok(segments)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn classify(raw: &str) -> Arg {
    match raw {
        "" => Arg::None,
        "true" => Arg::Bool(true),
        "false" => Arg::Bool(false),
        _ => match single_quoted(raw) {
            Some(text) => Arg::Str(text),
            None => Arg::Bare(raw.to_string()),
        },
    }
}

/// `'...'` covering the whole argument, unescaped.
fn single_quoted(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.char_indices();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(escaped);
            }
            '\'' => return (i + 1 == inner.len()).then_some(out),
            _ => out.push(ch),
        }
    }
    None
}
