//! Plan builder
//!
//! Turns a record's field declarations into an immutable [`Plan`]: one
//! [`FieldDescriptor`] per bindable field plus aggregate source flags, and
//! one [`FieldCheck`] per visited field carrying a `vd` rule.
//!
//! Built once per record type (see [`PlanCache`](crate::cache::PlanCache)),
//! shared read-only by every dispatch afterwards.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::config::Level;
use crate::error::BindFailure;
use crate::expr::Expr;
use crate::jsonpath::{self, Segment};
use crate::record::{FieldDecl, Record};
use crate::rules::{self, Arg, FieldRules};

/// Where a field's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Query,
    Path,
    Header,
    Cookie,
    Body,
    RawBody,
    /// No source directive: body first, then query, decided per request.
    Auto,
}

impl Source {
    pub const ALL: [Source; 7] = [
        Source::Query,
        Source::Path,
        Source::Header,
        Source::Cookie,
        Source::Body,
        Source::RawBody,
        Source::Auto,
    ];

    /// Source named by a directive, if the directive is a source directive.
    pub fn from_directive(name: &str) -> Option<Self> {
        match name {
            rules::QUERY => Some(Source::Query),
            rules::PATH => Some(Source::Path),
            rules::HEADER => Some(Source::Header),
            rules::COOKIE => Some(Source::Cookie),
            rules::BODY => Some(Source::Body),
            rules::RAW_BODY => Some(Source::RawBody),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Query => "query",
            Source::Path => "path",
            Source::Header => "header",
            Source::Cookie => "cookie",
            Source::Body => "body",
            Source::RawBody => "raw_body",
            Source::Auto => "body or query",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitset of [`Source`]s present in a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceSet(u8);

impl SourceSet {
    pub fn insert(&mut self, source: Source) {
        self.0 |= source.bit();
    }

    pub fn contains(self, source: Source) -> bool {
        self.0 & source.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Source> {
        Source::ALL.into_iter().filter(move |s| self.contains(*s))
    }

    /// Any field may read the request body.
    pub fn reads_body(self) -> bool {
        self.contains(Source::Body) || self.contains(Source::Auto)
    }
}

impl FromIterator<Source> for SourceSet {
    fn from_iter<I: IntoIterator<Item = Source>>(iter: I) -> Self {
        let mut set = SourceSet::default();
        for source in iter {
            set.insert(source);
        }
        set
    }
}

/// How one field is bound.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    index: usize,
    selector: String,
    source: Source,
    name: String,
    body_path: Vec<Segment>,
    required: bool,
}

impl FieldDescriptor {
    /// Position in [`Record::fields`].
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// External parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// JSON path used for body lookups (empty for non-body sources).
    pub fn body_path(&self) -> &[Segment] {
        &self.body_path
    }

    pub fn required(&self) -> bool {
        self.required
    }
}

/// One `vd` rule.
#[derive(Debug, Clone)]
pub struct FieldCheck {
    index: usize,
    selector: String,
    expr: Expr,
    msg: String,
}

impl FieldCheck {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Message from the field's `msg` directive, empty when absent.
    pub fn msg(&self) -> &str {
        &self.msg
    }
}

/// Immutable binding plan for one record type.
#[derive(Debug, Clone)]
pub struct Plan {
    type_name: &'static str,
    descriptors: Vec<FieldDescriptor>,
    checks: Vec<FieldCheck>,
    sources: SourceSet,
}

impl Plan {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.descriptors
    }

    pub fn checks(&self) -> &[FieldCheck] {
        &self.checks
    }

    pub fn sources(&self) -> SourceSet {
        self.sources
    }

    /// True when any declared field carries a `vd` rule.
    pub fn has_validation(&self) -> bool {
        !self.checks.is_empty()
    }

    /// Binding is a no-op.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Build the plan for `R` from its zero value.
pub fn build_for<R: Record>(level: Level) -> Result<Plan, BindFailure> {
    let mut zero = R::default();
    let plan = build(
        std::any::type_name::<R>(),
        &R::fields(),
        |index| {
            zero.slot_mut(index)
                .map(|slot| slot.to_json().unwrap_or(Value::Null))
        },
        level,
    )?;
    debug!(
        record = plan.type_name(),
        descriptors = plan.descriptors().len(),
        checks = plan.checks().len(),
        "built binding plan"
    );
    Ok(plan)
}

/// Build a plan from declarations.
///
/// `zero(i)` returns the zero value of declaration `i`, or `None` when it
/// cannot be written. Pure over its inputs, so racing builders for the same
/// type produce equal plans.
///
/// Every `vd` rule is compiled, but only fields the level visits get a
/// check.
pub fn build(
    type_name: &'static str,
    decls: &[FieldDecl],
    mut zero: impl FnMut(usize) -> Option<Value>,
    level: Level,
) -> Result<Plan, BindFailure> {
    let compiled = decls
        .iter()
        .map(|decl| {
            FieldRules::parse(decl.rules()).map_err(|e| BindFailure::RuleSyntax {
                selector: decl.selector(),
                details: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut checks = decls
        .iter()
        .zip(&compiled)
        .enumerate()
        .map(|(index, (decl, rules))| {
            rules
                .get(rules::VD)
                .map(|vd| compile_check(index, decl, rules, vd.raw()))
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut descriptors = Vec::with_capacity(decls.len());
    let mut sources = SourceSet::default();

    for (index, (decl, rules)) in decls.iter().zip(&compiled).enumerate() {
        if decl.depth() > 0 {
            let visit = match level {
                Level::OnlyFirst => false,
                Level::FirstAndTagged => rules.has_binding_directive(),
                Level::Any => true,
            };
            if !visit {
                checks[index] = None;
                continue;
            }
        }

        let Some(zero_value) = zero(index) else {
            return Err(BindFailure::NotSettable {
                selector: decl.selector(),
            });
        };

        let descriptor = describe(index, decl, rules, &zero_value)?;
        sources.insert(descriptor.source);
        descriptors.push(descriptor);
    }

    Ok(Plan {
        type_name,
        descriptors,
        checks: checks.into_iter().flatten().collect(),
        sources,
    })
}

fn describe(
    index: usize,
    decl: &FieldDecl,
    rules: &FieldRules,
    zero: &Value,
) -> Result<FieldDescriptor, BindFailure> {
    let selector = decl.selector();
    let syntax = |details: String| BindFailure::RuleSyntax {
        selector: decl.selector(),
        details,
    };

    let required = match rules.get(rules::REQUIRED).map(|d| d.arg()) {
        None => false,
        Some(Arg::None) => true,
        Some(Arg::Bool(b)) => *b,
        Some(Arg::Str(text)) | Some(Arg::Bare(text)) => Expr::compile(text)
            .map_err(|e| syntax(format!("required: {e}")))?
            .is_satisfied_by(zero),
    };

    let mut source = Source::Auto;
    let mut override_name = None;
    for directive in rules.iter() {
        let Some(found) = Source::from_directive(directive.name()) else {
            continue;
        };
        if source != Source::Auto {
            return Err(BindFailure::ConflictingSources {
                selector,
                first: source,
                second: found,
            });
        }
        source = found;
        override_name = match directive.arg() {
            Arg::None => None,
            Arg::Str(name) | Arg::Bare(name) if name.is_empty() => None,
            Arg::Str(name) | Arg::Bare(name) => Some(name.clone()),
            Arg::Bool(b) => {
                return Err(syntax(format!(
                    "parameter name of '{}' must be a string, got {b}",
                    directive.name()
                )))
            }
        };
    }

    let name = override_name
        .clone()
        .unwrap_or_else(|| decl.name().to_string());

    let body_path = match source {
        Source::Body | Source::Auto => {
            let path = match override_name {
                Some(path) => path,
                None => decl
                    .parents()
                    .iter()
                    .map(String::as_str)
                    .chain([decl.name()])
                    .collect::<Vec<_>>()
                    .join("."),
            };
            jsonpath::parse(&path).map_err(|e| syntax(e.to_string()))?
        }
        _ => Vec::new(),
    };

    Ok(FieldDescriptor {
        index,
        selector,
        source,
        name,
        body_path,
        required,
    })
}

fn compile_check(
    index: usize,
    decl: &FieldDecl,
    rules: &FieldRules,
    source: &str,
) -> Result<FieldCheck, BindFailure> {
    let expr = Expr::compile(source).map_err(|e| BindFailure::RuleSyntax {
        selector: decl.selector(),
        details: format!("vd: {e}"),
    })?;
    let msg = match rules.get(rules::MSG).map(|d| d.arg()) {
        Some(Arg::Str(text)) | Some(Arg::Bare(text)) => text.clone(),
        Some(Arg::Bool(b)) => b.to_string(),
        Some(Arg::None) | None => String::new(),
    };
    Ok(FieldCheck {
        index,
        selector: decl.selector(),
        expr,
        msg,
    })
}
