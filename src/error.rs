//! Error types with fix suggestions
//!
//! Two layers:
//! - [`BindFailure`]: internal taxonomy, every message carries a stable `BIND-0xx` code
//! - [`ErrorFactory`]: caller-swappable constructors for the errors that leave a
//!   [`Binder`](crate::Binder)
//!
//! Error code ranges:
//! - BIND-001: destination errors
//! - BIND-010-019: plan-build errors (rules, settability)
//! - BIND-020-029: extraction errors (per field, per request)

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::plan::Source;

/// Error type produced by the configurable factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Builds a user-visible error from `(fail_field, msg)`.
pub type ErrorFactory = Arc<dyn Fn(&str, &str) -> BoxError + Send + Sync>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Wrap a closure as an [`ErrorFactory`].
///
/// ```
/// use apibind::{error_factory, BoxError};
///
/// let factory = error_factory(|field, msg| -> BoxError { format!("{field}: {msg}").into() });
/// assert_eq!(factory("Page", "missing").to_string(), "Page: missing");
/// ```
pub fn error_factory<F>(f: F) -> ErrorFactory
where
    F: Fn(&str, &str) -> BoxError + Send + Sync + 'static,
{
    Arc::new(f)
}

static DEFAULT_BIND_FACTORY: Lazy<ErrorFactory> =
    Lazy::new(|| error_factory(|field, msg| Box::new(BindingError::binding(field, msg))));

static DEFAULT_VALIDATION_FACTORY: Lazy<ErrorFactory> =
    Lazy::new(|| error_factory(|field, msg| Box::new(BindingError::validation(field, msg))));

/// Factory used for binding failures unless the caller overrides it.
pub fn default_bind_error_factory() -> ErrorFactory {
    Arc::clone(&DEFAULT_BIND_FACTORY)
}

/// Factory used for validation failures unless the caller overrides it.
pub fn default_validation_error_factory() -> ErrorFactory {
    Arc::clone(&DEFAULT_VALIDATION_FACTORY)
}

/// Which factory produced a [`BindingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Binding,
    Validation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Binding => "binding failed",
            ErrorKind::Validation => "invalid parameter",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error built by the default factories.
///
/// Callers that keep the defaults can downcast a [`BoxError`] to this type
/// to read the failing field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: expr_path={fail_field}, cause={}", cause_or_invalid(.msg))]
pub struct BindingError {
    pub kind: ErrorKind,
    pub fail_field: String,
    pub msg: String,
}

fn cause_or_invalid(msg: &str) -> &str {
    if msg.is_empty() {
        "invalid"
    } else {
        msg
    }
}

impl BindingError {
    pub fn binding(fail_field: &str, msg: &str) -> Self {
        Self {
            kind: ErrorKind::Binding,
            fail_field: fail_field.to_string(),
            msg: msg.to_string(),
        }
    }

    pub fn validation(fail_field: &str, msg: &str) -> Self {
        Self {
            kind: ErrorKind::Validation,
            fail_field: fail_field.to_string(),
            msg: msg.to_string(),
        }
    }
}

/// Internal failure taxonomy.
///
/// Never returned to `Binder` callers directly: the binder hands
/// `(selector(), to_string())` to the bind-error factory.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindFailure {
    #[error("BIND-001: destination must be a registered record type")]
    NotARecord,

    // ─────────────────────────────────────────────────────────────
    // Plan-build errors (BIND-010 to BIND-012)
    // ─────────────────────────────────────────────────────────────
    #[error("BIND-010: invalid rule on '{selector}': {details}")]
    RuleSyntax { selector: String, details: String },

    #[error("BIND-011: '{selector}' declares more than one source ({first} and {second})")]
    ConflictingSources {
        selector: String,
        first: Source,
        second: Source,
    },

    #[error("BIND-012: field cannot be set: {selector}")]
    NotSettable { selector: String },

    // ─────────────────────────────────────────────────────────────
    // Extraction errors (BIND-020 to BIND-022)
    // ─────────────────────────────────────────────────────────────
    #[error("BIND-020: missing required {origin} parameter '{name}'")]
    MissingRequired {
        selector: String,
        origin: Source,
        name: String,
    },

    #[error("BIND-021: cannot convert {origin} parameter '{name}': {details}")]
    Conversion {
        selector: String,
        origin: Source,
        name: String,
        details: String,
    },

    #[error("BIND-022: malformed {codec} body: {details}")]
    MalformedBody {
        selector: String,
        codec: &'static str,
        details: String,
    },
}

impl BindFailure {
    /// Selector of the failing field; empty for destination errors.
    pub fn selector(&self) -> &str {
        match self {
            BindFailure::NotARecord => "",
            BindFailure::RuleSyntax { selector, .. }
            | BindFailure::ConflictingSources { selector, .. }
            | BindFailure::NotSettable { selector }
            | BindFailure::MissingRequired { selector, .. }
            | BindFailure::Conversion { selector, .. }
            | BindFailure::MalformedBody { selector, .. } => selector,
        }
    }
}

impl FixSuggestion for BindFailure {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BindFailure::NotARecord => {
                Some("Register the record type with BinderBuilder::register before binding through Any")
            }
            BindFailure::RuleSyntax { .. } => {
                Some("Use `name[:argument]` directives separated by `;`, e.g. query:'page'; required")
            }
            BindFailure::ConflictingSources { .. } => {
                Some("Keep a single source directive (query, path, header, cookie, body, raw_body) per field")
            }
            BindFailure::NotSettable { .. } => {
                Some("Expose the field through Record::slot_mut or remove its binding directives")
            }
            BindFailure::MissingRequired { .. } => {
                Some("Send the parameter or drop `required` from the field rules")
            }
            BindFailure::Conversion { .. } => {
                Some("Check the parameter value matches the field type")
            }
            BindFailure::MalformedBody { .. } => {
                Some("Check the request body matches its Content-Type")
            }
        }
    }
}
