//! apibind - HTTP request binding for Rust records
//!
//! Fields of a record are populated from the query string, path
//! parameters, headers, cookies, the decoded body or the raw body, driven
//! by per-field rule text. The per-type analysis runs once and is cached;
//! every request afterwards only dispatches.

pub mod binder;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expr;
pub mod jsonpath;
pub mod plan;
pub mod record;
pub mod request;
pub mod rules;
pub mod schema;
pub mod validate;

pub use binder::{Binder, BinderBuilder};
pub use config::{BinderConfig, Level};
pub use error::{
    default_bind_error_factory, default_validation_error_factory, error_factory, BindFailure,
    BindingError, BoxError, ErrorFactory, ErrorKind, FixSuggestion,
};
pub use expr::{Expr, ExprError};
pub use plan::{FieldCheck, FieldDescriptor, Plan, Source, SourceSet};
pub use record::{FieldDecl, Record, Slot};
pub use request::{BodyCodec, PathParams, RequestView};
pub use schema::{Schema, SchemaError};
