//! Inspectable records
//!
//! Rust has no runtime reflection, so a destination type describes itself:
//! [`Record::fields`] lists `(path, rule text)` declarations and
//! [`Record::slot_mut`] hands out a writable [`Slot`] per declaration.
//!
//! ```
//! use apibind::bind_record;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Filter {
//!     kind: String,
//! }
//!
//! #[derive(Debug, Default)]
//! struct Search {
//!     page: u32,
//!     filter: Filter,
//! }
//!
//! bind_record!(Search {
//!     page => "query:'page'; required",
//!     filter => "",
//!     filter.kind => "query:'kind'",
//! });
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// One declared field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    path: Vec<String>,
    rules: String,
}

impl FieldDecl {
    /// `path` lists the field names from the record root, e.g. `["filter", "kind"]`.
    pub fn new<I, S>(path: I, rules: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            rules: rules.into(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Declared name of the field itself (last path segment).
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    /// Names of the enclosing fields, outermost first.
    pub fn parents(&self) -> &[String] {
        match self.path.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        }
    }

    /// 0 for top-level fields.
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Dotted path used in error reports, e.g. `filter.kind`.
    pub fn selector(&self) -> String {
        self.path.join(".")
    }

    pub fn rules(&self) -> &str {
        &self.rules
    }
}

/// A destination type the binder can populate.
///
/// `Default` is the zero value the plan builder analyses. Indices passed to
/// [`slot`](Record::slot) and [`slot_mut`](Record::slot_mut) are positions in
/// [`fields`](Record::fields); `None` means the field cannot be written.
pub trait Record: Default + Send + Sync + 'static {
    /// Field declarations in declaration order, parents before children.
    fn fields() -> Vec<FieldDecl>;

    fn slot(&self, index: usize) -> Option<&dyn Slot>;

    fn slot_mut(&mut self, index: usize) -> Option<&mut dyn Slot>;
}

/// Type-erased access to one field value.
///
/// Implemented for every `Serialize + DeserializeOwned` type, so plain
/// fields (`String`, integers, `Option<T>`, `Vec<T>`, nested serde structs)
/// work without extra code.
pub trait Slot {
    /// Write text values (query, path, header, cookie, form).
    fn set_text(&mut self, values: &[String]) -> Result<(), String>;

    /// Write a value decoded from a JSON body.
    fn set_json(&mut self, value: &Value) -> Result<(), String>;

    /// Write the raw request body.
    fn set_raw(&mut self, raw: &[u8]) -> Result<(), String>;

    /// Current value, for validation.
    fn to_json(&self) -> Result<Value, String>;
}

impl<T> Slot for T
where
    T: Serialize + DeserializeOwned,
{
    fn set_text(&mut self, values: &[String]) -> Result<(), String> {
        let first = values.first().map(String::as_str).unwrap_or_default();
        let mut candidates = vec![Value::String(first.to_string())];
        if let Some(parsed) = parse_text(first) {
            candidates.push(parsed);
        }
        candidates.push(Value::Array(
            values.iter().cloned().map(Value::String).collect(),
        ));
        candidates.push(Value::Array(
            values
                .iter()
                .map(|v| parse_text(v).unwrap_or_else(|| Value::String(v.clone())))
                .collect(),
        ));
        *self = first_fit(candidates)?;
        Ok(())
    }

    fn set_json(&mut self, value: &Value) -> Result<(), String> {
        let mut candidates = vec![value.clone()];
        if let Some(parsed) = value.as_str().and_then(parse_text) {
            candidates.push(parsed);
        }
        *self = first_fit(candidates)?;
        Ok(())
    }

    fn set_raw(&mut self, raw: &[u8]) -> Result<(), String> {
        let mut candidates = Vec::with_capacity(2);
        if let Ok(text) = std::str::from_utf8(raw) {
            candidates.push(Value::String(text.to_string()));
        }
        candidates.push(Value::Array(raw.iter().map(|b| Value::from(*b)).collect()));
        *self = first_fit(candidates)?;
        Ok(())
    }

    fn to_json(&self) -> Result<Value, String> {
        serde_json::to_value(self).map_err(|e| e.to_string())
    }
}

/// Text that reads as JSON (numbers, booleans, null, arrays, objects).
fn parse_text(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

/// Deserialize the first candidate `T` accepts; report the first rejection otherwise.
fn first_fit<T: DeserializeOwned>(candidates: Vec<Value>) -> Result<T, String> {
    let mut first_error = None;
    for candidate in candidates {
        match serde_json::from_value(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.map_or_else(|| "no value".to_string(), |e| e.to_string()))
}

/// Implement [`Record`] for a struct from `path => "rules"` entries.
///
/// Entries are declared in order, parents before children. Every listed
/// path must be a `Serialize + DeserializeOwned` field reachable with `.`
/// access. Fields that must not be written need a hand-written impl.
#[macro_export]
macro_rules! bind_record {
    ($ty:ty { $( $($seg:ident).+ => $rules:expr ),* $(,)? }) => {
        impl $crate::Record for $ty {
            fn fields() -> ::std::vec::Vec<$crate::FieldDecl> {
                ::std::vec![
                    $( $crate::FieldDecl::new([$(stringify!($seg)),+], $rules) ),*
                ]
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn slot(&self, index: usize) -> ::std::option::Option<&dyn $crate::Slot> {
                let mut i = 0usize;
                $(
                    if i == index {
                        return ::std::option::Option::Some(&self.$($seg).+ as &dyn $crate::Slot);
                    }
                    i += 1;
                )*
                ::std::option::Option::None
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn slot_mut(&mut self, index: usize) -> ::std::option::Option<&mut dyn $crate::Slot> {
                let mut i = 0usize;
                $(
                    if i == index {
                        return ::std::option::Option::Some(&mut self.$($seg).+ as &mut dyn $crate::Slot);
                    }
                    i += 1;
                )*
                ::std::option::Option::None
            }
        }
    };
}
