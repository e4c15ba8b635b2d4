//! Field schema documents
//!
//! Describe a record's fields in YAML and build its plan without compiling
//! a Rust type. Used by the `apibind plan` command.
//!
//! ```yaml
//! level: first_and_tagged
//! fields:
//!   - name: Page
//!     rules: "query:'page'; required"
//!   - name: Filter.Kind
//!     rules: "query:'kind'"
//!   - name: secret
//!     settable: false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Level;
use crate::error::{BindFailure, FixSuggestion};
use crate::plan::{self, Plan};
use crate::record::FieldDecl;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("BIND-030: cannot read schema '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("BIND-031: invalid schema '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

impl FixSuggestion for SchemaError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            SchemaError::Read { .. } => Some("Check the schema path exists and is readable"),
            SchemaError::Parse { .. } => {
                Some("A schema is `fields:` followed by a list of {name, rules, settable} entries")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Dotted path from the record root, e.g. `Filter.Kind`.
    pub name: String,
    #[serde(default)]
    pub rules: String,
    #[serde(default = "default_settable")]
    pub settable: bool,
}

fn default_settable() -> bool {
    true
}

impl Schema {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&yaml).map_err(|source| SchemaError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn decls(&self) -> Vec<FieldDecl> {
        self.fields
            .iter()
            .map(|field| FieldDecl::new(field.name.split('.'), field.rules.as_str()))
            .collect()
    }

    /// Build with `level`, else the schema's own level, else the default.
    /// Schema fields carry no type, so `required` expressions see `null`.
    pub fn build_plan(&self, level: Option<Level>) -> Result<Plan, BindFailure> {
        let level = level.or(self.level).unwrap_or_default();
        plan::build(
            "schema",
            &self.decls(),
            |index| {
                self.fields
                    .get(index)
                    .filter(|f| f.settable)
                    .map(|_| Value::Null)
            },
            level,
        )
    }
}
