//! Binder configuration
//!
//! The traversal [`Level`] is fixed when a [`Binder`](crate::Binder) is built
//! and applies to every record type that binder ever analyses.
//!
//! ```yaml
//! level: first_and_tagged   # only_first | first_and_tagged | any
//! ```

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How deep the plan builder looks into nested fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    /// Only top-level fields.
    OnlyFirst,
    /// Top-level fields plus nested fields tagged with a source or `required` directive.
    #[default]
    FirstAndTagged,
    /// Every field, whatever its depth.
    Any,
}

impl Level {
    /// Numeric form used by configuration surfaces; unknown values fall back
    /// to [`Level::FirstAndTagged`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::OnlyFirst,
            2 => Level::Any,
            _ => Level::FirstAndTagged,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::OnlyFirst => "only_first",
            Level::FirstAndTagged => "first_and_tagged",
            Level::Any => "any",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Infallible;

    /// Accepts snake_case or kebab-case names, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Ok(match normalized.as_str() {
            "only_first" => Level::OnlyFirst,
            "any" => Level::Any,
            _ => Level::FirstAndTagged,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Name(String),
    Number(u8),
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match LevelRepr::deserialize(deserializer)? {
            LevelRepr::Name(name) => name.parse().unwrap_or_default(),
            LevelRepr::Number(n) => Level::from_u8(n),
        })
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Serializable binder settings.
///
/// Error factories are code, not configuration: set them on
/// [`BinderBuilder`](crate::BinderBuilder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    pub level: Level,
}

impl BinderConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_is_first_and_tagged() {
        assert_eq!(Level::default(), Level::FirstAndTagged);
        assert_eq!(BinderConfig::default().level, Level::FirstAndTagged);
    }

    #[test]
    fn unknown_values_fall_back_to_middle_level() {
        assert_eq!(Level::from_u8(7), Level::FirstAndTagged);
        assert_eq!("deepest".parse::<Level>().unwrap(), Level::FirstAndTagged);
    }

    #[test]
    fn names_parse_in_any_case() {
        assert_eq!("only-first".parse::<Level>().unwrap(), Level::OnlyFirst);
        assert_eq!("ANY".parse::<Level>().unwrap(), Level::Any);
        assert_eq!(Level::from_u8(0), Level::OnlyFirst);
        assert_eq!(Level::from_u8(2), Level::Any);
    }

    #[test]
    fn config_from_yaml() {
        assert_eq!(
            BinderConfig::from_yaml("level: any").unwrap().level,
            Level::Any
        );
        assert_eq!(
            BinderConfig::from_yaml("level: 0").unwrap().level,
            Level::OnlyFirst
        );
        assert_eq!(
            BinderConfig::from_yaml("level: bogus").unwrap().level,
            Level::FirstAndTagged
        );
        assert_eq!(BinderConfig::from_yaml("{}").unwrap(), BinderConfig::default());
    }

    #[test]
    fn level_serializes_as_name() {
        let yaml = serde_yaml::to_string(&BinderConfig { level: Level::Any }).unwrap();
        assert!(yaml.contains("level: any"));
    }
}
