//! Minimal JSON path for body lookups
//!
//! Supports:
//! - a.b.c (dot notation, optional `$.` prefix)
//! - a[0].b (array index)
//! - a.0.b (numeric segment: array index, or object key on objects)
//!
//! Does NOT support filters, wildcards or slices.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported body path '{path}'")]
pub struct JsonPathError {
    pub path: String,
}

/// A parsed path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object field access: .field
    Field(String),
    /// Array index access: [0] or .0
    Index(usize),
}

/// Parse a path string into segments
///
/// - "user.name" → [Field("user"), Field("name")]
/// - "items[0].id" → [Field("items"), Index(0), Field("id")]
pub fn parse(path: &str) -> Result<Vec<Segment>, JsonPathError> {
    let unsupported = || JsonPathError {
        path: path.to_string(),
    };

    let body = match path {
        "$" | "" => return Ok(vec![]),
        _ => path.strip_prefix("$.").unwrap_or(path),
    };

    let mut segments = Vec::new();

    for part in body.split('.') {
        if part.is_empty() {
            return Err(unsupported());
        }

        if let Some(bracket_pos) = part.find('[') {
            let field = &part[..bracket_pos];
            if !field.is_empty() {
                segments.push(Segment::Field(field.to_string()));
            }

            // Possibly several indexes: a[0][1]
            let mut rest = &part[bracket_pos..];
            while !rest.is_empty() {
                let inner = rest.strip_prefix('[').ok_or_else(unsupported)?;
                let close = inner.find(']').ok_or_else(unsupported)?;
                let index = inner[..close].parse().map_err(|_| unsupported())?;
                segments.push(Segment::Index(index));
                rest = &inner[close + 1..];
            }
        } else if let Ok(index) = part.parse::<usize>() {
            segments.push(Segment::Index(index));
        } else {
            segments.push(Segment::Field(part.to_string()));
        }
    }

    Ok(segments)
}

/// Walk `segments` into `value` without cloning.
pub fn lookup<'v>(value: &'v Value, segments: &[Segment]) -> Option<&'v Value> {
    segments.iter().try_fold(value, |current, segment| match segment {
        Segment::Field(name) => current.get(name.as_str()),
        Segment::Index(idx) => match current {
            Value::Object(map) => map.get(&idx.to_string()),
            _ => current.get(*idx),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_simple_path() {
        assert_eq!(
            parse("$.a.b").unwrap(),
            vec![Segment::Field("a".into()), Segment::Field("b".into())]
        );
        assert_eq!(parse("a.b").unwrap(), parse("$.a.b").unwrap());
    }

    #[test]
    fn parse_indexes() {
        assert_eq!(
            parse("items[0].name").unwrap(),
            vec![
                Segment::Field("items".into()),
                Segment::Index(0),
                Segment::Field("name".into()),
            ]
        );
        assert_eq!(
            parse("grid[1][2]").unwrap(),
            vec![
                Segment::Field("grid".into()),
                Segment::Index(1),
                Segment::Index(2)
            ]
        );
        assert_eq!(
            parse("items.3").unwrap(),
            vec![Segment::Field("items".into()), Segment::Index(3)]
        );
    }

    #[test]
    fn parse_root_is_empty() {
        assert!(parse("$").unwrap().is_empty());
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse("a..b").is_err());
        assert!(parse("a[x]").is_err());
        assert!(parse("a[0").is_err());
        assert!(parse("a[0]b").is_err());
    }

    #[test]
    fn lookup_nested() {
        let body = json!({"user": {"tags": ["a", "b"], "7": "seven"}});
        let path = parse("user.tags[1]").unwrap();
        assert_eq!(lookup(&body, &path), Some(&json!("b")));
        let path = parse("user.7").unwrap();
        assert_eq!(lookup(&body, &path), Some(&json!("seven")));
        let path = parse("user.missing").unwrap();
        assert_eq!(lookup(&body, &path), None);
    }

    #[test]
    fn lookup_root() {
        let body = json!([1, 2]);
        assert_eq!(lookup(&body, &[]), Some(&body));
    }
}
