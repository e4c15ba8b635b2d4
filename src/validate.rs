//! Validation evaluator
//!
//! Runs every [`FieldCheck`] of a plan against a populated record, in
//! declaration order, and reports the first field whose `vd` expression
//! does not hold.

use serde_json::Value;
use tracing::debug;

use crate::plan::{FieldCheck, Plan};
use crate::record::Record;

/// First failing check, or `None` when the record is valid.
pub fn first_violation<'p, R: Record>(plan: &'p Plan, value: &R) -> Option<&'p FieldCheck> {
    let violation = plan.checks().iter().find(|check| {
        // Unreadable fields validate as null.
        let current = value
            .slot(check.index())
            .and_then(|slot| slot.to_json().ok())
            .unwrap_or(Value::Null);
        !check.expr().is_satisfied_by(&current)
    });

    if let Some(check) = violation {
        debug!(
            record = plan.type_name(),
            field = check.selector(),
            expr = check.expr().source(),
            "validation failed"
        );
    }
    violation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Level;
    use crate::plan;

    #[derive(Debug, Default)]
    struct Signup {
        age: u32,
        name: String,
        profile: Profile,
    }

    #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
    struct Profile {
        bio: String,
    }

    crate::bind_record!(Signup {
        age => "query; vd: $ >= 18; msg:'too young'",
        name => "vd: len($) > 0",
        profile => "",
        profile.bio => "vd: len($) < 5",
    });

    fn check_at(level: Level, value: &Signup) -> Option<(String, String)> {
        let plan = plan::build_for::<Signup>(level).unwrap();
        first_violation(&plan, value).map(|c| (c.selector().to_string(), c.msg().to_string()))
    }

    fn check(value: &Signup) -> Option<(String, String)> {
        check_at(Level::Any, value)
    }

    #[test]
    fn valid_record_passes() {
        let value = Signup {
            age: 20,
            name: "ann".into(),
            profile: Profile::default(),
        };
        assert_eq!(check(&value), None);
    }

    #[test]
    fn first_failing_field_wins() {
        let value = Signup::default();
        assert_eq!(check(&value), Some(("age".into(), "too young".into())));

        let value = Signup {
            age: 30,
            ..Default::default()
        };
        assert_eq!(check(&value), Some(("name".into(), String::new())));
    }

    #[test]
    fn nested_checks_follow_the_level() {
        let value = Signup {
            age: 30,
            name: "bo".into(),
            profile: Profile {
                bio: "far too long".into(),
            },
        };
        assert_eq!(check(&value), Some(("profile.bio".into(), String::new())));
        assert_eq!(check_at(Level::OnlyFirst, &value), None);
    }
}
