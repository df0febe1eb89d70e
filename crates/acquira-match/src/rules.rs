//! JSON predicate rules evaluated against matched feed items.
//!
//! Conditions are an object mapping sample fields to expected values:
//! strings match case-insensitively as substrings, numbers match when the
//! sample value is greater than or equal, booleans match by equality. All
//! conditions AND together.

use acquira_core::DownloadRule;
use serde_json::Value;

/// Whether every condition in `conditions` passes against `sample`.
///
/// A non-object `conditions` value passes vacuously; a condition naming a
/// field the sample lacks fails.
#[must_use]
pub fn conditions_pass(conditions: &Value, sample: &Value) -> bool {
    let Some(conditions) = conditions.as_object() else {
        return true;
    };

    conditions.iter().all(|(field, expected)| {
        sample
            .get(field)
            .is_some_and(|actual| condition_passes(expected, actual))
    })
}

fn condition_passes(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::String(wanted), Value::String(found)) => {
            found.to_lowercase().contains(&wanted.to_lowercase())
        }
        (Value::Number(wanted), Value::Number(found)) => match (wanted.as_f64(), found.as_f64()) {
            (Some(wanted), Some(found)) => found >= wanted,
            _ => false,
        },
        (Value::Bool(wanted), Value::Bool(found)) => wanted == found,
        _ => false,
    }
}

/// The highest-priority enabled rule whose conditions pass, if any.
///
/// Ties on priority keep the earlier rule in the slice.
#[must_use]
pub fn first_matching_rule<'a>(rules: &'a [DownloadRule], sample: &Value) -> Option<&'a DownloadRule> {
    let mut candidates: Vec<&DownloadRule> = rules.iter().filter(|rule| rule.enabled).collect();
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
    candidates
        .into_iter()
        .find(|rule| conditions_pass(&rule.conditions, sample))
}
