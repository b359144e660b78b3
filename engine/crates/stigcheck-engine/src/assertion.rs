//! Assertion evaluation
//!
//! Pure comparison of an actual value against an expectation. A mismatch,
//! including an absent or non-numeric actual for an ordering comparator, is a
//! failed outcome rather than an error.

use regex::Regex;
use std::cmp::Ordering;
use stigcheck_core::{Comparator, Outcome, Value};

/// Evaluate one assertion
pub fn evaluate(
    description: &str,
    actual: &Value,
    expected: Option<&Value>,
    comparator: Comparator,
) -> Outcome {
    let expected = match (comparator.needs_expected(), expected) {
        (true, None) => {
            return Outcome::error(
                description,
                format!("comparator {:?} needs an expected value", comparator),
            )
        }
        (_, e) => e.unwrap_or(&Value::Absent),
    };

    let message = if comparator.needs_expected() {
        format!("expected {} to {} {}", actual, comparator.as_str(), expected)
    } else {
        format!("expected {} to {}", actual, comparator.as_str())
    };

    match check(actual, expected, comparator) {
        Ok(true) => Outcome::passed(description, message),
        Ok(false) => Outcome::failed(description, message),
        Err(reason) => Outcome::failed(description, format!("{} ({})", message, reason)),
    }
}

/// Whether the comparison holds. `Err` carries the reason a comparison could
/// not be made; it still counts as a failure.
pub fn check(actual: &Value, expected: &Value, comparator: Comparator) -> Result<bool, String> {
    match comparator {
        Comparator::Equals => Ok(equals(actual, expected)),
        Comparator::NotEquals => Ok(!equals(actual, expected)),
        Comparator::Le => ordering(actual, expected).map(|o| o != Ordering::Greater),
        Comparator::Ge => ordering(actual, expected).map(|o| o != Ordering::Less),
        Comparator::Includes => includes_all(actual, expected),
        Comparator::NotIncludes => includes_any(actual, expected).map(|found| !found),
        Comparator::Matches => matches(actual, expected),
        Comparator::Empty => Ok(actual.is_empty()),
        Comparator::NonEmpty => Ok(!actual.is_empty()),
    }
}

fn equals(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(e)) = (actual.as_integer(), expected.as_integer()) {
        return a == e;
    }
    match (actual, expected) {
        (Value::List(_), Value::List(_)) => actual.tokens() == expected.tokens(),
        _ => actual.as_text() == expected.as_text(),
    }
}

fn ordering(actual: &Value, expected: &Value) -> Result<Ordering, String> {
    let e = expected
        .as_integer()
        .ok_or_else(|| format!("{} is not numeric", expected))?;
    let a = actual
        .as_integer()
        .ok_or_else(|| format!("{} is not numeric", actual))?;
    Ok(a.cmp(&e))
}

fn wanted_tokens(expected: &Value) -> Result<Vec<String>, String> {
    let mut tokens = expected.tokens();
    tokens.sort();
    tokens.dedup();
    if tokens.is_empty() {
        return Err("nothing to look for".into());
    }
    Ok(tokens)
}

fn contains(actual: &Value, token: &str) -> bool {
    match actual {
        // Permission strings such as "rx" hold several flags
        Value::Text(s) => s.contains(token),
        other => other.tokens().iter().any(|t| t == token),
    }
}

fn includes_all(actual: &Value, expected: &Value) -> Result<bool, String> {
    Ok(wanted_tokens(expected)?
        .iter()
        .all(|t| contains(actual, t)))
}

fn includes_any(actual: &Value, expected: &Value) -> Result<bool, String> {
    Ok(wanted_tokens(expected)?
        .iter()
        .any(|t| contains(actual, t)))
}

fn matches(actual: &Value, expected: &Value) -> Result<bool, String> {
    let pattern = expected
        .as_text()
        .ok_or_else(|| format!("{} is not a pattern", expected))?;
    let re = Regex::new(&pattern).map_err(|e| format!("invalid pattern: {}", e))?;

    match actual {
        Value::Absent => Ok(false),
        Value::List(items) => {
            if items.is_empty() {
                return Ok(false);
            }
            Ok(items
                .iter()
                .all(|item| item.as_text().map_or(false, |t| re.is_match(&t))))
        }
        other => Ok(other.as_text().map_or(false, |t| re.is_match(&t))),
    }
}
