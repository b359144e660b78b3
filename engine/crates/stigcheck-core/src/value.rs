//! Dynamic values flowing from probes into assertions
//!
//! Probes produce loosely typed data (command output, parsed parameters, rule
//! lists). Values stay untyped until an assertion or attribute needs a
//! specific type, and are coerced at that point.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value read from system state, an attribute, or a control definition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Nothing was found (missing key, empty output, absent file)
    #[default]
    Absent,
    Bool(bool),
    Integer(i64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Absent, blank text and empty lists are empty
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Absent => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Bool(_) | Value::Integer(_) => false,
        }
    }

    /// Truthiness used by applicability conditions
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            other => !other.is_empty(),
        }
    }

    /// Coerce to an integer. Text is parsed after a whitespace strip and may
    /// carry a duration suffix (`s`, `m`, `h`, `d`), which yields seconds.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Text(s) => parse_integer_or_duration(s),
            _ => None,
        }
    }

    /// Text form with one surrounding whitespace strip
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.trim().to_string()),
            Value::Integer(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Absent | Value::List(_) => None,
        }
    }

    /// Discrete tokens for containment checks: list elements, or the words of
    /// a text separated by whitespace or commas
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Value::List(items) => items.iter().filter_map(Value::as_text).collect(),
            Value::Text(s) => s
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            Value::Absent => Vec::new(),
            other => other.as_text().into_iter().collect(),
        }
    }

    /// Elements for per-item iteration; scalars iterate as a single item
    pub fn items(&self) -> Vec<Value> {
        match self {
            Value::List(items) => items.clone(),
            Value::Absent => Vec::new(),
            other => vec![other.clone()],
        }
    }
}

/// Parse a decimal integer, or a duration such as `900s`, `15m`, `1h`, `7d`
pub fn parse_integer_or_duration(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    parse_duration_secs(s)
}

/// Parse a duration with a unit suffix into seconds
pub fn parse_duration_secs(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = s.split_at(split);
    let n: i64 = digits.parse().ok()?;
    let factor = match unit.trim() {
        "s" | "sec" | "secs" => 1,
        "m" | "min" | "mins" => 60,
        "h" | "hr" | "hrs" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        _ => return None,
    };
    n.checked_mul(factor)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "nothing"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Absent)
    }
}
