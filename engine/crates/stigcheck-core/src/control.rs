//! Control definitions: metadata, applicability and an assertion body
//!
//! A control body is an ordered decision tree of steps rather than arbitrary
//! code. Steps capture probe snapshots, define boolean facts, branch on
//! conditions and emit assertions. The engine interprets the tree; this
//! module only describes it.

use crate::error::{Error, Result};
use crate::probe::{Field, ProbeSpec};
use crate::severity::Severity;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single STIG control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    /// Stable identifier (e.g. "V-71943")
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Numeric impact in [0.0, 1.0]. Derived from `severity` when omitted.
    #[serde(default)]
    pub impact: Option<f64>,

    /// Declared severity. Derived from `impact` when omitted.
    #[serde(default)]
    pub severity: Option<Severity>,

    /// Free-form tags passed through to verdicts verbatim
    #[serde(default)]
    pub tags: BTreeMap<String, serde_json::Value>,

    /// Attributes this control reads, with their defaults
    #[serde(default)]
    pub attributes: Vec<AttributeDecl>,

    /// Applicability gate; the control always applies when omitted
    #[serde(default)]
    pub only_if: Option<Condition>,

    #[serde(default)]
    pub body: Vec<Step>,
}

impl Control {
    /// Parse a control from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let control: Control = serde_yaml::from_str(yaml)?;
        control.validate()?;
        Ok(control)
    }

    /// Static impact of this control
    pub fn impact(&self) -> f64 {
        match (self.impact, self.severity) {
            (Some(impact), _) => impact,
            (None, Some(severity)) => severity.impact(),
            (None, None) => 0.0,
        }
    }

    /// Severity of this control
    pub fn severity(&self) -> Severity {
        self.severity
            .unwrap_or_else(|| Severity::from_impact(self.impact()))
    }

    /// Check structural invariants of the definition
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Error::InvalidControl {
            id: self.id.clone(),
            message,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("control id must not be empty".into()));
        }

        if self.impact.is_none() && self.severity.is_none() {
            return Err(invalid("either impact or severity must be set".into()));
        }

        let impact = self.impact();
        if !(0.0..=1.0).contains(&impact) {
            return Err(invalid(format!("impact {} is outside [0.0, 1.0]", impact)));
        }

        let mut seen = std::collections::HashSet::new();
        for attr in &self.attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(invalid(format!("attribute {} declared twice", attr.name)));
            }
        }

        if let Some(gate) = &self.only_if {
            gate.check_expected().map_err(&invalid)?;
        }
        for step in &self.body {
            step.check_expected().map_err(&invalid)?;
        }

        Ok(())
    }

    /// Names of every attribute this control references, in first-use order
    pub fn attribute_refs(&self) -> Vec<String> {
        let mut refs = Vec::new();
        if let Some(cond) = &self.only_if {
            cond.collect_refs(&mut refs);
        }
        for step in &self.body {
            step.collect_refs(&mut refs);
        }
        refs
    }
}

/// Declaration of a configurable input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDecl {
    pub name: String,

    #[serde(default)]
    pub default: Value,

    #[serde(default)]
    pub description: String,

    /// Explicit kind; inferred from the default when omitted
    #[serde(default)]
    pub kind: Option<AttributeKind>,
}

/// Type an attribute is coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Text,
    Integer,
    /// Whole seconds; accepts unit suffixes on input
    Duration,
    Bool,
    List,
}

impl AttributeKind {
    /// Infer the kind of an attribute from its default value
    pub fn infer(default: &Value) -> Self {
        match default {
            Value::Integer(_) => AttributeKind::Integer,
            Value::Bool(_) => AttributeKind::Bool,
            Value::List(_) => AttributeKind::List,
            Value::Text(s) if s.trim().parse::<i64>().is_ok() => AttributeKind::Integer,
            Value::Text(s) if crate::value::parse_duration_secs(s).is_some() => {
                AttributeKind::Duration
            }
            Value::Text(_) | Value::Absent => AttributeKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Text => "text",
            AttributeKind::Integer => "integer",
            AttributeKind::Duration => "duration",
            AttributeKind::Bool => "bool",
            AttributeKind::List => "list",
        }
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison operator of an assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    #[serde(alias = "eq", alias = "==")]
    Equals,
    #[serde(alias = "ne", alias = "!=")]
    NotEquals,
    #[serde(alias = "include")]
    Includes,
    #[serde(alias = "not_include")]
    NotIncludes,
    #[serde(alias = "<=")]
    Le,
    #[serde(alias = ">=")]
    Ge,
    #[serde(alias = "match")]
    Matches,
    Empty,
    NonEmpty,
}

impl Comparator {
    /// Whether the comparator takes an expected value
    pub fn needs_expected(&self) -> bool {
        !matches!(self, Comparator::Empty | Comparator::NonEmpty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Equals => "equal",
            Comparator::NotEquals => "not equal",
            Comparator::Includes => "include",
            Comparator::NotIncludes => "not include",
            Comparator::Le => "be <=",
            Comparator::Ge => "be >=",
            Comparator::Matches => "match",
            Comparator::Empty => "be empty",
            Comparator::NonEmpty => "not be empty",
        }
    }
}

/// Where a subject's snapshot comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Run this probe now
    Probe(ProbeSpec),
    /// Reuse a snapshot bound by an earlier `capture` step
    From(String),
}

/// A value read out of a probe snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(flatten)]
    pub source: Source,

    pub field: Field,

    /// Parameter name for `field: param`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Expected side of an assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    /// Value of a resolved attribute
    Attribute { attribute: String },
    /// Literal value; text may contain `{{ attribute }}` placeholders
    Literal(Value),
}

/// Boolean condition over system state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// The subject's value is truthy
    Truthy { subject: Subject },
    /// The subject satisfies a comparison
    Check {
        subject: Subject,
        comparator: Comparator,
        #[serde(default)]
        expected: Option<Expected>,
    },
    All { of: Vec<Condition> },
    Any { of: Vec<Condition> },
    Not { condition: Box<Condition> },
    /// A fact bound by an earlier `define` step
    Fact { name: String },
}

/// An assertion as written in a control body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionSpec {
    pub description: String,
    pub subject: Subject,
    pub comparator: Comparator,
    #[serde(default)]
    pub expected: Option<Expected>,
}

/// One step of a control body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Run a probe once and bind its snapshot under `name`
    Capture { name: String, probe: ProbeSpec },
    /// Evaluate a condition once and bind the result under `name`
    Define { name: String, condition: Condition },
    /// Emit one outcome
    Assert(AssertionSpec),
    /// Emit one outcome per element of the subject's value
    Each(AssertionSpec),
    Branch {
        condition: Condition,
        #[serde(default)]
        then: Vec<Step>,
        #[serde(default)]
        otherwise: Vec<Step>,
    },
    /// When `when` holds the control is not applicable: impact drops to zero
    /// and no later step runs
    NotApplicable { when: Condition, reason: String },
}

fn collect_template_refs(template: &str, refs: &mut Vec<String>) {
    for name in crate::template::placeholders(template) {
        if !refs.iter().any(|r| r == name) {
            refs.push(name.to_string());
        }
    }
}

impl Subject {
    fn collect_refs(&self, refs: &mut Vec<String>) {
        if let Source::Probe(spec) = &self.source {
            for template in spec.templates() {
                collect_template_refs(template, refs);
            }
        }
    }
}

impl Expected {
    fn collect_refs(&self, refs: &mut Vec<String>) {
        match self {
            Expected::Attribute { attribute } => {
                if !refs.iter().any(|r| r == attribute) {
                    refs.push(attribute.clone());
                }
            }
            Expected::Literal(value) => collect_value_refs(value, refs),
        }
    }
}

fn collect_value_refs(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::Text(s) => collect_template_refs(s, refs),
        Value::List(items) => items.iter().for_each(|v| collect_value_refs(v, refs)),
        _ => {}
    }
}

impl Condition {
    fn collect_refs(&self, refs: &mut Vec<String>) {
        match self {
            Condition::Truthy { subject } => subject.collect_refs(refs),
            Condition::Check {
                subject, expected, ..
            } => {
                subject.collect_refs(refs);
                if let Some(expected) = expected {
                    expected.collect_refs(refs);
                }
            }
            Condition::All { of } | Condition::Any { of } => {
                of.iter().for_each(|c| c.collect_refs(refs))
            }
            Condition::Not { condition } => condition.collect_refs(refs),
            Condition::Fact { .. } => {}
        }
    }
}

impl AssertionSpec {
    fn collect_refs(&self, refs: &mut Vec<String>) {
        self.subject.collect_refs(refs);
        if let Some(expected) = &self.expected {
            expected.collect_refs(refs);
        }
    }
}

fn require_expected(
    comparator: Comparator,
    expected: Option<&Expected>,
    what: &str,
) -> std::result::Result<(), String> {
    if comparator.needs_expected() && expected.is_none() {
        return Err(format!(
            "{} uses comparator {:?} without an expected value",
            what, comparator
        ));
    }
    Ok(())
}

impl Condition {
    /// Every comparison that needs an expected value has one
    fn check_expected(&self) -> std::result::Result<(), String> {
        match self {
            Condition::Check {
                comparator,
                expected,
                ..
            } => require_expected(*comparator, expected.as_ref(), "condition"),
            Condition::All { of } | Condition::Any { of } => {
                of.iter().try_for_each(Condition::check_expected)
            }
            Condition::Not { condition } => condition.check_expected(),
            Condition::Truthy { .. } | Condition::Fact { .. } => Ok(()),
        }
    }
}

impl Step {
    fn check_expected(&self) -> std::result::Result<(), String> {
        match self {
            Step::Assert(spec) | Step::Each(spec) => require_expected(
                spec.comparator,
                spec.expected.as_ref(),
                &format!("assertion {:?}", spec.description),
            ),
            Step::Define { condition, .. } => condition.check_expected(),
            Step::Branch {
                condition,
                then,
                otherwise,
            } => {
                condition.check_expected()?;
                then.iter()
                    .chain(otherwise)
                    .try_for_each(Step::check_expected)
            }
            Step::NotApplicable { when, .. } => when.check_expected(),
            Step::Capture { .. } => Ok(()),
        }
    }

    fn collect_refs(&self, refs: &mut Vec<String>) {
        match self {
            Step::Capture { probe, .. } => {
                for template in probe.templates() {
                    collect_template_refs(template, refs);
                }
            }
            Step::Define { condition, .. } => condition.collect_refs(refs),
            Step::Assert(spec) | Step::Each(spec) => spec.collect_refs(refs),
            Step::Branch {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_refs(refs);
                then.iter().for_each(|s| s.collect_refs(refs));
                otherwise.iter().for_each(|s| s.collect_refs(refs));
            }
            Step::NotApplicable { when, .. } => when.collect_refs(refs),
        }
    }
}
