//! Outcomes, verdicts and run-level aggregation

use crate::control::Control;
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of a single assertion outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

/// Result of evaluating one assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub description: String,
    pub status: OutcomeStatus,
    pub message: String,
}

impl Outcome {
    pub fn passed(description: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Passed, description, message)
    }

    pub fn failed(description: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Failed, description, message)
    }

    pub fn skipped(description: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Skipped, description, message)
    }

    pub fn error(description: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Error, description, message)
    }

    fn with_status(
        status: OutcomeStatus,
        description: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            status,
            message: message.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == OutcomeStatus::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

/// Terminal status of a control evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pass,
    Fail,
    /// The applicability gate was false; no body probe ran
    Skipped,
    /// The body found the control does not apply to this system
    NotApplicable,
    /// A probe failed or the run deadline passed
    Error,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Pass => "pass",
            VerdictStatus::Fail => "fail",
            VerdictStatus::Skipped => "skipped",
            VerdictStatus::NotApplicable => "not_applicable",
            VerdictStatus::Error => "error",
        }
    }

    /// Whether the verdict's impact counts toward the compliance score
    pub fn is_scored(&self) -> bool {
        matches!(self, VerdictStatus::Pass | VerdictStatus::Fail)
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-control result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub control_id: String,
    pub title: String,
    pub status: VerdictStatus,
    pub impact: f64,
    pub severity: Severity,
    /// Outcomes in declaration order
    pub outcomes: Vec<Outcome>,
    pub tags: BTreeMap<String, serde_json::Value>,
    pub evaluated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Verdict {
    /// Build a verdict from outcomes, deriving pass/fail
    pub fn from_outcomes(control: &Control, outcomes: Vec<Outcome>) -> Self {
        let status = if outcomes.iter().any(|o| o.status == OutcomeStatus::Error) {
            VerdictStatus::Error
        } else if outcomes.iter().any(Outcome::is_failed) {
            VerdictStatus::Fail
        } else {
            VerdictStatus::Pass
        };
        Self::new(control, status, control.impact(), outcomes)
    }

    pub fn skipped(control: &Control, reason: impl Into<String>) -> Self {
        Self::new(
            control,
            VerdictStatus::Skipped,
            control.impact(),
            vec![Outcome::skipped("applicability", reason)],
        )
    }

    /// Impact is zeroed; the single outcome explains why
    pub fn not_applicable(control: &Control, reason: impl Into<String>) -> Self {
        Self::new(
            control,
            VerdictStatus::NotApplicable,
            0.0,
            vec![Outcome::skipped("not applicable", reason)],
        )
    }

    /// The triggering message is the sole outcome
    pub fn error(control: &Control, message: impl Into<String>) -> Self {
        Self::new(
            control,
            VerdictStatus::Error,
            control.impact(),
            vec![Outcome::error("evaluation error", message)],
        )
    }

    fn new(control: &Control, status: VerdictStatus, impact: f64, outcomes: Vec<Outcome>) -> Self {
        Self {
            control_id: control.id.clone(),
            title: control.title.clone(),
            status,
            impact,
            severity: if impact == 0.0 {
                Severity::None
            } else {
                control.severity()
            },
            outcomes,
            tags: control.tags.clone(),
            evaluated_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn failed_outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}

/// Summary of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_applicable: usize,
    pub errors: usize,
    /// Failed controls by severity
    pub failed_by_severity: BTreeMap<Severity, usize>,
    /// Impact-weighted pass ratio over pass/fail controls
    pub score: Option<f64>,
}

impl RunSummary {
    pub fn from_verdicts(verdicts: &[Verdict]) -> Self {
        let mut summary = RunSummary {
            total: verdicts.len(),
            ..Default::default()
        };

        for verdict in verdicts {
            match verdict.status {
                VerdictStatus::Pass => summary.passed += 1,
                VerdictStatus::Fail => {
                    summary.failed += 1;
                    *summary
                        .failed_by_severity
                        .entry(verdict.severity)
                        .or_insert(0) += 1;
                }
                VerdictStatus::Skipped => summary.skipped += 1,
                VerdictStatus::NotApplicable => summary.not_applicable += 1,
                VerdictStatus::Error => summary.errors += 1,
            }
        }

        summary.score = compliance_score(verdicts);
        summary
    }
}

/// Impact-weighted pass ratio. Skipped, not applicable and errored controls
/// are excluded from the denominator. `None` when nothing was scored.
pub fn compliance_score(verdicts: &[Verdict]) -> Option<f64> {
    let (passed, scored) = verdicts
        .iter()
        .filter(|v| v.status.is_scored())
        .fold((0.0, 0.0), |(passed, scored), v| {
            let passed = if v.status == VerdictStatus::Pass {
                passed + v.impact
            } else {
                passed
            };
            (passed, scored + v.impact)
        });

    if scored > 0.0 {
        Some(passed / scored)
    } else {
        None
    }
}

/// All verdicts of a run, in input order, with their summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub verdicts: Vec<Verdict>,
    pub summary: RunSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn new(verdicts: Vec<Verdict>, started_at: DateTime<Utc>) -> Self {
        let summary = RunSummary::from_verdicts(&verdicts);
        Self {
            verdicts,
            summary,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn get(&self, control_id: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.control_id == control_id)
    }
}
