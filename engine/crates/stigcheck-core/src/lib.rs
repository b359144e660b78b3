//! StigCheck Core - Foundation types and error handling
//!
//! This crate provides the data model shared by the StigCheck crates:
//! - `Control`: a STIG control with metadata, applicability and a body
//! - `ProbeSpec` / `ResourceSnapshot`: what to read from the system and what was read
//! - `Value`: loosely typed data coerced at the point of comparison
//! - `Verdict` / `Outcome`: per-control and per-assertion results
//! - `Severity`, `Error`, etc.

pub mod control;
pub mod error;
pub mod probe;
pub mod severity;
pub mod template;
pub mod value;
pub mod verdict;

// Re-export commonly used types at crate root
pub use control::{
    AssertionSpec, AttributeDecl, AttributeKind, Comparator, Condition, Control, Expected, Source,
    Step, Subject,
};
pub use error::{Error, ErrorKind, ProbeError, ProbeResult, Result};
pub use probe::{AuditRule, Field, ProbeKind, ProbeSpec, ResourceSnapshot, SnapshotData};
pub use severity::Severity;
pub use value::Value;
pub use verdict::{
    compliance_score, Outcome, OutcomeStatus, RunReport, RunSummary, Verdict, VerdictStatus,
};
