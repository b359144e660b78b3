//! StigCheck Engine - control evaluation
//!
//! This crate provides:
//! - `AttributeStore`: run-scoped, memoized attribute resolution
//! - `assertion::evaluate`: pure comparison of probe values against expectations
//! - `evaluate_control`: the control body interpreter
//! - `Runner`: concurrent evaluation of a control set into an ordered report
//! - `ControlCatalog` and a YAML loader for control definitions

pub mod assertion;
pub mod attributes;
pub mod catalog;
pub mod evaluator;
pub mod loader;
pub mod runner;

pub use attributes::AttributeStore;
pub use catalog::ControlCatalog;
pub use evaluator::evaluate_control;
pub use loader::{load_catalog_from_dir, load_control_file};
pub use runner::{Runner, RunnerConfig, DEADLINE_EXCEEDED};
