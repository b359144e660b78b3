//! Concurrent control runner
//!
//! Validates a control set, resolves attributes once, then evaluates controls
//! on tokio tasks bounded by a semaphore. Verdicts come back in input order
//! no matter which task finishes first.

use crate::attributes::AttributeStore;
use crate::evaluator::evaluate_control;
use chrono::Utc;
use futures::FutureExt;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use stigcheck_core::{Control, Error, Result, RunReport, Verdict};
use stigcheck_probes::SystemState;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Message attached to controls cut off by the run deadline
pub const DEADLINE_EXCEEDED: &str = "run deadline exceeded";

/// Runner settings
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum controls evaluated at once
    pub max_concurrent_controls: usize,
    /// Deadline for the whole run
    pub run_deadline: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_controls: 8,
            run_deadline: None,
        }
    }
}

/// Evaluates control sets against one system
pub struct Runner {
    system: Arc<dyn SystemState>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(system: Arc<dyn SystemState>, config: RunnerConfig) -> Self {
        Self { system, config }
    }

    /// Evaluate `controls` and return one verdict per control, in order.
    ///
    /// Duplicate ids, bad overrides and references to undeclared attributes
    /// fail the whole run before any control is evaluated.
    pub async fn run(
        &self,
        controls: Vec<Control>,
        overrides: BTreeMap<String, String>,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let started = Instant::now();

        check_unique_ids(&controls)?;
        let attributes = Arc::new(resolve_attributes(&controls, overrides)?);

        info!(
            "Evaluating {} controls (concurrency {})",
            controls.len(),
            self.config.max_concurrent_controls
        );

        let controls: Vec<Arc<Control>> = controls.into_iter().map(Arc::new).collect();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_controls.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, control) in controls.iter().cloned().enumerate() {
            let system = Arc::clone(&self.system);
            let attributes = Arc::clone(&attributes);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, Verdict::error(&control, "runner shut down"));
                };

                let evaluation = evaluate_control(&control, system.as_ref(), &attributes);
                let verdict = match AssertUnwindSafe(evaluation).catch_unwind().await {
                    Ok(verdict) => verdict,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        warn!(control = %control.id, "Control evaluation panicked: {}", message);
                        Verdict::error(&control, format!("evaluation panicked: {}", message))
                    }
                };
                (idx, verdict)
            });
        }

        let mut slots: Vec<Option<Verdict>> = vec![None; controls.len()];
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((idx, verdict)) => slots[idx] = Some(verdict),
                    Err(e) => warn!("Control task failed: {}", e),
                }
            }
        };

        let timed_out = match self.config.run_deadline {
            Some(deadline) => tokio::time::timeout_at(started + deadline, collect)
                .await
                .is_err(),
            None => {
                collect.await;
                false
            }
        };

        if timed_out {
            warn!("Run deadline exceeded, cancelling {} controls", tasks.len());
            tasks.shutdown().await;
        }

        let verdicts: Vec<Verdict> = controls
            .iter()
            .zip(slots)
            .map(|(control, slot)| {
                slot.unwrap_or_else(|| {
                    let message = if timed_out {
                        DEADLINE_EXCEEDED
                    } else {
                        "evaluation task did not complete"
                    };
                    Verdict::error(control, message)
                })
            })
            .collect();

        let report = RunReport::new(verdicts, started_at);
        info!(
            passed = report.summary.passed,
            failed = report.summary.failed,
            skipped = report.summary.skipped,
            not_applicable = report.summary.not_applicable,
            errors = report.summary.errors,
            "Run finished in {:?}",
            started.elapsed()
        );
        Ok(report)
    }
}

/// Reject control sets with a repeated id
pub fn check_unique_ids(controls: &[Control]) -> Result<()> {
    let mut seen = HashSet::new();
    for control in controls {
        if !seen.insert(control.id.as_str()) {
            return Err(Error::DuplicateControl {
                id: control.id.clone(),
            });
        }
    }
    Ok(())
}

/// Resolve every declared attribute in control order and check that every
/// reference and override names a declared attribute
pub fn resolve_attributes(
    controls: &[Control],
    overrides: BTreeMap<String, String>,
) -> Result<AttributeStore> {
    let store = AttributeStore::new(overrides);

    for control in controls {
        for decl in &control.attributes {
            store.resolve_decl(decl)?;
        }
    }

    if let Some(name) = store.unused_overrides().into_iter().next() {
        return Err(Error::UnknownAttribute { name });
    }

    for control in controls {
        let refs = control.attribute_refs();
        if let Some(name) = store
            .missing_refs(refs.iter().map(String::as_str))
            .into_iter()
            .next()
        {
            return Err(Error::Configuration(format!(
                "control {} references undeclared attribute {}",
                control.id, name
            )));
        }
    }

    debug!("Resolved {} attributes", store.values().len());
    Ok(store)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}
