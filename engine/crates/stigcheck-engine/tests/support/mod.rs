//! Scripted system state for runner tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use stigcheck_core::{
    AuditRule, ProbeError, ProbeKind, ProbeResult, ProbeSpec, ResourceSnapshot, SnapshotData,
};
use stigcheck_probes::SystemState;

enum Behavior {
    Answer(ResourceSnapshot),
    Fail,
    Panic,
}

/// Answers probes by target. Unknown targets read as absent. Every query is
/// counted.
#[derive(Default)]
pub struct FakeSystem {
    behaviors: HashMap<String, Behavior>,
    delays: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str) -> Self {
        self.behaviors.insert(
            path.to_string(),
            Behavior::Answer(ResourceSnapshot::new(
                ProbeKind::File,
                path,
                true,
                SnapshotData::File {
                    is_file: true,
                    is_directory: false,
                    mode: Some(0o644),
                },
            )),
        );
        self
    }

    pub fn command(mut self, command: &str, stdout: &str) -> Self {
        self.behaviors.insert(
            command.to_string(),
            Behavior::Answer(ResourceSnapshot::new(
                ProbeKind::Command,
                command,
                true,
                SnapshotData::Command {
                    exit_status: Some(0),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            )),
        );
        self
    }

    pub fn audit_rules(mut self, path: &str, permissions: &[&str]) -> Self {
        let rules: Vec<AuditRule> = permissions
            .iter()
            .map(|p| AuditRule {
                action: "always".into(),
                list: "exit".into(),
                path: path.into(),
                permissions: p.to_string(),
                ..Default::default()
            })
            .collect();
        self.behaviors.insert(
            path.to_string(),
            Behavior::Answer(ResourceSnapshot::new(
                ProbeKind::AuditRule,
                path,
                !rules.is_empty(),
                SnapshotData::AuditRules { rules },
            )),
        );
        self
    }

    pub fn failing(mut self, target: &str) -> Self {
        self.behaviors.insert(target.to_string(), Behavior::Fail);
        self
    }

    pub fn panicking(mut self, target: &str) -> Self {
        self.behaviors.insert(target.to_string(), Behavior::Panic);
        self
    }

    pub fn delayed(mut self, target: &str, delay: Duration) -> Self {
        self.delays.insert(target.to_string(), delay);
        self
    }

    /// How often `target` was probed
    pub fn calls(&self, target: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(target)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

fn absent(spec: &ProbeSpec) -> ResourceSnapshot {
    let data = match spec.kind() {
        ProbeKind::File => SnapshotData::File {
            is_file: false,
            is_directory: false,
            mode: None,
        },
        ProbeKind::Command => SnapshotData::Command {
            exit_status: Some(1),
            stdout: String::new(),
            stderr: String::new(),
        },
        ProbeKind::AuditRule => SnapshotData::AuditRules { rules: Vec::new() },
        ProbeKind::ConfigFile => SnapshotData::Params {
            params: Default::default(),
        },
        ProbeKind::Package => SnapshotData::Package {
            installed: false,
            version: None,
        },
        ProbeKind::Service => SnapshotData::Service {
            installed: false,
            running: false,
            enabled: false,
        },
    };
    ResourceSnapshot::new(spec.kind(), spec.target(), false, data)
}

#[async_trait]
impl SystemState for FakeSystem {
    async fn query(&self, spec: &ProbeSpec) -> ProbeResult<ResourceSnapshot> {
        let target = spec.target();
        *self
            .calls
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_insert(0) += 1;

        if let Some(delay) = self.delays.get(target) {
            tokio::time::sleep(*delay).await;
        }

        match self.behaviors.get(target) {
            Some(Behavior::Answer(snapshot)) => Ok(snapshot.clone()),
            Some(Behavior::Fail) => Err(ProbeError::CommandNotFound {
                command: target.to_string(),
            }),
            Some(Behavior::Panic) => panic!("probe of {} exploded", target),
            None => Ok(absent(spec)),
        }
    }
}
