//! Package and service probes backed by the Linux package managers and systemd

use crate::command::exec;
use crate::probe::ResourceProbe;
use async_trait::async_trait;
use std::process::Output;
use stigcheck_core::{ProbeError, ProbeKind, ProbeResult, ResourceSnapshot, SnapshotData};
use tracing::{debug, trace};

/// Looks up an installed package with `rpm`, falling back to `dpkg-query`
#[derive(Debug, Clone)]
pub struct PackageProbe {
    name: String,
}

impl PackageProbe {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn snapshot(&self, installed: bool, version: Option<String>) -> ResourceSnapshot {
        ResourceSnapshot::new(
            ProbeKind::Package,
            &self.name,
            installed,
            SnapshotData::Package { installed, version },
        )
    }
}

#[async_trait]
impl ResourceProbe for PackageProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Package
    }

    fn target(&self) -> &str {
        &self.name
    }

    async fn query(&self) -> ProbeResult<ResourceSnapshot> {
        // RHEL/CentOS
        let rpm_args = ["-q", "--qf", "%{VERSION}-%{RELEASE}", self.name.as_str()];
        if let Some(output) = exec("rpm", &rpm_args).await? {
            let (installed, version) = rpm_status(&output);
            trace!("rpm reports {} installed={}", self.name, installed);
            return Ok(self.snapshot(installed, version));
        }

        // Debian/Ubuntu
        let dpkg_args = ["-W", "-f", "${Status} ${Version}", self.name.as_str()];
        if let Some(output) = exec("dpkg-query", &dpkg_args).await? {
            let (installed, version) = if output.status.success() {
                parse_dpkg_status(&String::from_utf8_lossy(&output.stdout))
            } else {
                (false, None)
            };
            trace!("dpkg reports {} installed={}", self.name, installed);
            return Ok(self.snapshot(installed, version));
        }

        Err(ProbeError::ToolUnavailable {
            tool: "rpm or dpkg-query".into(),
            target: self.name.clone(),
        })
    }
}

fn rpm_status(output: &Output) -> (bool, Option<String>) {
    if !output.status.success() {
        return (false, None);
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (true, (!version.is_empty()).then_some(version))
}

/// Parse `dpkg-query -f '${Status} ${Version}'` output
pub fn parse_dpkg_status(stdout: &str) -> (bool, Option<String>) {
    let stdout = stdout.trim();
    match stdout.strip_prefix("install ok installed") {
        Some(rest) => {
            let version = rest.trim();
            (true, (!version.is_empty()).then(|| version.to_string()))
        }
        None => (false, None),
    }
}

/// Reports whether a systemd unit exists, is active, and is enabled
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    name: String,
}

impl ServiceProbe {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ResourceProbe for ServiceProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Service
    }

    fn target(&self) -> &str {
        &self.name
    }

    async fn query(&self) -> ProbeResult<ResourceSnapshot> {
        let output = exec(
            "systemctl",
            &[
                "show",
                "--no-pager",
                "-p",
                "LoadState,ActiveState,UnitFileState",
                self.name.as_str(),
            ],
        )
        .await?
        .ok_or_else(|| ProbeError::ToolUnavailable {
            tool: "systemctl".into(),
            target: self.name.clone(),
        })?;

        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                command: format!("systemctl show {}", self.name),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let state = UnitState::parse(&String::from_utf8_lossy(&output.stdout));
        debug!("Service {}: {:?}", self.name, state);

        Ok(ResourceSnapshot::new(
            ProbeKind::Service,
            &self.name,
            state.installed,
            SnapshotData::Service {
                installed: state.installed,
                running: state.running,
                enabled: state.enabled,
            },
        ))
    }
}

/// Unit state as reported by `systemctl show`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitState {
    pub installed: bool,
    pub running: bool,
    pub enabled: bool,
}

impl UnitState {
    pub fn parse(stdout: &str) -> Self {
        let mut state = UnitState::default();
        for line in stdout.lines() {
            match line.trim().split_once('=') {
                Some(("LoadState", v)) => state.installed = v != "not-found" && !v.is_empty(),
                Some(("ActiveState", v)) => state.running = v == "active",
                Some(("UnitFileState", v)) => {
                    state.enabled = matches!(v, "enabled" | "enabled-runtime" | "static" | "alias")
                }
                _ => {}
            }
        }
        state
    }
}
