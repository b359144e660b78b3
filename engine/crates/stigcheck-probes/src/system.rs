//! The host seam: turns a `ProbeSpec` into a snapshot

use crate::audit::AuditRuleProbe;
use crate::command::CommandProbe;
use crate::config_file::ConfigFileProbe;
use crate::file::FileProbe;
use crate::linux::{PackageProbe, ServiceProbe};
use crate::probe::{query_with_timeout, ResourceProbe};
use async_trait::async_trait;
use std::time::Duration;
use stigcheck_core::{ProbeResult, ProbeSpec, ResourceSnapshot};
use tracing::debug;

/// Default per-probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Read access to the system under evaluation
///
/// The engine only ever talks to the host through this trait, so tests can
/// substitute a scripted implementation.
#[async_trait]
pub trait SystemState: Send + Sync {
    async fn query(&self, spec: &ProbeSpec) -> ProbeResult<ResourceSnapshot>;
}

/// Queries the local machine
#[derive(Debug, Clone)]
pub struct LocalSystem {
    probe_timeout: Duration,
}

impl Default for LocalSystem {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl LocalSystem {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Build the concrete probe for a `ProbeSpec`
    pub fn probe_for(spec: &ProbeSpec) -> Box<dyn ResourceProbe> {
        match spec {
            ProbeSpec::File { path } => Box::new(FileProbe::new(path)),
            ProbeSpec::Command { command } => Box::new(CommandProbe::new(command)),
            ProbeSpec::AuditRule { path, rules_file } => {
                let probe = AuditRuleProbe::new(path);
                match rules_file {
                    Some(file) => Box::new(probe.from_file(file)),
                    None => Box::new(probe),
                }
            }
            ProbeSpec::ConfigFile { path } => Box::new(ConfigFileProbe::new(path)),
            ProbeSpec::Package { name } => Box::new(PackageProbe::new(name)),
            ProbeSpec::Service { name } => Box::new(ServiceProbe::new(name)),
        }
    }
}

#[async_trait]
impl SystemState for LocalSystem {
    async fn query(&self, spec: &ProbeSpec) -> ProbeResult<ResourceSnapshot> {
        let probe = Self::probe_for(spec);
        debug!("Probing {} {}", probe.kind(), probe.target());
        query_with_timeout(probe.as_ref(), self.probe_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stigcheck_core::{Field, ProbeKind, Value};
    use tempfile::TempDir;

    #[test]
    fn test_probe_for_kinds() {
        let specs = [
            ProbeSpec::File { path: "/etc/passwd".into() },
            ProbeSpec::Command { command: "true".into() },
            ProbeSpec::AuditRule {
                path: "/usr/bin/gpasswd".into(),
                rules_file: None,
            },
            ProbeSpec::ConfigFile {
                path: "/etc/sysconfig/authconfig".into(),
            },
            ProbeSpec::Package { name: "sssd".into() },
            ProbeSpec::Service { name: "sssd".into() },
        ];
        for spec in &specs {
            let probe = LocalSystem::probe_for(spec);
            assert_eq!(probe.kind(), spec.kind());
            assert_eq!(probe.target(), spec.target());
        }
    }

    #[tokio::test]
    async fn test_local_config_file_query() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("authconfig");
        std::fs::write(&path, "USESSSD=yes\n").unwrap();

        let system = LocalSystem::default();
        let snap = system
            .query(&ProbeSpec::ConfigFile {
                path: path.display().to_string(),
            })
            .await
            .unwrap();
        assert_eq!(snap.kind, ProbeKind::ConfigFile);
        assert_eq!(snap.field(Field::Param, Some("USESSSD")), Value::text("yes"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_timeout() {
        let system = LocalSystem::new(Duration::from_millis(100));
        let err = system
            .query(&ProbeSpec::Command {
                command: "sleep 10".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
