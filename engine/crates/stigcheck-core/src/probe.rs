//! Probe descriptions and the snapshots they produce

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of resource a probe inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    File,
    Command,
    AuditRule,
    ConfigFile,
    Package,
    Service,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::File => "file",
            ProbeKind::Command => "command",
            ProbeKind::AuditRule => "audit_rule",
            ProbeKind::ConfigFile => "config_file",
            ProbeKind::Package => "package",
            ProbeKind::Service => "service",
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declarative description of a probe, as written in a control definition.
/// String targets may contain `{{ attribute }}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeSpec {
    /// Existence, type and permission bits of a path
    File { path: String },
    /// Read-only shell pipeline. Write `{{{{` for a literal `{{`.
    Command { command: String },
    /// Loaded audit rules watching a path
    AuditRule {
        path: String,
        /// Read rules from this file instead of the kernel rule list
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rules_file: Option<String>,
    },
    /// `key = value` or `key value` configuration file
    ConfigFile { path: String },
    /// Installed package lookup
    Package { name: String },
    /// systemd unit lookup
    Service { name: String },
}

impl ProbeSpec {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeSpec::File { .. } => ProbeKind::File,
            ProbeSpec::Command { .. } => ProbeKind::Command,
            ProbeSpec::AuditRule { .. } => ProbeKind::AuditRule,
            ProbeSpec::ConfigFile { .. } => ProbeKind::ConfigFile,
            ProbeSpec::Package { .. } => ProbeKind::Package,
            ProbeSpec::Service { .. } => ProbeKind::Service,
        }
    }

    /// The primary target (path, command line, package or unit name)
    pub fn target(&self) -> &str {
        match self {
            ProbeSpec::File { path }
            | ProbeSpec::AuditRule { path, .. }
            | ProbeSpec::ConfigFile { path } => path,
            ProbeSpec::Command { command } => command,
            ProbeSpec::Package { name } | ProbeSpec::Service { name } => name,
        }
    }

    /// All template-bearing strings of this spec
    pub fn templates(&self) -> Vec<&str> {
        match self {
            ProbeSpec::AuditRule {
                path,
                rules_file: Some(file),
            } => vec![path, file],
            other => vec![other.target()],
        }
    }

    /// Rewrite every template-bearing string
    pub fn map_templates<E>(
        &self,
        mut f: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<ProbeSpec, E> {
        Ok(match self {
            ProbeSpec::File { path } => ProbeSpec::File { path: f(path)? },
            ProbeSpec::Command { command } => ProbeSpec::Command {
                command: f(command)?,
            },
            ProbeSpec::AuditRule { path, rules_file } => ProbeSpec::AuditRule {
                path: f(path)?,
                rules_file: rules_file.as_deref().map(&mut f).transpose()?,
            },
            ProbeSpec::ConfigFile { path } => ProbeSpec::ConfigFile { path: f(path)? },
            ProbeSpec::Package { name } => ProbeSpec::Package { name: f(name)? },
            ProbeSpec::Service { name } => ProbeSpec::Service { name: f(name)? },
        })
    }
}

/// One configured audit rule
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditRule {
    /// Rule action (`always`, `never`)
    pub action: String,
    /// Rule list (`exit`, `task`, ...)
    pub list: String,
    /// Watched path
    pub path: String,
    /// Granted permission characters (`r`, `w`, `x`, `a`)
    pub permissions: String,
    /// Rule key (`-k`)
    pub key: Option<String>,
    /// Remaining `-F` fields in declaration order
    pub fields: Vec<String>,
    /// The rule line as read
    pub raw: String,
}

/// Probe-specific payload of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotData {
    File {
        is_file: bool,
        is_directory: bool,
        mode: Option<u32>,
    },
    Command {
        exit_status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    Params { params: BTreeMap<String, String> },
    AuditRules { rules: Vec<AuditRule> },
    Package {
        installed: bool,
        version: Option<String>,
    },
    Service {
        installed: bool,
        running: bool,
        enabled: bool,
    },
}

/// Result of one probe invocation; immutable once captured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub kind: ProbeKind,
    pub target: String,
    pub exists: bool,
    pub data: SnapshotData,
    /// Non-fatal diagnostic, e.g. stderr of a command that exited non-zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Selector reading one value out of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Exists,
    IsFile,
    IsDirectory,
    Mode,
    Stdout,
    Stderr,
    ExitStatus,
    Lines,
    LineCount,
    /// Parameter named by the subject's `key`
    Param,
    Params,
    Permissions,
    Actions,
    Installed,
    Running,
    Enabled,
    Version,
}

impl ResourceSnapshot {
    pub fn new(kind: ProbeKind, target: impl Into<String>, exists: bool, data: SnapshotData) -> Self {
        Self {
            kind,
            target: target.into(),
            exists,
            data,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Read a field. Fields that do not apply to this probe kind read as
    /// [`Value::Absent`].
    pub fn field(&self, field: Field, key: Option<&str>) -> Value {
        use SnapshotData as D;

        match (field, &self.data) {
            (Field::Exists, _) => Value::Bool(self.exists),

            (Field::IsFile, D::File { is_file, .. }) => Value::Bool(*is_file),
            (Field::IsDirectory, D::File { is_directory, .. }) => Value::Bool(*is_directory),
            (Field::Mode, D::File { mode, .. }) => mode.map(i64::from).into(),

            (Field::Stdout, D::Command { stdout, .. }) => Value::text(stdout.as_str()),
            (Field::Stderr, D::Command { stderr, .. }) => Value::text(stderr.as_str()),
            (Field::ExitStatus, D::Command { exit_status, .. }) => {
                exit_status.map(i64::from).into()
            }
            (Field::Lines, D::Command { stdout, .. }) => {
                Value::list(stdout.lines().filter(|l| !l.trim().is_empty()))
            }
            (Field::LineCount, D::Command { stdout, .. }) => {
                Value::Integer(stdout.lines().filter(|l| !l.trim().is_empty()).count() as i64)
            }

            (Field::Param, D::Params { params }) => key
                .and_then(|k| params.get(k))
                .map(|v| Value::text(v.as_str()))
                .unwrap_or(Value::Absent),
            (Field::Params, D::Params { params }) => Value::list(params.keys().map(String::as_str)),

            (Field::Permissions, D::AuditRules { rules }) => {
                Value::list(rules.iter().map(|r| r.permissions.as_str()))
            }
            (Field::Actions, D::AuditRules { rules }) => {
                Value::list(rules.iter().map(|r| r.action.as_str()))
            }
            (Field::Lines, D::AuditRules { rules }) => {
                Value::list(rules.iter().map(|r| r.raw.as_str()))
            }

            (Field::Installed, D::Package { installed, .. })
            | (Field::Installed, D::Service { installed, .. }) => Value::Bool(*installed),
            (Field::Version, D::Package { version, .. }) => version.clone().into(),
            (Field::Running, D::Service { running, .. }) => Value::Bool(*running),
            (Field::Enabled, D::Service { enabled, .. }) => Value::Bool(*enabled),

            _ => Value::Absent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_spec_yaml() {
        let spec: ProbeSpec =
            serde_yaml::from_str("kind: audit_rule\npath: /usr/bin/gpasswd").unwrap();
        assert_eq!(spec.kind(), ProbeKind::AuditRule);
        assert_eq!(spec.target(), "/usr/bin/gpasswd");
    }

    #[test]
    fn test_map_templates() {
        let spec = ProbeSpec::File {
            path: "{{ cert }}".into(),
        };
        let mapped = spec
            .map_templates(|s| Ok::<_, ()>(s.replace("{{ cert }}", "/etc/ca.pem")))
            .unwrap();
        assert_eq!(mapped.target(), "/etc/ca.pem");
    }

    #[test]
    fn test_audit_rule_fields() {
        let rules = vec![
            AuditRule {
                action: "always".into(),
                permissions: "x".into(),
                ..Default::default()
            },
            AuditRule {
                action: "never".into(),
                permissions: "rx".into(),
                ..Default::default()
            },
        ];
        let snap = ResourceSnapshot::new(
            ProbeKind::AuditRule,
            "/usr/sbin/setsebool",
            true,
            SnapshotData::AuditRules { rules },
        );
        assert_eq!(
            snap.field(Field::Permissions, None),
            Value::list(["x", "rx"])
        );
        assert_eq!(
            snap.field(Field::Actions, None),
            Value::list(["always", "never"])
        );
        assert_eq!(snap.field(Field::Stdout, None), Value::Absent);
    }

    #[test]
    fn test_param_lookup() {
        let mut params = BTreeMap::new();
        params.insert("USESSSD".to_string(), "yes".to_string());
        let snap = ResourceSnapshot::new(
            ProbeKind::ConfigFile,
            "/etc/sysconfig/authconfig",
            true,
            SnapshotData::Params { params },
        );
        assert_eq!(snap.field(Field::Param, Some("USESSSD")), Value::text("yes"));
        assert_eq!(snap.field(Field::Param, Some("USELDAPAUTH")), Value::Absent);
    }
}
