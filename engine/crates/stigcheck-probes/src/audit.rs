//! Audit rule probe
//!
//! Reads the loaded kernel audit rules (`auditctl -l`) or a rules file and
//! returns the rules that watch a given path. Both syscall rules
//! (`-a always,exit -F path=... -F perm=x -k key`) and watch rules
//! (`-w /path -p wa -k key`) are understood.

use crate::command::exec;
use crate::probe::ResourceProbe;
use async_trait::async_trait;
use stigcheck_core::{
    AuditRule, ProbeError, ProbeKind, ProbeResult, ResourceSnapshot, SnapshotData,
};
use tracing::{debug, trace};

const AUDITCTL: &str = "auditctl";

/// Permissions a watch rule audits when it carries no `-p`
const WATCH_DEFAULT_PERMISSIONS: &str = "rwxa";

/// Finds audit rules applying to `path`
#[derive(Debug, Clone)]
pub struct AuditRuleProbe {
    path: String,
    rules_file: Option<String>,
}

impl AuditRuleProbe {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            rules_file: None,
        }
    }

    /// Read rules from a file instead of asking the kernel
    pub fn from_file(mut self, rules_file: impl Into<String>) -> Self {
        self.rules_file = Some(rules_file.into());
        self
    }

    async fn load_rules(&self) -> ProbeResult<String> {
        if let Some(file) = &self.rules_file {
            return match tokio::fs::read_to_string(file).await {
                Ok(content) => Ok(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
                Err(e) => Err(ProbeError::Io {
                    target: file.clone(),
                    source: e,
                }),
            };
        }

        let output = exec(AUDITCTL, &["-l"])
            .await?
            .ok_or_else(|| ProbeError::CommandNotFound {
                command: AUDITCTL.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                command: format!("{} -l", AUDITCTL),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ResourceProbe for AuditRuleProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::AuditRule
    }

    fn target(&self) -> &str {
        &self.path
    }

    async fn query(&self) -> ProbeResult<ResourceSnapshot> {
        let content = self.load_rules().await?;
        let all = parse_audit_rules(&content);
        let total = all.len();

        let rules: Vec<AuditRule> = all.into_iter().filter(|r| r.path == self.path).collect();
        debug!(
            "Audit probe: {} of {} rules watch {}",
            rules.len(),
            total,
            self.path
        );

        Ok(ResourceSnapshot::new(
            ProbeKind::AuditRule,
            &self.path,
            !rules.is_empty(),
            SnapshotData::AuditRules { rules },
        ))
    }
}

/// Parse audit rule lines as printed by `auditctl -l` or written in
/// `audit.rules`. Lines that are not `-a`/`-w` rules (control options such as
/// `-D`, `-b 8192`, comments, or "No rules") are ignored.
pub fn parse_audit_rules(content: &str) -> Vec<AuditRule> {
    content.lines().filter_map(parse_rule_line).collect()
}

fn parse_rule_line(line: &str) -> Option<AuditRule> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut rule = AuditRule {
        raw: line.to_string(),
        ..Default::default()
    };
    let mut is_rule = false;
    let mut is_watch = false;

    let mut i = 0;
    while i < tokens.len() {
        let flag = tokens[i];
        let arg = tokens.get(i + 1).copied();
        match (flag, arg) {
            ("-a", Some(spec)) | ("-A", Some(spec)) => {
                let (action, list) = split_action_list(spec);
                rule.action = action;
                rule.list = list;
                is_rule = true;
                i += 2;
            }
            ("-w", Some(path)) => {
                rule.path = path.to_string();
                if rule.action.is_empty() {
                    rule.action = "always".to_string();
                    rule.list = "exit".to_string();
                }
                is_rule = true;
                is_watch = true;
                i += 2;
            }
            ("-p", Some(perms)) => {
                rule.permissions = perms.to_string();
                i += 2;
            }
            ("-k", Some(key)) => {
                rule.key = Some(key.to_string());
                i += 2;
            }
            ("-F", Some(field)) => {
                match field.split_once('=') {
                    Some(("path", v)) | Some(("dir", v)) => rule.path = v.to_string(),
                    Some(("perm", v)) => rule.permissions = v.to_string(),
                    Some(("key", v)) => rule.key = Some(v.to_string()),
                    _ => rule.fields.push(field.to_string()),
                }
                i += 2;
            }
            ("-S", Some(syscall)) => {
                rule.fields.push(format!("syscall={}", syscall));
                i += 2;
            }
            _ => {
                trace!("Ignoring audit token {:?} in {:?}", flag, line);
                i += 1;
            }
        }
    }

    if is_watch && rule.permissions.is_empty() {
        rule.permissions = WATCH_DEFAULT_PERMISSIONS.to_string();
    }

    is_rule.then_some(rule)
}

/// `always,exit` and `exit,always` are both accepted
fn split_action_list(spec: &str) -> (String, String) {
    const ACTIONS: [&str; 2] = ["always", "never"];

    match spec.split_once(',') {
        Some((a, b)) if ACTIONS.contains(&b) && !ACTIONS.contains(&a) => {
            (b.to_string(), a.to_string())
        }
        Some((a, b)) => (a.to_string(), b.to_string()),
        None => (spec.to_string(), String::new()),
    }
}
