//! Shell command probe

use crate::probe::ResourceProbe;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use stigcheck_core::{ProbeError, ProbeKind, ProbeResult, ResourceSnapshot, SnapshotData};
use tokio::process::Command;
use tracing::{debug, trace};

/// Shell exit status for "command not found"
const EXIT_NOT_FOUND: i32 = 127;
/// Shell exit status for "found but not executable"
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Runs a read-only shell pipeline through `sh -c`
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: String,
    shell: String,
}

impl CommandProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: String::from("sh"),
        }
    }

    /// Use a different shell binary
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl ResourceProbe for CommandProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Command
    }

    fn target(&self) -> &str {
        &self.command
    }

    async fn query(&self) -> ProbeResult<ResourceSnapshot> {
        if self.command.trim().is_empty() {
            return Err(ProbeError::InvalidTarget {
                target: self.command.clone(),
                message: "empty command".into(),
            });
        }

        trace!("Running command probe: {}", self.command);

        let output = exec(&self.shell, &["-c", self.command.as_str()])
            .await?
            .ok_or_else(|| ProbeError::CommandNotFound {
                command: self.shell.clone(),
            })?;

        let exit_status = output.status.code();
        match exit_status {
            Some(EXIT_NOT_FOUND) => {
                return Err(ProbeError::CommandNotFound {
                    command: self.command.clone(),
                })
            }
            Some(EXIT_NOT_EXECUTABLE) => {
                return Err(ProbeError::NotExecutable {
                    command: self.command.clone(),
                })
            }
            _ => {}
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        debug!(
            "Command probe exited with {:?} ({} bytes stdout)",
            exit_status,
            stdout.len()
        );

        let failed = !output.status.success() && !stderr.is_empty();
        let snapshot = ResourceSnapshot::new(
            ProbeKind::Command,
            &self.command,
            true,
            SnapshotData::Command {
                exit_status,
                stdout,
                stderr: stderr.clone(),
            },
        );

        Ok(if failed {
            snapshot.with_error(stderr)
        } else {
            snapshot
        })
    }
}

/// Spawn `program` with `args` and collect its output. `Ok(None)` means the
/// program itself does not exist.
pub(crate) async fn exec(program: &str, args: &[&str]) -> ProbeResult<Option<Output>> {
    let result = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    match result {
        Ok(output) => Ok(Some(output)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ProbeError::Spawn {
            command: program.to_string(),
            source: e,
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::probe::query_with_timeout;
    use std::time::{Duration, Instant};
    use stigcheck_core::{Field, Value};

    #[tokio::test]
    async fn test_trimmed_stdout() {
        let snap = CommandProbe::new("echo 'deny=3' | cut -d '=' -f2")
            .query()
            .await
            .unwrap();
        assert!(snap.exists);
        assert_eq!(snap.field(Field::Stdout, None), Value::text("3"));
        assert_eq!(snap.field(Field::ExitStatus, None), Value::Integer(0));
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_result() {
        let snap = CommandProbe::new("echo oops >&2; exit 1")
            .query()
            .await
            .unwrap();
        assert_eq!(snap.field(Field::ExitStatus, None), Value::Integer(1));
        assert_eq!(snap.error.as_deref(), Some("oops"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let err = CommandProbe::new("definitely-not-a-real-binary-4711 --version")
            .query()
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::CommandNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_shell_is_an_error() {
        let err = CommandProbe::new("true")
            .with_shell("/nonexistent/shell")
            .query()
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::CommandNotFound { .. }));
    }

    #[tokio::test]
    async fn test_timeout_does_not_hang() {
        let probe = CommandProbe::new("sleep 30");
        let start = Instant::now();
        let err = query_with_timeout(&probe, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
