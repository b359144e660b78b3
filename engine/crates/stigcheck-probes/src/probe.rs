//! The probe trait and timeout handling

use async_trait::async_trait;
use std::time::Duration;
use stigcheck_core::{ProbeError, ProbeKind, ProbeResult, ResourceSnapshot};

/// A read-only query against system state
///
/// Implementations must never mutate files, processes or configuration. An
/// absent target is reported as a snapshot with `exists == false`; only a
/// structurally broken query (missing binary, unreadable file) is an error.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    fn kind(&self) -> ProbeKind;

    /// Path, command line or name being probed
    fn target(&self) -> &str;

    async fn query(&self) -> ProbeResult<ResourceSnapshot>;
}

/// Run a probe, failing with [`ProbeError::Timeout`] once `limit` elapses.
/// The probe future is dropped on timeout, which kills any child process it
/// spawned.
pub async fn query_with_timeout(
    probe: &dyn ResourceProbe,
    limit: Duration,
) -> ProbeResult<ResourceSnapshot> {
    match tokio::time::timeout(limit, probe.query()).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout {
            target: probe.target().to_string(),
            after: limit,
        }),
    }
}
