//! File existence and permission probe

use crate::probe::ResourceProbe;
use async_trait::async_trait;
use stigcheck_core::{ProbeError, ProbeKind, ProbeResult, ResourceSnapshot, SnapshotData};
use tracing::trace;

/// Reports whether a path exists, its type, and its permission bits
#[derive(Debug, Clone)]
pub struct FileProbe {
    path: String,
}

impl FileProbe {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResourceProbe for FileProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::File
    }

    fn target(&self) -> &str {
        &self.path
    }

    async fn query(&self) -> ProbeResult<ResourceSnapshot> {
        if self.path.is_empty() {
            return Err(ProbeError::InvalidTarget {
                target: self.path.clone(),
                message: "empty path".into(),
            });
        }

        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("File probe: {} does not exist", self.path);
                return Ok(absent(&self.path));
            }
            Err(e) => {
                return Err(ProbeError::Io {
                    target: self.path.clone(),
                    source: e,
                })
            }
        };

        Ok(ResourceSnapshot::new(
            ProbeKind::File,
            &self.path,
            true,
            SnapshotData::File {
                is_file: metadata.is_file(),
                is_directory: metadata.is_dir(),
                mode: mode_bits(&metadata),
            },
        ))
    }
}

fn absent(path: &str) -> ResourceSnapshot {
    ResourceSnapshot::new(
        ProbeKind::File,
        path,
        false,
        SnapshotData::File {
            is_file: false,
            is_directory: false,
            mode: None,
        },
    )
}

#[cfg(unix)]
fn mode_bits(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_bits(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}
