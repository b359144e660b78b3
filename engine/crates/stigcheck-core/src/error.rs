//! Error types for StigCheck

use std::time::Duration;
use thiserror::Error;

/// Result type alias using StigCheck Error
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for a single probe invocation
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// StigCheck error types
///
/// Configuration and engine errors are run-fatal: they are reported before any
/// verdict is produced. Probe errors are scoped to the control that issued the
/// probe and surface as that control's `error` verdict.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown attribute: {name}")]
    UnknownAttribute { name: String },

    #[error("Invalid override for attribute {name}: {value:?} is not a valid {kind}")]
    InvalidAttributeOverride {
        name: String,
        value: String,
        kind: String,
    },

    // === Engine Errors ===
    #[error("Duplicate control id: {id}")]
    DuplicateControl { id: String },

    #[error("Invalid control {id}: {message}")]
    InvalidControl { id: String, message: String },

    #[error("Invalid control definition: {path} - {message}")]
    InvalidControlDefinition { path: String, message: String },

    // === Probe Errors ===
    #[error(transparent)]
    Probe(#[from] ProbeError),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration or attribute override; aborts the run
    Config,
    /// A single probe malfunctioned; scoped to one control
    Probe,
    /// Internal invariant violation; aborts the run
    Engine,
    /// Filesystem or serialization failure outside a probe
    Io,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_)
            | Error::UnknownAttribute { .. }
            | Error::InvalidAttributeOverride { .. } => ErrorKind::Config,
            Error::DuplicateControl { .. }
            | Error::InvalidControl { .. }
            | Error::InvalidControlDefinition { .. }
            | Error::Internal(_) => ErrorKind::Engine,
            Error::Probe(_) => ErrorKind::Probe,
            Error::Io(_) | Error::DirectoryNotFound { .. } | Error::Json(_) | Error::Yaml(_) => {
                ErrorKind::Io
            }
        }
    }

    /// Check if this error is fatal (should stop the run)
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Probe)
    }

    /// Get an error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "CONFIG_ERROR",
            Error::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            Error::InvalidAttributeOverride { .. } => "INVALID_OVERRIDE",
            Error::DuplicateControl { .. } => "DUPLICATE_CONTROL",
            Error::InvalidControl { .. } => "INVALID_CONTROL",
            Error::InvalidControlDefinition { .. } => "INVALID_CONTROL_DEF",
            Error::Probe(e) => e.code(),
            Error::Io(_) => "IO_ERROR",
            Error::DirectoryNotFound { .. } => "DIR_NOT_FOUND",
            Error::Json(_) => "JSON_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Failure of a single probe invocation
///
/// An absent target is never a `ProbeError`; probes report it through
/// `ResourceSnapshot::exists`.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("timeout after {after:?} probing {target}")]
    Timeout { target: String, after: Duration },

    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("command not executable: {command}")]
    NotExecutable { command: String },

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid probe target {target:?}: {message}")]
    InvalidTarget { target: String, message: String },

    #[error("no {tool} available to query {target}")]
    ToolUnavailable { tool: String, target: String },

    #[error("{command} exited with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

impl ProbeError {
    pub fn code(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "PROBE_TIMEOUT",
            ProbeError::CommandNotFound { .. } => "COMMAND_NOT_FOUND",
            ProbeError::NotExecutable { .. } => "NOT_EXECUTABLE",
            ProbeError::Spawn { .. } => "SPAWN_FAILED",
            ProbeError::Io { .. } => "PROBE_IO_ERROR",
            ProbeError::InvalidTarget { .. } => "INVALID_TARGET",
            ProbeError::ToolUnavailable { .. } => "TOOL_UNAVAILABLE",
            ProbeError::CommandFailed { .. } => "COMMAND_FAILED",
        }
    }

    /// Whether the probe was cut short by its timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout { .. })
    }
}
