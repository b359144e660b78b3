//! StigCheck Probes - read-only system state queries
//!
//! This crate provides the resource probes controls use to inspect a host:
//! - File existence, type and permission bits
//! - Shell command output
//! - Loaded audit rules
//! - Flat configuration files
//! - Installed packages and systemd services
//!
//! # Example
//!
//! ```no_run
//! use stigcheck_core::{Field, ProbeSpec};
//! use stigcheck_probes::{LocalSystem, SystemState};
//!
//! # async fn demo() -> stigcheck_core::ProbeResult<()> {
//! let system = LocalSystem::default();
//! let snap = system
//!     .query(&ProbeSpec::AuditRule {
//!         path: "/usr/sbin/setsebool".into(),
//!         rules_file: None,
//!     })
//!     .await?;
//!
//! println!("permissions: {}", snap.field(Field::Permissions, None));
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod command;
pub mod config_file;
pub mod file;
pub mod linux;
pub mod probe;
pub mod system;

pub use audit::{parse_audit_rules, AuditRuleProbe};
pub use command::CommandProbe;
pub use config_file::{parse_params, ConfigFileProbe};
pub use file::FileProbe;
pub use linux::{PackageProbe, ServiceProbe, UnitState};
pub use probe::{query_with_timeout, ResourceProbe};
pub use system::{LocalSystem, SystemState, DEFAULT_PROBE_TIMEOUT};
