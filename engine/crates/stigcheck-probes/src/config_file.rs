//! Simple `key = value` / `key value` configuration file probe

use crate::probe::ResourceProbe;
use async_trait::async_trait;
use std::collections::BTreeMap;
use stigcheck_core::{ProbeError, ProbeKind, ProbeResult, ResourceSnapshot, SnapshotData};
use tracing::trace;

/// Parses a flat configuration file into a parameter map
#[derive(Debug, Clone)]
pub struct ConfigFileProbe {
    path: String,
}

impl ConfigFileProbe {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResourceProbe for ConfigFileProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::ConfigFile
    }

    fn target(&self) -> &str {
        &self.path
    }

    async fn query(&self) -> ProbeResult<ResourceSnapshot> {
        let (exists, params) = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => (true, parse_params(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("Config file {} does not exist", self.path);
                (false, BTreeMap::new())
            }
            Err(e) => {
                return Err(ProbeError::Io {
                    target: self.path.clone(),
                    source: e,
                })
            }
        };

        Ok(ResourceSnapshot::new(
            ProbeKind::ConfigFile,
            &self.path,
            exists,
            SnapshotData::Params { params },
        ))
    }
}

/// Parse `key = value`, `key=value` and `key value` lines. Blank lines and
/// lines starting with `#` or `;` are skipped, surrounding quotes are
/// stripped from values, and the last occurrence of a key wins.
pub fn parse_params(content: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip comments
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let split = match line.split_once('=') {
            Some((k, v)) if !k.trim().contains(char::is_whitespace) => Some((k, v)),
            _ => line.split_once(char::is_whitespace),
        };

        let (key, value) = match split {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (line, ""),
        };

        if key.is_empty() {
            continue;
        }

        params.insert(key.to_string(), unquote(value).to_string());
    }

    params
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use stigcheck_core::{Field, Value};
    use tempfile::TempDir;

    #[test]
    fn test_parse_authconfig_style() {
        let params = parse_params(
            "# generated by authconfig\nUSESSSD=yes\nUSELDAPAUTH=\"no\"\nFORCELEGACY=no\n",
        );
        assert_eq!(params["USESSSD"], "yes");
        assert_eq!(params["USELDAPAUTH"], "no");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_parse_space_and_equals_forms() {
        let params = parse_params(
            "tls_cacertfile /etc/openldap/ldap-cacert.pem\n; comment\nid_provider = ldap\nldap_uri ldap://a=b\n",
        );
        assert_eq!(params["tls_cacertfile"], "/etc/openldap/ldap-cacert.pem");
        assert_eq!(params["id_provider"], "ldap");
        assert_eq!(params["ldap_uri"], "ldap://a=b");
    }

    #[tokio::test]
    async fn test_missing_file_reports_absent() {
        let snap = ConfigFileProbe::new("/nonexistent/sysconfig/authconfig")
            .query()
            .await
            .unwrap();
        assert!(!snap.exists);
        assert_eq!(snap.field(Field::Param, Some("USESSSD")), Value::Absent);
    }

    #[tokio::test]
    async fn test_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("authconfig");
        std::fs::write(&path, "USELDAPAUTH=yes\n").unwrap();

        let snap = ConfigFileProbe::new(path.display().to_string())
            .query()
            .await
            .unwrap();
        assert!(snap.exists);
        assert_eq!(
            snap.field(Field::Param, Some("USELDAPAUTH")),
            Value::text("yes")
        );
    }
}
