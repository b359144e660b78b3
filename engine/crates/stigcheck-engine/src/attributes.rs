//! Attribute resolution
//!
//! Every attribute is resolved once per run. The first resolution of a name
//! wins: a later declaration of the same name with a different default sees
//! the memoized value. External overrides are raw strings coerced to the
//! attribute's kind.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;
use stigcheck_core::{template, AttributeDecl, AttributeKind, Error, Result, Value};
use tracing::{debug, trace};

/// Run-scoped attribute values
#[derive(Debug, Default)]
pub struct AttributeStore {
    overrides: BTreeMap<String, String>,
    resolved: RwLock<HashMap<String, Value>>,
}

impl AttributeStore {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self {
            overrides,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a declaration
    pub fn resolve_decl(&self, decl: &AttributeDecl) -> Result<Value> {
        self.resolve(&decl.name, &decl.default, decl.kind, &decl.description)
    }

    /// Resolve `name`, returning the memoized value if it was resolved before.
    ///
    /// The kind is taken from `kind`, or inferred from `default`. An override
    /// that does not coerce to that kind is a configuration error.
    pub fn resolve(
        &self,
        name: &str,
        default: &Value,
        kind: Option<AttributeKind>,
        description: &str,
    ) -> Result<Value> {
        let mut resolved = self
            .resolved
            .write()
            .map_err(|_| Error::Internal("attribute store lock poisoned".into()))?;

        if let Some(existing) = resolved.get(name) {
            trace!("Attribute {} already resolved", name);
            return Ok(existing.clone());
        }

        let kind = kind.unwrap_or_else(|| AttributeKind::infer(default));
        let value = match self.overrides.get(name) {
            Some(raw) => {
                coerce(&Value::text(raw.as_str()), kind).ok_or_else(|| {
                    Error::InvalidAttributeOverride {
                        name: name.to_string(),
                        value: raw.clone(),
                        kind: kind.to_string(),
                    }
                })?
            }
            None => coerce(default, kind).ok_or_else(|| {
                Error::Configuration(format!(
                    "default {} of attribute {} is not a valid {}",
                    default, name, kind
                ))
            })?,
        };

        debug!(
            attribute = name,
            %value,
            overridden = self.overrides.contains_key(name),
            "Resolved attribute: {}",
            description
        );
        resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Value of an already resolved attribute
    pub fn get(&self, name: &str) -> Result<Value> {
        let resolved = self
            .resolved
            .read()
            .map_err(|_| Error::Internal("attribute store lock poisoned".into()))?;
        resolved
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAttribute {
                name: name.to_string(),
            })
    }

    /// Overrides naming attributes that were never resolved
    pub fn unused_overrides(&self) -> Vec<String> {
        let resolved = match self.resolved.read() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.overrides
            .keys()
            .filter(|name| !resolved.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    /// All resolved values, sorted by name
    pub fn values(&self) -> BTreeMap<String, Value> {
        match self.resolved.read() {
            Ok(r) => r.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Substitute `{{ name }}` placeholders verbatim
    pub fn render(&self, text: &str) -> Result<String> {
        template::render(text, |name| self.get(name).map(|v| plain_text(&v)))
    }

    /// Substitute placeholders inside a regular expression, escaping each
    /// substituted value so it matches literally
    pub fn render_pattern(&self, pattern: &str) -> Result<String> {
        template::render(pattern, |name| {
            self.get(name).map(|v| regex::escape(&plain_text(&v)))
        })
    }

    /// The subset of `names` that is not resolved
    pub fn missing_refs<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        names
            .into_iter()
            .filter(|name| self.get(name).is_err())
            .map(str::to_string)
            .collect()
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::List(_) => value.tokens().join(","),
        other => other.as_text().unwrap_or_default(),
    }
}

/// Coerce a value to an attribute kind
pub fn coerce(value: &Value, kind: AttributeKind) -> Option<Value> {
    match kind {
        AttributeKind::Text => Some(value.clone()),
        AttributeKind::Integer => match value {
            Value::Integer(n) => Some(Value::Integer(*n)),
            Value::Text(s) => s.trim().parse().ok().map(Value::Integer),
            _ => None,
        },
        AttributeKind::Duration => value.as_integer().map(Value::Integer),
        AttributeKind::Bool => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        AttributeKind::List => match value {
            Value::List(items) => Some(Value::List(items.clone())),
            Value::Absent => Some(Value::List(Vec::new())),
            Value::Text(s) => Some(Value::list(
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty()),
            )),
            other => Some(Value::List(vec![other.clone()])),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_is_coerced_to_inferred_kind() {
        let store = AttributeStore::default();
        let value = store
            .resolve("unsuccessful_attempts", &Value::text("3"), None, "")
            .unwrap();
        assert_eq!(value, Value::Integer(3));

        let value = store
            .resolve("fail_interval", &Value::text("15m"), None, "")
            .unwrap();
        assert_eq!(value, Value::Integer(900));
    }

    #[test]
    fn test_first_resolution_wins() {
        let store = AttributeStore::default();
        store
            .resolve("audit_file", &Value::text("/usr/sbin/setsebool"), None, "")
            .unwrap();
        let second = store
            .resolve("audit_file", &Value::text("/usr/bin/gpasswd"), None, "")
            .unwrap();
        assert_eq!(second, Value::text("/usr/sbin/setsebool"));
        assert_eq!(store.get("audit_file").unwrap(), second);
    }

    #[test]
    fn test_override_coercion() {
        let store = AttributeStore::new(overrides(&[("unsuccessful_attempts", " 5 ")]));
        let value = store
            .resolve("unsuccessful_attempts", &Value::Integer(3), None, "")
            .unwrap();
        assert_eq!(value, Value::Integer(5));
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let store = AttributeStore::new(overrides(&[("unsuccessful_attempts", "many")]));
        let err = store
            .resolve("unsuccessful_attempts", &Value::Integer(3), None, "")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttributeOverride { .. }));
        assert_eq!(err.code(), "INVALID_OVERRIDE");
    }

    #[test]
    fn test_unknown_attribute() {
        let store = AttributeStore::default();
        assert!(matches!(
            store.get("nope"),
            Err(Error::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_unused_overrides() {
        let store = AttributeStore::new(overrides(&[("a", "1"), ("b", "2")]));
        store.resolve("a", &Value::Integer(0), None, "").unwrap();
        assert_eq!(store.unused_overrides(), vec!["b".to_string()]);
    }

    #[test]
    fn test_render_pattern_escapes() {
        let store = AttributeStore::new(overrides(&[(
            "ldap_ca_cert",
            "/etc/openldap/cacerts/ldap.pem",
        )]));
        store
            .resolve("ldap_ca_cert", &Value::text("/etc/a.pem"), None, "")
            .unwrap();
        assert_eq!(
            store.render("{{ ldap_ca_cert }}").unwrap(),
            "/etc/openldap/cacerts/ldap.pem"
        );
        assert_eq!(
            store
                .render_pattern("^tls_cacertfile\\s+{{ ldap_ca_cert }}$")
                .unwrap(),
            "^tls_cacertfile\\s+/etc/openldap/cacerts/ldap\\.pem$"
        );
    }

    #[test]
    fn test_list_and_bool_coercion() {
        assert_eq!(
            coerce(&Value::text("rx, x"), AttributeKind::List),
            Some(Value::list(["rx", "x"]))
        );
        assert_eq!(
            coerce(&Value::text("yes"), AttributeKind::Bool),
            Some(Value::Bool(true))
        );
        assert_eq!(coerce(&Value::text("maybe"), AttributeKind::Bool), None);
    }
}
