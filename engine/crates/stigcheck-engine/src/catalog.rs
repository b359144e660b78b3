//! Control catalog - ordered index of loaded controls

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use stigcheck_core::{Control, Error, Result, Severity};
use tracing::debug;

/// Controls in load order, indexed by id
#[derive(Debug, Default)]
pub struct ControlCatalog {
    controls: Vec<Control>,
    index: HashMap<String, usize>,
}

impl ControlCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a control. A second control with the same id is rejected.
    pub fn register(&mut self, control: Control) -> Result<()> {
        if self.index.contains_key(&control.id) {
            return Err(Error::DuplicateControl { id: control.id });
        }
        self.index.insert(control.id.clone(), self.controls.len());
        self.controls.push(control);
        Ok(())
    }

    /// Get a control by ID
    pub fn get(&self, id: &str) -> Option<&Control> {
        self.index.get(id).map(|&i| &self.controls[i])
    }

    /// Control ids in load order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.controls.iter().map(|c| c.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Controls at or above a severity
    pub fn by_min_severity(&self, min_severity: Severity) -> Vec<&Control> {
        self.controls
            .iter()
            .filter(|c| c.severity() >= min_severity)
            .collect()
    }

    /// Controls carrying tag `key`, optionally with a given value. List tags
    /// match when any element equals `value`.
    pub fn by_tag(&self, key: &str, value: Option<&str>) -> Vec<&Control> {
        self.controls
            .iter()
            .filter(|c| match (c.tags.get(key), value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(tag), Some(want)) => tag_matches(tag, want),
            })
            .collect()
    }

    /// Controls with the given ids, in the order requested. Unknown and
    /// repeated ids are skipped.
    pub fn by_ids(&self, ids: &[String]) -> Vec<&Control> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Names of every attribute declared by any control
    pub fn declared_attributes(&self) -> BTreeSet<&str> {
        self.controls
            .iter()
            .flat_map(|c| c.attributes.iter().map(|a| a.name.as_str()))
            .collect()
    }

    /// Narrow `overrides` to a subset of this catalog's controls.
    ///
    /// Every override must name an attribute some control in the catalog
    /// declares. Overrides for attributes that only unselected controls read
    /// are dropped.
    pub fn scope_overrides(
        &self,
        selected: &[Control],
        overrides: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let declared = self.declared_attributes();
        if let Some(name) = overrides.keys().find(|n| !declared.contains(n.as_str())) {
            return Err(Error::UnknownAttribute { name: name.clone() });
        }

        let used: BTreeSet<&str> = selected
            .iter()
            .flat_map(|c| c.attributes.iter().map(|a| a.name.as_str()))
            .collect();
        Ok(overrides
            .into_iter()
            .filter(|(name, _)| {
                let keep = used.contains(name.as_str());
                if !keep {
                    debug!("Override {} not read by any selected control", name);
                }
                keep
            })
            .collect())
    }

    /// Consume the catalog, yielding controls in load order
    pub fn into_controls(self) -> Vec<Control> {
        self.controls
    }
}

fn tag_matches(tag: &serde_json::Value, want: &str) -> bool {
    match tag {
        serde_json::Value::String(s) => s == want,
        serde_json::Value::Array(items) => items.iter().any(|v| tag_matches(v, want)),
        serde_json::Value::Bool(b) => b.to_string() == want,
        serde_json::Value::Number(n) => n.to_string() == want,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(id: &str, severity: &str, extra: &str) -> Control {
        Control::from_yaml(&format!(
            "id: {}\ntitle: t\nseverity: {}\n{}",
            id, severity, extra
        ))
        .unwrap()
    }

    fn catalog() -> ControlCatalog {
        let mut catalog = ControlCatalog::new();
        catalog
            .register(control("V-72137", "medium", "tags:\n  nist: [\"AU-12 c\", \"Rev_4\"]\n"))
            .unwrap();
        catalog
            .register(control("V-71943", "medium", "tags:\n  stig_id: RHEL-07-010320\n"))
            .unwrap();
        catalog.register(control("V-1", "low", "")).unwrap();
        catalog
    }

    #[test]
    fn test_catalog() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.get("V-71943").is_some());
        assert!(catalog.get("INVALID").is_none());
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["V-72137", "V-71943", "V-1"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = catalog();
        let err = catalog.register(control("V-1", "high", "")).unwrap_err();
        assert!(matches!(err, Error::DuplicateControl { .. }));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_filters() {
        let catalog = catalog();
        assert_eq!(catalog.by_min_severity(Severity::Medium).len(), 2);
        assert_eq!(catalog.by_tag("nist", Some("Rev_4")).len(), 1);
        assert_eq!(catalog.by_tag("stig_id", None).len(), 1);
        assert!(catalog.by_tag("nist", Some("AC-7")).is_empty());
        assert_eq!(
            catalog
                .by_ids(&["V-1".to_string(), "V-72137".to_string()])
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>(),
            vec!["V-1", "V-72137"]
        );
    }

    #[test]
    fn test_by_ids_skips_repeats() {
        let catalog = catalog();
        let ids = ["V-1", "V-1", "missing"].map(String::from);
        assert_eq!(catalog.by_ids(&ids).len(), 1);
    }

    #[test]
    fn test_scope_overrides() {
        let mut catalog = ControlCatalog::new();
        catalog
            .register(control(
                "V-71943",
                "medium",
                "attributes:\n  - name: lockout_time\n    default: \"604800\"\n",
            ))
            .unwrap();
        catalog
            .register(control(
                "V-72137",
                "medium",
                "attributes:\n  - name: setsebool_path\n    default: /usr/sbin/setsebool\n",
            ))
            .unwrap();

        let selected: Vec<Control> = catalog
            .by_ids(&["V-72137".to_string()])
            .into_iter()
            .cloned()
            .collect();
        let overrides: BTreeMap<String, String> = [
            ("lockout_time", "900"),
            ("setsebool_path", "/sbin/setsebool"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let scoped = catalog.scope_overrides(&selected, overrides.clone()).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped["setsebool_path"], "/sbin/setsebool");

        let mut unknown = overrides;
        unknown.insert("nope".into(), "1".into());
        let err = catalog.scope_overrides(&selected, unknown).unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { ref name } if name == "nope"));
    }
}
