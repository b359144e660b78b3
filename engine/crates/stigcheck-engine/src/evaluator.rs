//! Control body interpreter
//!
//! Walks a control's decision tree against a [`SystemState`]. The applicability
//! gate is evaluated first and no body probe runs when it is false. Probe
//! errors abort the control and become its single error outcome.

use crate::assertion;
use crate::attributes::AttributeStore;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::time::Instant;
use stigcheck_core::{
    AssertionSpec, Comparator, Condition, Control, Error, Expected, Outcome, ProbeSpec,
    ResourceSnapshot, Result, Source, Step, Subject, Value, Verdict,
};
use stigcheck_probes::SystemState;
use tracing::{debug, info_span, warn, Instrument};

/// Outcome of the applicability gate when it does not hold
const GATE_NOT_MET: &str = "applicability condition not met";

/// Evaluate one control to a verdict. Never fails: every problem becomes part
/// of the verdict.
pub async fn evaluate_control(
    control: &Control,
    system: &dyn SystemState,
    attributes: &AttributeStore,
) -> Verdict {
    let span = info_span!("control", id = %control.id);
    async {
        let started = Instant::now();
        let verdict = match ControlRun::new(control, system, attributes).run().await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(code = e.code(), "Control evaluation failed: {}", e);
                Verdict::error(control, e.to_string())
            }
        };
        debug!("Verdict {} in {:?}", verdict.status.as_str(), started.elapsed());
        verdict.with_duration_ms(started.elapsed().as_millis() as u64)
    }
    .instrument(span)
    .await
}

enum Flow {
    Continue,
    NotApplicable(String),
}

/// Mutable state of one control evaluation
struct ControlRun<'a> {
    control: &'a Control,
    system: &'a dyn SystemState,
    attributes: &'a AttributeStore,
    captures: HashMap<String, ResourceSnapshot>,
    facts: HashMap<String, bool>,
    outcomes: Vec<Outcome>,
}

impl<'a> ControlRun<'a> {
    fn new(control: &'a Control, system: &'a dyn SystemState, attributes: &'a AttributeStore) -> Self {
        Self {
            control,
            system,
            attributes,
            captures: HashMap::new(),
            facts: HashMap::new(),
            outcomes: Vec::new(),
        }
    }

    async fn run(mut self) -> Result<Verdict> {
        if let Some(gate) = &self.control.only_if {
            if !self.condition(gate).await? {
                debug!("Skipped: {}", GATE_NOT_MET);
                return Ok(Verdict::skipped(self.control, GATE_NOT_MET));
            }
        }

        let control = self.control;
        match self.steps(&control.body).await? {
            Flow::NotApplicable(reason) => {
                debug!("Not applicable: {}", reason);
                Ok(Verdict::not_applicable(control, reason))
            }
            Flow::Continue => Ok(Verdict::from_outcomes(control, self.outcomes)),
        }
    }

    fn steps<'s>(&'s mut self, steps: &'s [Step]) -> BoxFuture<'s, Result<Flow>> {
        async move {
            for step in steps {
                if let Flow::NotApplicable(reason) = self.step(step).await? {
                    return Ok(Flow::NotApplicable(reason));
                }
            }
            Ok(Flow::Continue)
        }
        .boxed()
    }

    async fn step(&mut self, step: &Step) -> Result<Flow> {
        match step {
            Step::Capture { name, probe } => {
                let snapshot = self.probe(probe).await?;
                self.captures.insert(name.clone(), snapshot);
            }
            Step::Define { name, condition } => {
                let holds = self.condition(condition).await?;
                debug!("Fact {} = {}", name, holds);
                self.facts.insert(name.clone(), holds);
            }
            Step::Assert(spec) => {
                let outcome = self.assert(spec).await?;
                self.outcomes.push(outcome);
            }
            Step::Each(spec) => {
                let outcomes = self.assert_each(spec).await?;
                self.outcomes.extend(outcomes);
            }
            Step::Branch {
                condition,
                then,
                otherwise,
            } => {
                let chosen = if self.condition(condition).await? {
                    then
                } else {
                    otherwise
                };
                return self.steps(chosen).await;
            }
            Step::NotApplicable { when, reason } => {
                if self.condition(when).await? {
                    return Ok(Flow::NotApplicable(self.attributes.render(reason)?));
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn assert(&mut self, spec: &AssertionSpec) -> Result<Outcome> {
        let actual = self.subject(&spec.subject).await?;
        let expected = self.expected(spec.expected.as_ref(), spec.comparator)?;
        Ok(assertion::evaluate(
            &spec.description,
            &actual,
            expected.as_ref(),
            spec.comparator,
        ))
    }

    async fn assert_each(&mut self, spec: &AssertionSpec) -> Result<Vec<Outcome>> {
        let actual = self.subject(&spec.subject).await?;
        let expected = self.expected(spec.expected.as_ref(), spec.comparator)?;

        let items = actual.items();
        if items.is_empty() {
            return Ok(vec![Outcome::failed(
                &spec.description,
                format!("no {:?} values to check", spec.subject.field),
            )]);
        }

        Ok(items
            .iter()
            .map(|item| {
                assertion::evaluate(
                    &format!("{} ({})", spec.description, item),
                    item,
                    expected.as_ref(),
                    spec.comparator,
                )
            })
            .collect())
    }

    fn condition<'s>(&'s mut self, condition: &'s Condition) -> BoxFuture<'s, Result<bool>> {
        async move {
            match condition {
                Condition::Truthy { subject } => Ok(self.subject(subject).await?.is_truthy()),
                Condition::Check {
                    subject,
                    comparator,
                    expected,
                } => {
                    let actual = self.subject(subject).await?;
                    let expected = self.expected(expected.as_ref(), *comparator)?;
                    Ok(assertion::check(&actual, &expected.unwrap_or_default(), *comparator)
                        .unwrap_or(false))
                }
                Condition::All { of } => {
                    for c in of {
                        if !self.condition(c).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Condition::Any { of } => {
                    for c in of {
                        if self.condition(c).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Condition::Not { condition } => Ok(!self.condition(condition).await?),
                Condition::Fact { name } => self.facts.get(name).copied().ok_or_else(|| {
                    self.invalid(format!("fact {} used before it is defined", name))
                }),
            }
        }
        .boxed()
    }

    async fn subject(&mut self, subject: &Subject) -> Result<Value> {
        let key = subject.key.as_deref();
        match &subject.source {
            Source::Probe(spec) => {
                let snapshot = self.probe(spec).await?;
                Ok(snapshot.field(subject.field, key))
            }
            Source::From(name) => self
                .captures
                .get(name)
                .map(|snapshot| snapshot.field(subject.field, key))
                .ok_or_else(|| self.invalid(format!("capture {} used before it is taken", name))),
        }
    }

    async fn probe(&self, spec: &ProbeSpec) -> Result<ResourceSnapshot> {
        let spec = spec.map_templates(|t| self.attributes.render(t))?;
        let snapshot = self.system.query(&spec).await?;
        debug!(
            kind = %snapshot.kind,
            target = %snapshot.target,
            exists = snapshot.exists,
            "Probe result"
        );
        Ok(snapshot)
    }

    fn expected(&self, expected: Option<&Expected>, comparator: Comparator) -> Result<Option<Value>> {
        let Some(expected) = expected else {
            return Ok(None);
        };
        let value = match expected {
            Expected::Attribute { attribute } => self.attributes.get(attribute)?,
            Expected::Literal(value) => self.render_value(value, comparator)?,
        };
        Ok(Some(value))
    }

    fn render_value(&self, value: &Value, comparator: Comparator) -> Result<Value> {
        Ok(match value {
            Value::Text(s) if comparator == Comparator::Matches => {
                Value::Text(self.attributes.render_pattern(s)?)
            }
            Value::Text(s) => Value::Text(self.attributes.render(s)?),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|v| self.render_value(v, comparator))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }

    fn invalid(&self, message: String) -> Error {
        Error::InvalidControl {
            id: self.control.id.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use stigcheck_core::{
        AuditRule, ProbeError, ProbeKind, ProbeResult, SnapshotData, VerdictStatus,
    };

    /// Answers every probe from a fixed table
    struct Scripted(BTreeMap<String, ResourceSnapshot>);

    #[async_trait]
    impl SystemState for Scripted {
        async fn query(&self, spec: &ProbeSpec) -> ProbeResult<ResourceSnapshot> {
            self.0
                .get(spec.target())
                .cloned()
                .ok_or_else(|| ProbeError::CommandNotFound {
                    command: spec.target().to_string(),
                })
        }
    }

    fn file(path: &str, exists: bool) -> (String, ResourceSnapshot) {
        (
            path.to_string(),
            ResourceSnapshot::new(
                ProbeKind::File,
                path,
                exists,
                SnapshotData::File {
                    is_file: exists,
                    is_directory: false,
                    mode: None,
                },
            ),
        )
    }

    fn rules(path: &str, perms: &[&str]) -> (String, ResourceSnapshot) {
        let rules = perms
            .iter()
            .map(|p| AuditRule {
                action: "always".into(),
                path: path.into(),
                permissions: p.to_string(),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        (
            path.to_string(),
            ResourceSnapshot::new(
                ProbeKind::AuditRule,
                path,
                !rules.is_empty(),
                SnapshotData::AuditRules { rules },
            ),
        )
    }

    const AUDIT_CONTROL: &str = r#"
id: V-72137
title: All uses of the setsebool command must be audited.
impact: 0.5
body:
  - step: capture
    name: rules
    probe: { kind: audit_rule, path: /usr/sbin/setsebool }
  - step: assert
    description: audit rules exist
    subject: { from: rules, field: permissions }
    comparator: non_empty
  - step: each
    description: permissions
    subject: { from: rules, field: permissions }
    comparator: includes
    expected: x
  - step: each
    description: action
    subject: { from: rules, field: actions }
    comparator: equals
    expected: always
"#;

    async fn run(yaml: &str, system: Scripted) -> Verdict {
        let control = Control::from_yaml(yaml).unwrap();
        let store = AttributeStore::default();
        for decl in &control.attributes {
            store.resolve_decl(decl).unwrap();
        }
        evaluate_control(&control, &system, &store).await
    }

    #[tokio::test]
    async fn test_audit_rules_pass() {
        let system = Scripted([rules("/usr/sbin/setsebool", &["x"])].into_iter().collect());
        let verdict = run(AUDIT_CONTROL, system).await;
        assert_eq!(verdict.status, VerdictStatus::Pass);
        assert_eq!(verdict.outcomes.len(), 3);
    }

    #[tokio::test]
    async fn test_audit_rules_missing_fail() {
        let system = Scripted([rules("/usr/sbin/setsebool", &[])].into_iter().collect());
        let verdict = run(AUDIT_CONTROL, system).await;
        assert_eq!(verdict.status, VerdictStatus::Fail);
        assert!(verdict.outcomes.iter().all(|o| o.is_failed()));
    }

    #[tokio::test]
    async fn test_probe_error_becomes_sole_outcome() {
        let verdict = run(AUDIT_CONTROL, Scripted(BTreeMap::new())).await;
        assert_eq!(verdict.status, VerdictStatus::Error);
        assert_eq!(verdict.outcomes.len(), 1);
        assert!(verdict.outcomes[0].message.contains("/usr/sbin/setsebool"));
    }

    const LDAP_CONTROL: &str = r#"
id: V-72231
title: LDAP must use a trusted CA certificate.
impact: 0.5
attributes:
  - name: ldap_ca_cert
    default: /etc/openldap/ldap-cacert.pem
body:
  - step: define
    name: sssd
    condition:
      op: truthy
      subject: { probe: { kind: file, path: /etc/sssd/sssd.conf }, field: exists }
  - step: not_applicable
    when: { op: not, condition: { op: fact, name: sssd } }
    reason: No LDAP mechanism is configured
  - step: assert
    description: CA certificate exists
    subject: { probe: { kind: file, path: "{{ ldap_ca_cert }}" }, field: exists }
    comparator: equals
    expected: true
"#;

    #[tokio::test]
    async fn test_not_applicable_short_circuits() {
        let system = Scripted([file("/etc/sssd/sssd.conf", false)].into_iter().collect());
        let verdict = run(LDAP_CONTROL, system).await;
        assert_eq!(verdict.status, VerdictStatus::NotApplicable);
        assert_eq!(verdict.impact, 0.0);
        assert_eq!(verdict.outcomes.len(), 1);
        assert_eq!(verdict.outcomes[0].message, "No LDAP mechanism is configured");
    }

    #[tokio::test]
    async fn test_templated_probe_target() {
        let system = Scripted(
            [
                file("/etc/sssd/sssd.conf", true),
                file("/etc/openldap/ldap-cacert.pem", true),
            ]
            .into_iter()
            .collect(),
        );
        let verdict = run(LDAP_CONTROL, system).await;
        assert_eq!(verdict.status, VerdictStatus::Pass);
        assert_eq!(verdict.impact, 0.5);
    }

    #[tokio::test]
    async fn test_undefined_fact_is_an_error() {
        let yaml = r#"
id: V-1
title: t
impact: 0.3
body:
  - step: branch
    condition: { op: fact, name: missing }
"#;
        let verdict = run(yaml, Scripted(BTreeMap::new())).await;
        assert_eq!(verdict.status, VerdictStatus::Error);
        assert!(verdict.outcomes[0].message.contains("missing"));
    }
}
