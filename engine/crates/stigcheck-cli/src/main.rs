//! StigCheck - evaluate a STIG control catalog against the local host
//!
//! Loads controls from a directory of YAML definitions, resolves attributes
//! from the configuration file, `STIGCHECK_ATTR_*` variables and
//! `--attribute` flags (later sources win), runs every control and prints a
//! report to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use stigcheck_common::{Config, LogConfig};
use stigcheck_core::{Control, OutcomeStatus, RunReport, Severity, Verdict, VerdictStatus};
use stigcheck_engine::{load_catalog_from_dir, ControlCatalog, Runner, RunnerConfig};
use stigcheck_probes::LocalSystem;
use tracing::{debug, info, warn};

const DEFAULT_CONFIG_PATH: &str = "/etc/stigcheck/stigcheck.toml";

/// StigCheck control runner
#[derive(Parser, Debug)]
#[command(name = "stigcheck")]
#[command(version)]
#[command(about = "Evaluate STIG controls against the local host", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Directory of control definitions
    #[arg(long)]
    controls: Option<String>,

    /// Attribute override (repeatable)
    #[arg(short, long = "attribute", value_name = "NAME=VALUE", value_parser = parse_attribute)]
    attributes: Vec<(String, String)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<String>,

    /// Report format (json, text)
    #[arg(long, default_value = "text")]
    format: String,

    /// Only show failed and errored controls
    #[arg(long)]
    failures_only: bool,

    /// Evaluate only controls at or above this severity
    #[arg(long)]
    min_severity: Option<Severity>,

    /// Evaluate only these control ids (repeatable)
    #[arg(long = "control", value_name = "ID")]
    control_ids: Vec<String>,

    /// Evaluate only controls carrying this tag (repeatable, all must match)
    #[arg(long = "tag", value_name = "KEY[=VALUE]", value_parser = parse_tag)]
    tags: Vec<(String, Option<String>)>,

    /// Maximum controls evaluated at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-probe timeout in seconds
    #[arg(long)]
    probe_timeout: Option<u64>,

    /// Deadline for the whole run in seconds
    #[arg(long)]
    deadline: Option<u64>,
}

fn parse_attribute(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {:?}", raw)),
    }
}

fn parse_tag(raw: &str) -> std::result::Result<(String, Option<String>), String> {
    let (key, value) = match raw.split_once('=') {
        Some((key, value)) => (key.trim(), Some(value.to_string())),
        None => (raw.trim(), None),
    };
    if key.is_empty() {
        return Err(format!("expected KEY or KEY=VALUE, got {:?}", raw));
    }
    Ok((key.to_string(), value))
}

/// Controls picked by `--control`, `--min-severity` and `--tag`, in catalog
/// order unless ids were given
fn select_controls(catalog: &ControlCatalog, args: &Args) -> Vec<Control> {
    let mut selected: Vec<&Control> = if args.control_ids.is_empty() {
        catalog.iter().collect()
    } else {
        for id in &args.control_ids {
            if catalog.get(id).is_none() {
                warn!("Control {} is not in the catalog", id);
            }
        }
        catalog.by_ids(&args.control_ids)
    };

    if let Some(min) = args.min_severity {
        let keep: HashSet<&str> = catalog
            .by_min_severity(min)
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        selected.retain(|c| keep.contains(c.id.as_str()));
    }
    for (key, value) in &args.tags {
        let keep: HashSet<&str> = catalog
            .by_tag(key, value.as_deref())
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        selected.retain(|c| keep.contains(c.id.as_str()));
    }

    selected.into_iter().cloned().collect()
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::from_file(DEFAULT_CONFIG_PATH)?,
        None => Config::default(),
    };

    let mut config = config.merge_env()?;

    if let Some(dir) = &args.controls {
        config.engine.controls_dir = Some(dir.clone());
    }
    if let Some(n) = args.concurrency {
        config.engine.max_concurrent_controls = n;
    }
    if let Some(secs) = args.probe_timeout {
        config.engine.probe_timeout_seconds = secs;
    }
    if let Some(secs) = args.deadline {
        config.engine.run_deadline_seconds = Some(secs);
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &args.log_format {
        config.logging.format = format.clone();
    }
    for (name, value) in &args.attributes {
        config.attributes.insert(name.clone(), value.clone());
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    stigcheck_common::init_logging_with_config(LogConfig::from_settings(&config.logging)?)?;
    info!("StigCheck v{}", env!("CARGO_PKG_VERSION"));

    let controls_dir = config
        .engine
        .controls_dir
        .clone()
        .context("no control directory given (use --controls or STIGCHECK_CONTROLS_DIR)")?;

    let catalog = load_catalog_from_dir(&controls_dir)?;
    let controls = select_controls(&catalog, &args);
    let overrides = catalog.scope_overrides(&controls, config.attributes.clone())?;
    debug!("{} of {} controls selected", controls.len(), catalog.len());

    let system = LocalSystem::new(Duration::from_secs(config.engine.probe_timeout_seconds));
    let runner = Runner::new(
        std::sync::Arc::new(system),
        RunnerConfig {
            max_concurrent_controls: config.engine.max_concurrent_controls,
            run_deadline: config.engine.run_deadline_seconds.map(Duration::from_secs),
        },
    );

    let report = runner
        .run(controls, overrides)
        .await?;

    match args.format.as_str() {
        "json" => print_report_json(&report, args.failures_only)?,
        _ => print_report_text(&report, args.failures_only),
    }

    // Exit non-zero on high/critical failures
    let critical_failures = report
        .verdicts
        .iter()
        .filter(|v| v.status == VerdictStatus::Fail && v.severity >= Severity::High)
        .count();

    if critical_failures > 0 {
        warn!("{} high/critical severity controls failed", critical_failures);
        std::process::exit(1);
    }

    Ok(())
}

fn shown(verdict: &Verdict, failures_only: bool) -> bool {
    !failures_only || matches!(verdict.status, VerdictStatus::Fail | VerdictStatus::Error)
}

/// Print the report as JSON
fn print_report_json(report: &RunReport, failures_only: bool) -> Result<()> {
    if !failures_only {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let verdicts: Vec<&Verdict> = report
        .verdicts
        .iter()
        .filter(|v| shown(v, true))
        .collect();
    let output = serde_json::json!({
        "summary": report.summary,
        "started_at": report.started_at,
        "finished_at": report.finished_at,
        "verdicts": verdicts,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the report as text
fn print_report_text(report: &RunReport, failures_only: bool) {
    println!("\n=== STIG Control Results ===\n");

    for v in report.verdicts.iter().filter(|v| shown(v, failures_only)) {
        println!(
            "[{}] {} - {}",
            v.status.as_str().to_uppercase(),
            v.control_id,
            truncate(&v.title, 72)
        );
        println!("    Severity: {} (impact {:.1})", v.severity, v.impact);

        for o in &v.outcomes {
            let icon = match o.status {
                OutcomeStatus::Passed => "✓",
                OutcomeStatus::Failed => "✗",
                OutcomeStatus::Skipped => "-",
                OutcomeStatus::Error => "!",
            };
            println!("    {} {}: {}", icon, o.description, o.message);
        }
        println!();
    }

    let s = &report.summary;
    println!("Summary:");
    println!("  Total:          {}", s.total);
    println!("  Passed:         {}", s.passed);
    println!("  Failed:         {}", s.failed);
    println!("  Errors:         {}", s.errors);
    println!("  Skipped:        {}", s.skipped);
    println!("  Not applicable: {}", s.not_applicable);
    match s.score {
        Some(score) => println!("  Score:          {:.1}%", score * 100.0),
        None => println!("  Score:          n/a"),
    }

    if !s.failed_by_severity.is_empty() {
        println!("\nFailures by severity:");
        for (severity, count) in s.failed_by_severity.iter().rev() {
            println!("  {}: {}", severity, count);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute() {
        assert_eq!(
            parse_attribute("unsuccessful_attempts=5").unwrap(),
            ("unsuccessful_attempts".to_string(), "5".to_string())
        );
        assert_eq!(
            parse_attribute("ldap_ca_cert=/etc/a=b.pem").unwrap().1,
            "/etc/a=b.pem"
        );
        assert!(parse_attribute("novalue").is_err());
        assert!(parse_attribute("=5").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "stigcheck",
            "--controls",
            "controls/rhel7",
            "--concurrency",
            "2",
            "-a",
            "lockout_time=900",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.engine.controls_dir.as_deref(), Some("controls/rhel7"));
        assert_eq!(config.engine.max_concurrent_controls, 2);
        assert_eq!(config.attributes["lockout_time"], "900");
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(
            parse_tag("nist=AC-7 a").unwrap(),
            ("nist".to_string(), Some("AC-7 a".to_string()))
        );
        assert_eq!(parse_tag("cci").unwrap(), ("cci".to_string(), None));
        assert!(parse_tag("=AC-7").is_err());
    }

    fn rhel7_catalog() -> ControlCatalog {
        load_catalog_from_dir(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../../controls/rhel7"
        ))
        .unwrap()
    }

    fn selected_ids(args: &[&str]) -> Vec<String> {
        let args = Args::parse_from(std::iter::once("stigcheck").chain(args.iter().copied()));
        select_controls(&rhel7_catalog(), &args)
            .into_iter()
            .map(|c| c.id)
            .collect()
    }

    #[test]
    fn test_select_controls() {
        assert_eq!(selected_ids(&[]).len(), rhel7_catalog().len());
        assert_eq!(
            selected_ids(&["--control", "V-72137", "--control", "V-71943", "--control", "V-72137"]),
            vec!["V-72137", "V-71943"]
        );
        assert_eq!(
            selected_ids(&["--control", "V-72137", "--min-severity", "high"]),
            Vec::<String>::new()
        );
        assert_eq!(selected_ids(&["--tag", "stig_id=RHEL-07-010320"]), vec!["V-71943"]);
        assert!(selected_ids(&["--tag", "no_such_tag"]).is_empty());
    }

    #[test]
    fn test_filtered_run_keeps_overrides_for_other_controls() {
        let catalog = rhel7_catalog();
        let args = Args::parse_from([
            "stigcheck",
            "--control",
            "V-72137",
            "-a",
            "lockout_time=900",
        ]);
        let controls = select_controls(&catalog, &args);
        let overrides = catalog
            .scope_overrides(&controls, args.attributes.iter().cloned().collect())
            .unwrap();
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer title", 10), "a much ...");
    }
}
