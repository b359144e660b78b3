//! Severity levels and their numeric impact weights

use serde::{Deserialize, Serialize};

/// Severity of a control, the categorical view of its impact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Zero impact; informational or not applicable
    #[default]
    None,
    /// Low severity (CAT III)
    Low,
    /// Medium severity (CAT II)
    Medium,
    /// High severity (CAT I)
    High,
    /// Critical severity
    Critical,
}

impl Severity {
    /// Map a numeric impact to its severity band
    pub fn from_impact(impact: f64) -> Self {
        match impact {
            i if i >= 0.9 => Severity::Critical,
            i if i >= 0.7 => Severity::High,
            i if i >= 0.4 => Severity::Medium,
            i if i >= 0.01 => Severity::Low,
            _ => Severity::None,
        }
    }

    /// Canonical impact weight for this severity
    pub fn impact(&self) -> f64 {
        match self {
            Severity::None => 0.0,
            Severity::Low => 0.3,
            Severity::Medium => 0.5,
            Severity::High => 0.7,
            Severity::Critical => 1.0,
        }
    }

    /// Get display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "info" => Ok(Severity::None),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_to_severity() {
        assert_eq!(Severity::from_impact(1.0), Severity::Critical);
        assert_eq!(Severity::from_impact(0.7), Severity::High);
        assert_eq!(Severity::from_impact(0.5), Severity::Medium);
        assert_eq!(Severity::from_impact(0.3), Severity::Low);
        assert_eq!(Severity::from_impact(0.0), Severity::None);
    }

    #[test]
    fn test_canonical_impact_round_trips() {
        for severity in [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ] {
            assert_eq!(Severity::from_impact(severity.impact()), severity);
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::None);
    }
}
