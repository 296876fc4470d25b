use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scan-derived classification of a bundle's static risk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Severity attached to a single finding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// One rule match against one location in a bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: FindingSeverity,
    pub description: String,
    pub location: Option<String>,
}

/// Aggregated outcome of statically scanning one bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub passed: bool,
    pub threat_level: ThreatLevel,
    pub findings: Vec<Finding>,
    pub third_party_libraries: BTreeSet<String>,
    pub suspicious_code_found: bool,
    /// Every match is recorded, duplicates included.
    pub malicious_urls: Vec<String>,
    pub scanned_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn count_by_severity(&self, severity: FindingSeverity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Report for a scan that could not run at all (batch-wide enumeration
    /// failure). Fail-safe: the bundle stays undeployable.
    pub fn aborted(reason: &str) -> Self {
        Self {
            passed: false,
            threat_level: ThreatLevel::Critical,
            findings: vec![Finding {
                rule: "Scan Aborted".to_string(),
                severity: FindingSeverity::Critical,
                description: format!("bundle could not be enumerated: {reason}"),
                location: None,
            }],
            third_party_libraries: BTreeSet::new(),
            suspicious_code_found: false,
            malicious_urls: Vec::new(),
            scanned_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threat_level_ordering() {
        assert!(ThreatLevel::None < ThreatLevel::Low);
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn test_aborted_report_is_not_deployable() {
        let report = ScanReport::aborted("permission denied");
        assert!(!report.passed);
        assert_eq!(report.threat_level, ThreatLevel::Critical);
        assert_eq!(report.count_by_severity(FindingSeverity::Critical), 1);
    }
}
