//! Security level classification for submitted games.
//!
//! Two independent signal sources feed the level: submission metadata
//! (available before any scan) and the static scan report. When both
//! exist, the stricter level wins; later information may only escalate.

use serde::{Deserialize, Serialize};

use crate::models::ScanReport;

/// Ordinal isolation classification driving policy restrictiveness
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
    Maximum,
}

impl SecurityLevel {
    /// Escalation helper: the stricter of the two levels.
    pub fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }
}

/// Submission metadata signals available before a scan has run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GameSecurityMetadata {
    pub has_server_side_code: bool,
    pub has_external_apis: bool,
}

pub struct SecurityLevelClassifier;

impl SecurityLevelClassifier {
    /// Server-side code is the stronger signal and is checked first, so a
    /// submission flagging both server-side code and external APIs
    /// classifies Maximum rather than High.
    pub fn from_game_metadata(meta: &GameSecurityMetadata) -> SecurityLevel {
        if meta.has_server_side_code {
            SecurityLevel::Maximum
        } else if meta.has_external_apis {
            SecurityLevel::High
        } else {
            SecurityLevel::Medium
        }
    }

    pub fn from_scan_report(report: &ScanReport) -> SecurityLevel {
        if report.suspicious_code_found {
            SecurityLevel::Maximum
        } else if report.third_party_libraries.len() > 5 {
            SecurityLevel::High
        } else {
            SecurityLevel::Medium
        }
    }

    /// Combine independently derived levels: max of ordinals when both are
    /// present, the known one when only one is.
    pub fn combine(
        a: Option<SecurityLevel>,
        b: Option<SecurityLevel>,
    ) -> Option<SecurityLevel> {
        match (a, b) {
            (Some(x), Some(y)) => Some(x.max(y)),
            (Some(x), None) | (None, Some(x)) => Some(x),
            (None, None) => None,
        }
    }
}
