use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use shared::types::{BundleId, GameId};
use shared::SandboxError;

use crate::classifier::SecurityLevel;

use super::scan_report::ScanReport;

/// Status of the one-shot static scan for a bundle version
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Passed,
    Failed,
}

/// One uploaded, versioned bundle of game files.
///
/// A bundle is scanned exactly once. A re-scan creates a new versioned
/// bundle rather than mutating this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameBundle {
    pub id: BundleId,
    pub game_id: GameId,
    pub bundle_path: PathBuf,
    pub entry_point: String,
    pub file_count: u32,
    pub total_size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub security_level: Option<SecurityLevel>,
    pub scan_status: ScanStatus,
    pub scan_report: Option<ScanReport>,
}

impl GameBundle {
    pub fn new(
        game_id: GameId,
        bundle_path: PathBuf,
        entry_point: String,
        file_count: u32,
        total_size_bytes: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            bundle_path,
            entry_point,
            file_count,
            total_size_bytes,
            uploaded_at: Utc::now(),
            security_level: None,
            scan_status: ScanStatus::Pending,
            scan_report: None,
        }
    }

    /// Move the bundle into the scanning pipeline. Legal only from Pending:
    /// the Pending -> InProgress -> {Passed, Failed} path runs once per
    /// bundle instance.
    pub fn mark_scan_in_progress(&mut self) -> Result<(), SandboxError> {
        if self.scan_status != ScanStatus::Pending {
            return Err(SandboxError::PolicyViolation(format!(
                "bundle {} has already entered scanning (status {:?})",
                self.id, self.scan_status
            )));
        }
        self.scan_status = ScanStatus::InProgress;
        Ok(())
    }

    /// Record the scan outcome. A second invocation overwrites the prior
    /// report rather than merging with it.
    pub fn mark_as_scanned(&mut self, report: ScanReport) {
        self.scan_status = if report.passed {
            ScanStatus::Passed
        } else {
            ScanStatus::Failed
        };
        self.scan_report = Some(report);
    }

    /// Deployment gate: only a bundle whose scan passed may be served.
    pub fn is_ready_for_deployment(&self) -> bool {
        self.scan_status == ScanStatus::Passed
    }
}
