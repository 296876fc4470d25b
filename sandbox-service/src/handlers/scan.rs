//! Asynchronous bundle scan pipeline.
//!
//! Runs on a spawned task so registration requests never block on
//! scanning. Single-file read errors degrade inside the scanner; only a
//! batch-wide enumeration failure fails the scan itself.

use std::sync::Arc;
use tracing::{error, info};

use shared::types::BundleId;
use shared::SandboxError;

use crate::classifier::SecurityLevelClassifier;
use crate::models::{GameBundle, ScanReport};
use crate::scanner::ContentScanner;
use crate::storage::{BundleRepository, BundleStorage};

pub struct ScanBundleWorker {
    bundles: Arc<dyn BundleRepository>,
    storage: Arc<dyn BundleStorage>,
    scanner: ContentScanner,
}

impl ScanBundleWorker {
    pub fn new(
        bundles: Arc<dyn BundleRepository>,
        storage: Arc<dyn BundleStorage>,
        scanner: ContentScanner,
    ) -> Self {
        Self {
            bundles,
            storage,
            scanner,
        }
    }

    /// Scan one bundle end to end: Pending -> InProgress -> {Passed,
    /// Failed}, with the derived security level recorded alongside.
    pub async fn run(&self, bundle_id: BundleId) -> shared::Result<GameBundle> {
        let bundle = self
            .bundles
            .get(bundle_id)
            .await?
            .ok_or_else(|| SandboxError::NotFound(format!("bundle {bundle_id}")))?;

        self.bundles
            .update(bundle_id, Box::new(|b| b.mark_scan_in_progress()))
            .await?;

        let report = match self.storage.list_files(&bundle.bundle_path) {
            Ok(files) => self.scanner.scan(&files),
            Err(err) => {
                error!(bundle_id = %bundle_id, error = %err, "Bundle enumeration failed; scan aborted");
                let report = ScanReport::aborted(&err.to_string());
                self.finish(bundle_id, report).await?;
                return Err(SandboxError::Scan(format!(
                    "bundle {bundle_id} could not be enumerated"
                )));
            }
        };

        let updated = self.finish(bundle_id, report).await?;
        info!(
            bundle_id = %bundle_id,
            status = ?updated.scan_status,
            threat_level = ?updated.scan_report.as_ref().map(|r| r.threat_level),
            security_level = ?updated.security_level,
            "Bundle scan complete"
        );
        Ok(updated)
    }

    async fn finish(&self, bundle_id: BundleId, report: ScanReport) -> shared::Result<GameBundle> {
        let scan_level = SecurityLevelClassifier::from_scan_report(&report);
        self.bundles
            .update(
                bundle_id,
                Box::new(move |b| {
                    // Scan information may only escalate an existing level.
                    b.security_level =
                        SecurityLevelClassifier::combine(b.security_level, Some(scan_level));
                    b.mark_as_scanned(report);
                    Ok(())
                }),
            )
            .await
    }
}
