//! Bundle registration: records an uploaded, pre-extracted bundle so the
//! scan pipeline can pick it up. Upload and extraction happen upstream.

use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use shared::types::{BundleId, GameId};
use shared::SandboxError;

use crate::models::GameBundle;
use crate::storage::{BundleRepository, BundleStorage};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterBundleCommand {
    pub game_id: GameId,
    pub bundle_path: PathBuf,
    #[validate(length(min = 1))]
    pub entry_point: String,
}

/// Record a new bundle version in Pending state. File count and total size
/// come from the extracted tree itself.
pub async fn handle(
    bundles: &Arc<dyn BundleRepository>,
    storage: &Arc<dyn BundleStorage>,
    cmd: RegisterBundleCommand,
) -> shared::Result<BundleId> {
    cmd.validate()
        .map_err(|e| SandboxError::Validation(e.to_string()))?;

    let files = storage
        .list_files(&cmd.bundle_path)
        .map_err(|e| SandboxError::Validation(format!("bundle path is not readable: {e}")))?;

    let total_size_bytes = files
        .iter()
        .filter_map(|f| std::fs::metadata(f).ok())
        .map(|m| m.len())
        .sum();

    let bundle = GameBundle::new(
        cmd.game_id,
        cmd.bundle_path,
        cmd.entry_point,
        files.len() as u32,
        total_size_bytes,
    );
    let bundle_id = bundle.id;
    bundles.insert(bundle).await?;

    info!(bundle_id = %bundle_id, game_id = %cmd.game_id, files = files.len(), "Bundle registered");
    Ok(bundle_id)
}
