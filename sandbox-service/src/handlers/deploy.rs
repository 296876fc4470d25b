//! Deployment of a scanned bundle's entry point into a running sandbox.

use serde::Deserialize;
use tracing::{error, info, warn};

use shared::types::{BundleId, GameId, SandboxId};
use shared::SandboxError;

use crate::models::SandboxStatus;
use crate::storage::{BundleRepository, SandboxRepository};

use super::{create_sandbox::terminate_quietly, SandboxServices};

#[derive(Debug, Clone, Deserialize)]
pub struct DeploySandboxedGameCommand {
    pub sandbox_id: SandboxId,
    pub game_id: GameId,
    pub game_bundle_id: BundleId,
}

/// Deploy the bundle entry point into the running container, then record
/// the player session. Deploying against a non-running sandbox or unready
/// bundle is a hard synchronous error, never a queued retry.
pub async fn handle(
    services: &SandboxServices,
    cmd: DeploySandboxedGameCommand,
) -> shared::Result<()> {
    let sandbox = services
        .sandboxes
        .get(cmd.sandbox_id)
        .await?
        .ok_or_else(|| SandboxError::NotFound(format!("sandbox {}", cmd.sandbox_id)))?;

    if sandbox.status != SandboxStatus::Running {
        return Err(SandboxError::PolicyViolation(format!(
            "sandbox {} is {:?}, not running",
            sandbox.id, sandbox.status
        )));
    }

    if sandbox.game_id != cmd.game_id || sandbox.game_bundle_id != cmd.game_bundle_id {
        return Err(SandboxError::Validation(format!(
            "sandbox {} does not host bundle {} for game {}",
            sandbox.id, cmd.game_bundle_id, cmd.game_id
        )));
    }

    let bundle = services
        .bundles
        .get(cmd.game_bundle_id)
        .await?
        .ok_or_else(|| SandboxError::NotFound(format!("bundle {}", cmd.game_bundle_id)))?;

    if !bundle.is_ready_for_deployment() {
        return Err(SandboxError::PolicyViolation(format!(
            "bundle {} has not passed scanning (status {:?})",
            bundle.id, bundle.scan_status
        )));
    }

    let container_id = sandbox.container_id.clone().ok_or_else(|| {
        SandboxError::Internal(format!("sandbox {} has no container", sandbox.id))
    })?;

    let deployed = tokio::time::timeout(
        services.settings.deploy_timeout(),
        services
            .runtime
            .deploy_to_container(&container_id, &bundle.entry_point),
    )
    .await;

    match deployed {
        Ok(Ok(())) => {
            // Session accounting goes through the serialized update path; a
            // terminate that raced this deploy surfaces here as a violation
            // instead of counting a session against a dead container.
            services
                .sandboxes
                .update(
                    cmd.sandbox_id,
                    Box::new(|s| {
                        if s.status != SandboxStatus::Running {
                            return Err(SandboxError::PolicyViolation(format!(
                                "sandbox {} is no longer running",
                                s.id
                            )));
                        }
                        s.record_session_started();
                        Ok(())
                    }),
                )
                .await?;
            info!(sandbox_id = %cmd.sandbox_id, entry_point = %bundle.entry_point, "Game deployed");
            Ok(())
        }
        Ok(Err(err)) => {
            error!(sandbox_id = %cmd.sandbox_id, error = %err, "Deployment failed");
            Err(SandboxError::Provisioning(format!(
                "deployment failed: {err}"
            )))
        }
        Err(_) => {
            warn!(sandbox_id = %cmd.sandbox_id, "Deployment timed out");
            let reason = "deployment timed out".to_string();
            terminate_quietly(services, cmd.sandbox_id, &reason).await;
            Err(SandboxError::Timeout(reason))
        }
    }
}
