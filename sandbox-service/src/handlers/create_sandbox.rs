//! Sandbox creation: bundle gating, policy resolution, provisioning.

use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use validator::Validate;

use shared::types::{BundleId, GameId, SandboxId};
use shared::SandboxError;

use crate::classifier::{SecurityLevel, SecurityLevelClassifier};
use crate::models::Sandbox;
use crate::policy::SandboxPolicyEngine;
use crate::runtime::{ContainerSpec, VolumeMount};
use crate::storage::{BundleRepository, SandboxRepository};

use super::SandboxServices;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSandboxCommand {
    pub game_id: GameId,
    pub game_bundle_id: BundleId,
    pub security_level: Option<SecurityLevel>,
    #[validate(range(min = 1, max = 168))]
    pub expires_in_hours: Option<i64>,
    pub container_image: Option<String>,
}

/// Create (or reuse) a sandbox for a scan-passed bundle and provision its
/// container. On provisioning failure or timeout the sandbox is terminated
/// with the cause recorded, then the error is re-raised.
pub async fn handle(
    services: &SandboxServices,
    cmd: CreateSandboxCommand,
) -> shared::Result<SandboxId> {
    cmd.validate()
        .map_err(|e| SandboxError::Validation(e.to_string()))?;

    let bundle = services
        .bundles
        .get(cmd.game_bundle_id)
        .await?
        .ok_or_else(|| SandboxError::NotFound(format!("bundle {}", cmd.game_bundle_id)))?;

    if bundle.game_id != cmd.game_id {
        return Err(SandboxError::Validation(format!(
            "bundle {} does not belong to game {}",
            bundle.id, cmd.game_id
        )));
    }

    if !bundle.is_ready_for_deployment() {
        return Err(SandboxError::PolicyViolation(format!(
            "bundle {} has not passed scanning (status {:?})",
            bundle.id, bundle.scan_status
        )));
    }

    // Reuse before provisioning so concurrent launches of the same bundle
    // do not race into a second container.
    if let Some(existing) = services
        .sandboxes
        .find_active_for_bundle(cmd.game_id, cmd.game_bundle_id)
        .await?
    {
        debug!(sandbox_id = %existing.id, "Reusing active sandbox for bundle");
        return Ok(existing.id);
    }

    let level = SecurityLevelClassifier::combine(cmd.security_level, bundle.security_level);
    let limits = SandboxPolicyEngine::resource_limits_for(level);
    let network = SandboxPolicyEngine::network_policy_for(level);
    let hardening = SandboxPolicyEngine::container_config_for(level);

    let ttl = Duration::hours(cmd.expires_in_hours.unwrap_or(services.settings.ttl_hours));
    let image = cmd
        .container_image
        .unwrap_or_else(|| services.settings.container_image.clone());

    let sandbox = Sandbox::new(
        cmd.game_id,
        cmd.game_bundle_id,
        level.unwrap_or(SecurityLevel::High),
        limits,
        network.clone(),
        image.clone(),
        ttl,
    );
    let sandbox_id = sandbox.id;
    services.sandboxes.insert(sandbox).await?;

    let spec = ContainerSpec {
        name: format!("game-sandbox-{sandbox_id}"),
        image,
        resource_limits: limits,
        network_policy: network,
        hardening,
        volumes: vec![VolumeMount {
            host_path: bundle.bundle_path.display().to_string(),
            container_path: "/srv/game".to_string(),
            read_only: true,
        }],
        environment: HashMap::from([
            ("GAME_ID".to_string(), cmd.game_id.to_string()),
            ("BUNDLE_ID".to_string(), cmd.game_bundle_id.to_string()),
        ]),
    };

    let provisioned = tokio::time::timeout(
        services.settings.provision_timeout(),
        services.runtime.create_container(spec),
    )
    .await;

    match provisioned {
        Ok(Ok(container)) => {
            let public_url = format!(
                "{}/play/{}",
                services.settings.public_url_base.trim_end_matches('/'),
                sandbox_id
            );
            services
                .sandboxes
                .update(
                    sandbox_id,
                    Box::new(move |s| {
                        s.start()?;
                        s.container_id = Some(container.container_id);
                        s.internal_endpoint = Some(container.internal_endpoint);
                        s.public_url = Some(public_url);
                        Ok(())
                    }),
                )
                .await?;
            info!(sandbox_id = %sandbox_id, "Sandbox provisioned and started");
            Ok(sandbox_id)
        }
        Ok(Err(err)) => {
            error!(sandbox_id = %sandbox_id, error = %err, "Container provisioning failed");
            let reason = format!("provisioning failed: {err}");
            terminate_quietly(services, sandbox_id, &reason).await;
            Err(SandboxError::Provisioning(reason))
        }
        Err(_) => {
            warn!(sandbox_id = %sandbox_id, "Container provisioning timed out");
            let reason = "provisioning timed out".to_string();
            terminate_quietly(services, sandbox_id, &reason).await;
            Err(SandboxError::Timeout(reason))
        }
    }
}

/// Terminate on the failure path; an already-terminated sandbox only logs.
pub(super) async fn terminate_quietly(
    services: &SandboxServices,
    sandbox_id: SandboxId,
    reason: &str,
) {
    let reason = reason.to_string();
    if let Err(err) = services
        .sandboxes
        .update(sandbox_id, Box::new(move |s| s.terminate(&reason)))
        .await
    {
        warn!(sandbox_id = %sandbox_id, error = %err, "Could not record termination");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{harness, provisioning_runtime, scanned_bundle};
    use crate::models::{GameBundle, SandboxStatus, ScanStatus};
    use crate::runtime::{
        ContainerMetrics, ContainerRuntime, MockContainerRuntime, ProvisionedContainer,
    };
    use crate::scanner::ContentScanner;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn command(game_id: GameId, bundle_id: BundleId) -> CreateSandboxCommand {
        CreateSandboxCommand {
            game_id,
            game_bundle_id: bundle_id,
            security_level: None,
            expires_in_hours: None,
            container_image: None,
        }
    }

    #[tokio::test]
    async fn test_create_against_failed_bundle_persists_nothing() {
        // A scan-failed bundle must raise PolicyViolation with no record.
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_create_container().never();
        let h = harness(Arc::new(runtime));

        let game_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();
        let bundle = scanned_bundle(
            &h.bundles,
            game_id,
            &dir,
            "document.domain = 'anything';\n",
        )
        .await;
        assert_eq!(bundle.scan_status, ScanStatus::Failed);

        let result = super::handle(&h.services, command(game_id, bundle.id)).await;
        assert!(matches!(result, Err(SandboxError::PolicyViolation(_))));
        assert!(h.sandboxes.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_against_missing_bundle_is_not_found() {
        let h = harness(Arc::new(MockContainerRuntime::new()));
        let result = super::handle(&h.services, command(Uuid::new_v4(), Uuid::new_v4())).await;
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_successful_create_starts_the_sandbox() {
        let h = harness(Arc::new(provisioning_runtime()));
        let game_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();
        let bundle = scanned_bundle(&h.bundles, game_id, &dir, "const score = 1;\n").await;

        let sandbox_id = super::handle(&h.services, command(game_id, bundle.id))
            .await
            .unwrap();

        let sandbox = h.sandboxes.get(sandbox_id).await.unwrap().unwrap();
        assert_eq!(sandbox.status, SandboxStatus::Running);
        assert!(sandbox.container_id.is_some());
        assert!(sandbox.internal_endpoint.is_some());
        assert!(sandbox
            .public_url
            .as_deref()
            .unwrap()
            .ends_with(&format!("/play/{sandbox_id}")));
    }

    #[tokio::test]
    async fn test_missing_level_resolves_restrictive_defaults() {
        let h = harness(Arc::new(provisioning_runtime()));
        let game_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();
        let mut bundle = GameBundle::new(
            game_id,
            dir.path().to_path_buf(),
            "index.html".to_string(),
            0,
            0,
        );
        bundle.mark_scan_in_progress().unwrap();
        bundle.mark_as_scanned(ContentScanner::default().scan(&[]));
        bundle.security_level = None;
        h.bundles.insert(bundle.clone()).await.unwrap();

        let sandbox_id = super::handle(&h.services, command(game_id, bundle.id))
            .await
            .unwrap();
        let sandbox = h.sandboxes.get(sandbox_id).await.unwrap().unwrap();
        assert_eq!(sandbox.security_level, SecurityLevel::High);
        assert_eq!(sandbox.resource_limits.cpu_millicores, 200);
        assert!(!sandbox.network_policy.allow_outbound);
    }

    #[tokio::test]
    async fn test_repeated_create_reuses_existing_sandbox() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_create_container().times(1).returning(|_| {
            Ok(ProvisionedContainer {
                container_id: "gsb-one".to_string(),
                internal_endpoint: "http://gsb-one.internal:8080".to_string(),
            })
        });
        let h = harness(Arc::new(runtime));
        let game_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();
        let bundle = scanned_bundle(&h.bundles, game_id, &dir, "const a = 1;\n").await;

        let first = super::handle(&h.services, command(game_id, bundle.id))
            .await
            .unwrap();
        let second = super::handle(&h.services, command(game_id, bundle.id))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(h.sandboxes.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_provisioning_failure_terminates_and_reraises() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_create_container()
            .returning(|_| Err(anyhow!("image pull failed")));
        let h = harness(Arc::new(runtime));
        let game_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();
        let bundle = scanned_bundle(&h.bundles, game_id, &dir, "const a = 1;\n").await;

        let result = super::handle(&h.services, command(game_id, bundle.id)).await;
        assert!(matches!(result, Err(SandboxError::Provisioning(_))));

        let all = h.sandboxes.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, SandboxStatus::Terminated);
        assert!(all[0]
            .termination_reason
            .as_deref()
            .unwrap()
            .contains("image pull failed"));
    }

    struct HangingRuntime;

    #[async_trait]
    impl ContainerRuntime for HangingRuntime {
        async fn create_container(
            &self,
            _spec: ContainerSpec,
        ) -> anyhow::Result<ProvisionedContainer> {
            std::future::pending().await
        }
        async fn deploy_to_container(&self, _id: &str, _entry: &str) -> anyhow::Result<()> {
            std::future::pending().await
        }
        async fn get_container_metrics(&self, _id: &str) -> anyhow::Result<ContainerMetrics> {
            std::future::pending().await
        }
        async fn stop_container(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn start_container(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_container(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_provisioning_timeout_terminates_with_timeout_reason() {
        let mut h = harness(Arc::new(HangingRuntime));
        h.services.settings.provision_timeout_seconds = 0;
        let game_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();
        let bundle = scanned_bundle(&h.bundles, game_id, &dir, "const a = 1;\n").await;

        let result = super::handle(&h.services, command(game_id, bundle.id)).await;
        assert!(matches!(result, Err(SandboxError::Timeout(_))));

        let all = h.sandboxes.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, SandboxStatus::Terminated);
        assert!(all[0]
            .termination_reason
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_expiry_hours_out_of_range_is_rejected() {
        let h = harness(Arc::new(MockContainerRuntime::new()));
        let mut cmd = command(Uuid::new_v4(), Uuid::new_v4());
        cmd.expires_in_hours = Some(0);

        let result = super::handle(&h.services, cmd).await;
        assert!(matches!(result, Err(SandboxError::Validation(_))));
        assert!(h.sandboxes.list().await.unwrap().is_empty());
    }
}
