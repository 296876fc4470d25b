//! Sandbox status query.

use serde::{Deserialize, Serialize};

use shared::types::SandboxId;

use crate::models::{HealthStatus, SandboxMetrics, SandboxStatus};
use crate::storage::SandboxRepository;

use super::SandboxServices;

#[derive(Debug, Clone, Deserialize)]
pub struct GetSandboxStatusQuery {
    pub sandbox_id: SandboxId,
}

#[derive(Debug, Clone, Serialize)]
pub struct SandboxStatusView {
    pub id: SandboxId,
    pub status: SandboxStatus,
    pub health_status: HealthStatus,
    pub active_session_count: u32,
    pub metrics: SandboxMetrics,
    pub public_url: Option<String>,
}

pub async fn handle(
    services: &SandboxServices,
    query: GetSandboxStatusQuery,
) -> shared::Result<Option<SandboxStatusView>> {
    Ok(services
        .sandboxes
        .get(query.sandbox_id)
        .await?
        .map(|sandbox| SandboxStatusView {
            id: sandbox.id,
            status: sandbox.status,
            health_status: sandbox.health_status,
            active_session_count: sandbox.active_session_count,
            metrics: sandbox.metrics,
            public_url: sandbox.public_url,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{harness, provisioning_runtime, scanned_bundle};
    use crate::handlers::create_sandbox::{self, CreateSandboxCommand};
    use crate::runtime::MockContainerRuntime;
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_missing_sandbox_returns_none() {
        let h = harness(Arc::new(MockContainerRuntime::new()));
        let view = super::handle(
            &h.services,
            GetSandboxStatusQuery {
                sandbox_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap();
        assert!(view.is_none());
    }

    #[tokio::test]
    async fn test_view_reflects_running_sandbox() {
        let h = harness(Arc::new(provisioning_runtime()));
        let game_id = Uuid::new_v4();
        let dir = TempDir::new().unwrap();
        let bundle = scanned_bundle(&h.bundles, game_id, &dir, "const a = 1;\n").await;
        let sandbox_id = create_sandbox::handle(
            &h.services,
            CreateSandboxCommand {
                game_id,
                game_bundle_id: bundle.id,
                security_level: None,
                expires_in_hours: None,
                container_image: None,
            },
        )
        .await
        .unwrap();

        let view = super::handle(&h.services, GetSandboxStatusQuery { sandbox_id })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.id, sandbox_id);
        assert_eq!(view.status, SandboxStatus::Running);
        assert_eq!(view.health_status, HealthStatus::Unknown);
        assert_eq!(view.active_session_count, 0);
        assert!(view.public_url.is_some());
    }
}
