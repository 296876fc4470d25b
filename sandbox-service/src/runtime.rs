//! Container runtime collaborator boundary.
//!
//! The actual container backend lives outside this service; everything
//! here is the contract handed to it plus an in-process backend used for
//! development and tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::policy::{ContainerHardening, NetworkPolicy, ResourceLimits};

/// Everything the runtime needs to provision one isolated game container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub resource_limits: ResourceLimits,
    pub network_policy: NetworkPolicy,
    pub hardening: ContainerHardening,
    pub volumes: Vec<VolumeMount>,
    pub environment: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// Handle returned by a successful provision
#[derive(Debug, Clone)]
pub struct ProvisionedContainer {
    pub container_id: String,
    pub internal_endpoint: String,
}

/// Usage snapshot fetched from the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: u64,
    pub network_ingress_bytes: u64,
    pub network_egress_bytes: u64,
    pub error_count: u32,
    pub average_response_time_ms: u64,
    /// Health probe outcome when the backend ran one.
    pub healthy: Option<bool>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_container(&self, spec: ContainerSpec) -> Result<ProvisionedContainer>;
    async fn deploy_to_container(&self, container_id: &str, entry_point: &str) -> Result<()>;
    async fn get_container_metrics(&self, container_id: &str) -> Result<ContainerMetrics>;
    async fn stop_container(&self, container_id: &str) -> Result<()>;
    async fn start_container(&self, container_id: &str) -> Result<()>;
    async fn delete_container(&self, container_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BackendState {
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
struct BackendContainer {
    state: BackendState,
    deployed_entry_point: Option<String>,
}

/// In-process runtime backend. Containers are bookkeeping entries with
/// synthesized endpoints; used where no real backend is wired in.
#[derive(Default)]
pub struct InMemoryRuntime {
    containers: Mutex<HashMap<String, BackendContainer>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn create_container(&self, spec: ContainerSpec) -> Result<ProvisionedContainer> {
        let container_id = format!("gsb-{}", Uuid::new_v4());
        info!(container = %container_id, image = %spec.image, "Creating in-process container");

        let mut containers = self.containers.lock().await;
        containers.insert(
            container_id.clone(),
            BackendContainer {
                state: BackendState::Running,
                deployed_entry_point: None,
            },
        );

        Ok(ProvisionedContainer {
            internal_endpoint: format!("http://{container_id}.sandbox.internal:8080"),
            container_id,
        })
    }

    async fn deploy_to_container(&self, container_id: &str, entry_point: &str) -> Result<()> {
        let mut containers = self.containers.lock().await;
        let container = containers
            .get_mut(container_id)
            .ok_or_else(|| anyhow!("unknown container {container_id}"))?;
        if container.state != BackendState::Running {
            return Err(anyhow!("container {container_id} is not running"));
        }
        container.deployed_entry_point = Some(entry_point.to_string());
        debug!(container = %container_id, entry_point, "Deployed entry point");
        Ok(())
    }

    async fn get_container_metrics(&self, container_id: &str) -> Result<ContainerMetrics> {
        let containers = self.containers.lock().await;
        let container = containers
            .get(container_id)
            .ok_or_else(|| anyhow!("unknown container {container_id}"))?;
        Ok(ContainerMetrics {
            healthy: Some(container.state == BackendState::Running),
            ..ContainerMetrics::default()
        })
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        let mut containers = self.containers.lock().await;
        let container = containers
            .get_mut(container_id)
            .ok_or_else(|| anyhow!("unknown container {container_id}"))?;
        container.state = BackendState::Stopped;
        Ok(())
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        let mut containers = self.containers.lock().await;
        let container = containers
            .get_mut(container_id)
            .ok_or_else(|| anyhow!("unknown container {container_id}"))?;
        container.state = BackendState::Running;
        Ok(())
    }

    async fn delete_container(&self, container_id: &str) -> Result<()> {
        let mut containers = self.containers.lock().await;
        containers
            .remove(container_id)
            .ok_or_else(|| anyhow!("unknown container {container_id}"))?;
        Ok(())
    }
}
