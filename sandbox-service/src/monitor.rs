//! Periodic metrics and health collection for running sandboxes.
//!
//! A failed probe degrades to "no data": the last known metrics and health
//! stand, so transient fetch errors never trip a false restart signal.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{HealthStatus, SandboxMetrics, SandboxStatus};
use crate::runtime::{ContainerMetrics, ContainerRuntime};
use crate::storage::SandboxRepository;

pub struct SandboxMonitor {
    sandboxes: Arc<dyn SandboxRepository>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl From<ContainerMetrics> for SandboxMetrics {
    fn from(metrics: ContainerMetrics) -> Self {
        Self {
            cpu_usage_percent: metrics.cpu_usage_percent,
            memory_usage_mb: metrics.memory_usage_mb,
            network_ingress_bytes: metrics.network_ingress_bytes,
            network_egress_bytes: metrics.network_egress_bytes,
            error_count: metrics.error_count,
            average_response_time_ms: metrics.average_response_time_ms,
        }
    }
}

impl SandboxMonitor {
    pub fn new(sandboxes: Arc<dyn SandboxRepository>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { sandboxes, runtime }
    }

    /// Poll every running sandbox once. Returns how many were updated.
    pub async fn poll_once(&self) -> shared::Result<usize> {
        let running: Vec<_> = self
            .sandboxes
            .list()
            .await?
            .into_iter()
            .filter(|s| s.status == SandboxStatus::Running)
            .collect();

        let mut updated = 0;
        for sandbox in running {
            let Some(container_id) = sandbox.container_id.clone() else {
                continue;
            };

            match self.runtime.get_container_metrics(&container_id).await {
                Ok(metrics) => {
                    let healthy = metrics.healthy;
                    self.sandboxes
                        .update(
                            sandbox.id,
                            Box::new(move |s| {
                                s.metrics = metrics.into();
                                if let Some(healthy) = healthy {
                                    s.update_health(if healthy {
                                        HealthStatus::Healthy
                                    } else {
                                        HealthStatus::Unhealthy
                                    });
                                }
                                Ok(())
                            }),
                        )
                        .await?;
                    updated += 1;
                }
                Err(err) => {
                    warn!(
                        sandbox_id = %sandbox.id,
                        error = %err,
                        "Metrics fetch failed; keeping last known health"
                    );
                }
            }
        }

        debug!(updated, "Metrics poll complete");
        Ok(updated)
    }
}

/// Periodic polling loop.
pub async fn run_monitor_loop(monitor: SandboxMonitor, interval_seconds: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
    loop {
        ticker.tick().await;
        if let Err(err) = monitor.poll_once().await {
            warn!(error = %err, "Metrics poll failed");
        }
    }
}
