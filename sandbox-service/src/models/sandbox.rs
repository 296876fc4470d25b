use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::types::{BundleId, GameId, SandboxId};
use shared::SandboxError;

use crate::classifier::SecurityLevel;
use crate::policy::{NetworkPolicy, ResourceLimits};

/// Lifecycle state of a provisioned sandbox
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Created,
    Running,
    Stopped,
    /// One-way terminal state.
    Terminated,
}

/// Health as reported by the most recent probe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Runtime usage numbers collected from the container backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxMetrics {
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: u64,
    pub network_ingress_bytes: u64,
    pub network_egress_bytes: u64,
    pub error_count: u32,
    pub average_response_time_ms: u64,
}

/// One isolated runtime instance hosting one bundle for player access.
///
/// State machine: Created -> Running -> Stopped -> Running (restart), and
/// any non-terminal state -> Terminated. Expiry is fixed at creation and
/// never extended, so sandboxes rotate regardless of activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: SandboxId,
    pub game_id: GameId,
    pub game_bundle_id: BundleId,
    pub security_level: SecurityLevel,
    pub resource_limits: ResourceLimits,
    pub network_policy: NetworkPolicy,
    pub container_image: String,
    pub container_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub internal_endpoint: Option<String>,
    pub public_url: Option<String>,
    pub status: SandboxStatus,
    pub health_status: HealthStatus,
    pub health_checked_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<String>,
    pub active_session_count: u32,
    pub last_session_at: Option<DateTime<Utc>>,
    pub metrics: SandboxMetrics,
}

impl Sandbox {
    /// Error-count threshold above which an unhealthy running sandbox
    /// signals for restart.
    const RESTART_ERROR_THRESHOLD: u32 = 5;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        game_id: GameId,
        game_bundle_id: BundleId,
        security_level: SecurityLevel,
        resource_limits: ResourceLimits,
        network_policy: NetworkPolicy,
        container_image: String,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            game_id,
            game_bundle_id,
            security_level,
            resource_limits,
            network_policy,
            container_image,
            container_id: None,
            created_at,
            expires_at: created_at + ttl,
            internal_endpoint: None,
            public_url: None,
            status: SandboxStatus::Created,
            health_status: HealthStatus::Unknown,
            health_checked_at: None,
            started_at: None,
            terminated_at: None,
            termination_reason: None,
            active_session_count: 0,
            last_session_at: None,
            metrics: SandboxMetrics::default(),
        }
    }

    /// Legal only from Created or Stopped.
    pub fn start(&mut self) -> Result<(), SandboxError> {
        match self.status {
            SandboxStatus::Created | SandboxStatus::Stopped => {
                self.status = SandboxStatus::Running;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            other => Err(SandboxError::PolicyViolation(format!(
                "sandbox {} cannot start from {:?}",
                self.id, other
            ))),
        }
    }

    /// Legal only from Running.
    pub fn stop(&mut self) -> Result<(), SandboxError> {
        match self.status {
            SandboxStatus::Running => {
                self.status = SandboxStatus::Stopped;
                Ok(())
            }
            other => Err(SandboxError::PolicyViolation(format!(
                "sandbox {} cannot stop from {:?}",
                self.id, other
            ))),
        }
    }

    /// Legal from any non-terminal state; a second call is rejected so a
    /// termination is recorded exactly once.
    pub fn terminate(&mut self, reason: &str) -> Result<(), SandboxError> {
        if self.status == SandboxStatus::Terminated {
            return Err(SandboxError::PolicyViolation(format!(
                "sandbox {} is already terminated",
                self.id
            )));
        }
        self.status = SandboxStatus::Terminated;
        self.terminated_at = Some(Utc::now());
        self.termination_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn record_session_started(&mut self) {
        self.active_session_count += 1;
        self.last_session_at = Some(Utc::now());
    }

    /// Floored at zero: a stray decrement never drives the count negative.
    pub fn record_session_ended(&mut self) {
        self.active_session_count = self.active_session_count.saturating_sub(1);
        self.last_session_at = Some(Utc::now());
    }

    pub fn is_idle(&self) -> bool {
        self.status == SandboxStatus::Running && self.active_session_count == 0
    }

    /// Instant the sandbox last saw session activity, for idle sweeps.
    pub fn idle_since(&self) -> DateTime<Utc> {
        self.last_session_at
            .or(self.started_at)
            .unwrap_or(self.created_at)
    }

    pub fn update_health(&mut self, status: HealthStatus) {
        self.health_status = status;
        self.health_checked_at = Some(Utc::now());
    }

    /// Declarative restart signal; the invoking component decides whether
    /// to act on it.
    pub fn should_be_restarted(&self) -> bool {
        self.status == SandboxStatus::Running
            && self.health_status == HealthStatus::Unhealthy
            && self.metrics.error_count > Self::RESTART_ERROR_THRESHOLD
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
