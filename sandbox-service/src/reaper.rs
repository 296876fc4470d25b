//! Reaper: read-only classification of sandboxes due for reclamation.
//!
//! The sweep only identifies and logs candidates so every destructive
//! action stays auditable; stopping or terminating is a separate explicit
//! step taken by an operator or a cleanup job.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{Sandbox, SandboxStatus};
use crate::storage::SandboxRepository;

pub struct Reaper {
    sandboxes: Arc<dyn SandboxRepository>,
}

impl Reaper {
    pub fn new(sandboxes: Arc<dyn SandboxRepository>) -> Self {
        Self { sandboxes }
    }

    /// Past their fixed expiry, whatever their current status. Terminated
    /// sandboxes are excluded: they are already reclaimed.
    pub async fn find_expired_sandboxes(&self) -> shared::Result<Vec<Sandbox>> {
        Ok(self
            .sandboxes
            .list()
            .await?
            .into_iter()
            .filter(|s| s.status != SandboxStatus::Terminated && s.is_expired())
            .collect())
    }

    /// Running with no active sessions for at least `idle_minutes`.
    pub async fn find_idle_sandboxes(&self, idle_minutes: i64) -> shared::Result<Vec<Sandbox>> {
        let cutoff = Utc::now() - Duration::minutes(idle_minutes);
        Ok(self
            .sandboxes
            .list()
            .await?
            .into_iter()
            .filter(|s| s.is_idle() && s.idle_since() <= cutoff)
            .collect())
    }

    /// Running, unhealthy, and over the error threshold.
    pub async fn find_unhealthy_sandboxes(&self) -> shared::Result<Vec<Sandbox>> {
        Ok(self
            .sandboxes
            .list()
            .await?
            .into_iter()
            .filter(|s| s.should_be_restarted())
            .collect())
    }
}

/// Periodic sweep loop; classification results are logged for follow-up.
pub async fn run_sweep_loop(reaper: Reaper, interval_seconds: u64, idle_minutes: i64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
    loop {
        ticker.tick().await;

        match reaper.find_expired_sandboxes().await {
            Ok(expired) if !expired.is_empty() => {
                info!(count = expired.len(), "Sweep found expired sandboxes");
            }
            Err(err) => warn!(error = %err, "Expired sweep failed"),
            _ => {}
        }

        match reaper.find_idle_sandboxes(idle_minutes).await {
            Ok(idle) if !idle.is_empty() => {
                info!(count = idle.len(), idle_minutes, "Sweep found idle sandboxes");
            }
            Err(err) => warn!(error = %err, "Idle sweep failed"),
            _ => {}
        }

        match reaper.find_unhealthy_sandboxes().await {
            Ok(unhealthy) if !unhealthy.is_empty() => {
                info!(count = unhealthy.len(), "Sweep found sandboxes signalling restart");
            }
            Err(err) => warn!(error = %err, "Health sweep failed"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SecurityLevel;
    use crate::models::HealthStatus;
    use crate::policy::SandboxPolicyEngine;
    use crate::storage::InMemorySandboxRepository;
    use uuid::Uuid;

    fn sandbox(ttl: Duration) -> Sandbox {
        let level = SecurityLevel::Medium;
        Sandbox::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            level,
            SandboxPolicyEngine::resource_limits_for(Some(level)),
            SandboxPolicyEngine::network_policy_for(Some(level)),
            "playcade/game-sandbox:latest".to_string(),
            ttl,
        )
    }

    async fn reaper_with(sandboxes: Vec<Sandbox>) -> Reaper {
        let repo = Arc::new(InMemorySandboxRepository::new());
        for sandbox in sandboxes {
            repo.insert(sandbox).await.unwrap();
        }
        Reaper::new(repo)
    }

    #[tokio::test]
    async fn test_expired_sweep_ignores_fresh_and_terminated() {
        let fresh = sandbox(Duration::hours(24));
        let expired = sandbox(Duration::seconds(-10));
        let expired_id = expired.id;
        let mut reclaimed = sandbox(Duration::seconds(-10));
        reclaimed.terminate("already handled").unwrap();

        let reaper = reaper_with(vec![fresh, expired, reclaimed]).await;
        let found = reaper.find_expired_sandboxes().await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, expired_id);
    }

    #[tokio::test]
    async fn test_expired_sweep_includes_stopped_sandboxes() {
        let mut stopped = sandbox(Duration::seconds(-10));
        stopped.start().unwrap();
        stopped.stop().unwrap();

        let reaper = reaper_with(vec![stopped]).await;
        assert_eq!(reaper.find_expired_sandboxes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idle_sweep_respects_sessions_and_duration() {
        // Busy: running with an active session, idle for ages otherwise.
        let mut busy = sandbox(Duration::hours(24));
        busy.start().unwrap();
        busy.record_session_started();
        busy.last_session_at = Some(Utc::now() - Duration::minutes(45));

        // Idle long enough: running, zero sessions, last activity 45m ago.
        let mut idle = sandbox(Duration::hours(24));
        idle.start().unwrap();
        idle.record_session_started();
        idle.record_session_ended();
        idle.last_session_at = Some(Utc::now() - Duration::minutes(45));
        let idle_id = idle.id;

        // Recently active: went quiet five minutes ago.
        let mut recent = sandbox(Duration::hours(24));
        recent.start().unwrap();
        recent.last_session_at = Some(Utc::now() - Duration::minutes(5));

        let reaper = reaper_with(vec![busy, idle, recent]).await;
        let found = reaper.find_idle_sandboxes(30).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, idle_id);
    }

    #[tokio::test]
    async fn test_idle_sweep_excludes_created_and_stopped() {
        let created = sandbox(Duration::hours(24));

        let mut stopped = sandbox(Duration::hours(24));
        stopped.start().unwrap();
        stopped.stop().unwrap();
        stopped.last_session_at = Some(Utc::now() - Duration::hours(2));

        let reaper = reaper_with(vec![created, stopped]).await;
        assert!(reaper.find_idle_sandboxes(30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_sweep_matches_restart_signal() {
        let mut failing = sandbox(Duration::hours(24));
        failing.start().unwrap();
        failing.update_health(HealthStatus::Unhealthy);
        failing.metrics.error_count = 10;
        let failing_id = failing.id;

        // Unhealthy but below the error threshold.
        let mut flaky = sandbox(Duration::hours(24));
        flaky.start().unwrap();
        flaky.update_health(HealthStatus::Unhealthy);
        flaky.metrics.error_count = 3;

        let reaper = reaper_with(vec![failing, flaky]).await;
        let found = reaper.find_unhealthy_sandboxes().await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, failing_id);
    }
}
