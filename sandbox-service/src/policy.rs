//! Policy resolution from security level to sandbox constraints.
//!
//! Pure lookup tables with no I/O. A missing level never relaxes a policy:
//! absence maps to the High tier, the restrictive fail-safe default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::classifier::SecurityLevel;

/// Immutable per-sandbox compute allowance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu_millicores: u32,
    pub memory_mb: u32,
    pub storage_mb: u32,
}

/// Immutable network constraints handed to the container runtime.
///
/// This is a specification, not an enforcement mechanism: the runtime is
/// responsible for realizing it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkPolicy {
    pub allow_inbound: bool,
    pub allow_outbound: bool,
    pub allowed_outbound_hosts: BTreeSet<String>,
    pub exposed_ports: BTreeSet<u16>,
}

/// Container hardening flags applied at provisioning time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerHardening {
    pub read_only_rootfs: bool,
    pub drop_all_capabilities: bool,
    pub allow_privilege_escalation: bool,
    pub run_as_non_root: bool,
    pub seccomp_profile: String,
    pub no_new_privileges: bool,
    pub restrict_syscalls: bool,
}

pub struct SandboxPolicyEngine;

impl SandboxPolicyEngine {
    /// Fixed table, strictly non-increasing per dimension as the level
    /// rises. `None` maps to the High tier.
    pub fn resource_limits_for(level: Option<SecurityLevel>) -> ResourceLimits {
        match level.unwrap_or(SecurityLevel::High) {
            SecurityLevel::Low => ResourceLimits {
                cpu_millicores: 500,
                memory_mb: 256,
                storage_mb: 1024,
            },
            SecurityLevel::Medium => ResourceLimits {
                cpu_millicores: 300,
                memory_mb: 128,
                storage_mb: 512,
            },
            SecurityLevel::High => ResourceLimits {
                cpu_millicores: 200,
                memory_mb: 64,
                storage_mb: 256,
            },
            SecurityLevel::Maximum => ResourceLimits {
                cpu_millicores: 100,
                memory_mb: 32,
                storage_mb: 128,
            },
        }
    }

    /// Base posture denies all traffic and exposes only port 80; lower
    /// levels win back outbound access against a shrinking host allowlist.
    /// High retains a one-host allowlist while outbound stays blocked.
    pub fn network_policy_for(level: Option<SecurityLevel>) -> NetworkPolicy {
        let mut policy = NetworkPolicy {
            allow_inbound: false,
            allow_outbound: false,
            allowed_outbound_hosts: BTreeSet::new(),
            exposed_ports: BTreeSet::from([80]),
        };

        match level.unwrap_or(SecurityLevel::High) {
            SecurityLevel::Low => {
                policy.allow_outbound = true;
                policy.allowed_outbound_hosts = host_set(&[
                    "cdn.jsdelivr.net",
                    "cdnjs.cloudflare.com",
                    "unpkg.com",
                    "fonts.googleapis.com",
                ]);
            }
            SecurityLevel::Medium => {
                policy.allow_outbound = true;
                policy.allowed_outbound_hosts =
                    host_set(&["cdn.jsdelivr.net", "cdnjs.cloudflare.com"]);
            }
            SecurityLevel::High => {
                policy.allowed_outbound_hosts = host_set(&["cdn.jsdelivr.net"]);
            }
            SecurityLevel::Maximum => {}
        }

        policy
    }

    /// Baseline hardening applies at every level; High and Maximum also set
    /// no_new_privileges and restrict_syscalls.
    pub fn container_config_for(level: Option<SecurityLevel>) -> ContainerHardening {
        let level = level.unwrap_or(SecurityLevel::High);
        let tightened = matches!(level, SecurityLevel::High | SecurityLevel::Maximum);

        ContainerHardening {
            read_only_rootfs: true,
            drop_all_capabilities: true,
            allow_privilege_escalation: false,
            run_as_non_root: true,
            seccomp_profile: "restricted".to_string(),
            no_new_privileges: tightened,
            restrict_syscalls: tightened,
        }
    }
}

fn host_set(hosts: &[&str]) -> BTreeSet<String> {
    hosts.iter().map(|h| h.to_string()).collect()
}
