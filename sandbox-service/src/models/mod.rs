pub mod game_bundle;
pub mod sandbox;
pub mod scan_report;

pub use game_bundle::{GameBundle, ScanStatus};
pub use sandbox::{HealthStatus, Sandbox, SandboxMetrics, SandboxStatus};
pub use scan_report::{Finding, FindingSeverity, ScanReport, ThreatLevel};
