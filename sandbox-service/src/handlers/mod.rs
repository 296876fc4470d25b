//! Orchestrator command handlers.
//!
//! Each handler sequences repository lookups, policy resolution, and
//! container runtime calls for one exposed command. Handlers never retry;
//! a failed provision surfaces to the caller with the sandbox terminated.

pub mod bundles;
pub mod create_sandbox;
pub mod deploy;
pub mod launch;
pub mod scan;
pub mod status;

use std::sync::Arc;

use crate::config::SandboxSettings;
use crate::runtime::ContainerRuntime;
use crate::storage::{BundleRepository, GameRepository, SandboxRepository};

/// Dependencies shared by the orchestrator handlers, built once at startup
#[derive(Clone)]
pub struct SandboxServices {
    pub bundles: Arc<dyn BundleRepository>,
    pub sandboxes: Arc<dyn SandboxRepository>,
    pub games: Arc<dyn GameRepository>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub settings: SandboxSettings,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;
    use uuid::Uuid;

    use shared::types::GameId;

    use crate::classifier::GameSecurityMetadata;
    use crate::config::SandboxSettings;
    use crate::models::GameBundle;
    use crate::runtime::{ContainerRuntime, MockContainerRuntime, ProvisionedContainer};
    use crate::scanner::ContentScanner;
    use crate::storage::{
        BundleRepository, GameRecord, InMemoryBundleRepository, InMemoryGameRepository,
        InMemorySandboxRepository,
    };

    use super::SandboxServices;

    pub(crate) struct TestHarness {
        pub services: SandboxServices,
        pub bundles: Arc<InMemoryBundleRepository>,
        pub sandboxes: Arc<InMemorySandboxRepository>,
        pub games: Arc<InMemoryGameRepository>,
    }

    pub(crate) fn harness(runtime: Arc<dyn ContainerRuntime>) -> TestHarness {
        let bundles = Arc::new(InMemoryBundleRepository::new());
        let sandboxes = Arc::new(InMemorySandboxRepository::new());
        let games = Arc::new(InMemoryGameRepository::new());
        let services = SandboxServices {
            bundles: bundles.clone(),
            sandboxes: sandboxes.clone(),
            games: games.clone(),
            runtime,
            settings: SandboxSettings::default(),
        };
        TestHarness {
            services,
            bundles,
            sandboxes,
            games,
        }
    }

    /// Runtime mock that provisions successfully any number of times.
    pub(crate) fn provisioning_runtime() -> MockContainerRuntime {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_create_container().returning(|_| {
            Ok(ProvisionedContainer {
                container_id: format!("gsb-{}", Uuid::new_v4()),
                internal_endpoint: "http://gsb.sandbox.internal:8080".to_string(),
            })
        });
        runtime.expect_deploy_to_container().returning(|_, _| Ok(()));
        runtime
    }

    /// Write `content` into the bundle dir, run the real scanner, and store
    /// the resulting bundle. The scan outcome follows the content.
    pub(crate) async fn scanned_bundle(
        bundles: &InMemoryBundleRepository,
        game_id: GameId,
        dir: &TempDir,
        content: &str,
    ) -> GameBundle {
        let path = dir.path().join("main.js");
        std::fs::write(&path, content).unwrap();

        let mut bundle = GameBundle::new(
            game_id,
            dir.path().to_path_buf(),
            "index.html".to_string(),
            1,
            content.len() as u64,
        );
        bundle.mark_scan_in_progress().unwrap();
        bundle.mark_as_scanned(ContentScanner::default().scan(&[path]));
        bundles.insert(bundle.clone()).await.unwrap();
        bundle
    }

    pub(crate) async fn published_game(
        games: &InMemoryGameRepository,
        developer_id: Uuid,
        published: bool,
        version: &str,
    ) -> GameRecord {
        let game = GameRecord {
            id: Uuid::new_v4(),
            title: "Asteroid Run".to_string(),
            developer_id,
            published,
            current_version: version.to_string(),
            allowed_domains: vec!["cdn.jsdelivr.net".to_string()],
            security_metadata: GameSecurityMetadata::default(),
            play_count: 0,
        };
        games.insert_game(game.clone()).await;
        game
    }
}
