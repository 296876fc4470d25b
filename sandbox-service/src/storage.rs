//! Repositories and bundle file storage.
//!
//! Every entity transition goes through a repository `update` closure, so
//! writes are serialized per entity map and callers never race a
//! read-modify-write. The marketplace's durable stores sit behind these
//! traits; the in-memory implementations back tests and single-node runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use shared::types::{BundleId, GameId, SandboxId, UserId};
use shared::SandboxError;

use crate::classifier::GameSecurityMetadata;
use crate::models::{GameBundle, Sandbox, SandboxStatus};

pub type BundleMutation = Box<dyn FnOnce(&mut GameBundle) -> Result<(), SandboxError> + Send>;
pub type SandboxMutation = Box<dyn FnOnce(&mut Sandbox) -> Result<(), SandboxError> + Send>;

#[async_trait]
pub trait BundleRepository: Send + Sync {
    async fn insert(&self, bundle: GameBundle) -> shared::Result<()>;
    async fn get(&self, id: BundleId) -> shared::Result<Option<GameBundle>>;
    /// Apply a mutation under the write lock and return the updated record.
    async fn update(&self, id: BundleId, mutation: BundleMutation) -> shared::Result<GameBundle>;
}

#[async_trait]
pub trait SandboxRepository: Send + Sync {
    async fn insert(&self, sandbox: Sandbox) -> shared::Result<()>;
    async fn get(&self, id: SandboxId) -> shared::Result<Option<Sandbox>>;
    async fn list(&self) -> shared::Result<Vec<Sandbox>>;
    /// A Created or Running sandbox for this bundle, if one exists. Used to
    /// reuse instead of double-provisioning on concurrent launches.
    async fn find_active_for_bundle(
        &self,
        game_id: GameId,
        bundle_id: BundleId,
    ) -> shared::Result<Option<Sandbox>>;
    async fn update(&self, id: SandboxId, mutation: SandboxMutation) -> shared::Result<Sandbox>;
}

/// Catalog record for a published (or in-review) game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub title: String,
    pub developer_id: UserId,
    pub published: bool,
    pub current_version: String,
    pub allowed_domains: Vec<String>,
    pub security_metadata: GameSecurityMetadata,
    pub play_count: u64,
}

/// Read-mostly view of the marketplace catalog owned elsewhere
#[async_trait]
pub trait GameRepository: Send + Sync {
    async fn get_by_id(&self, id: GameId) -> shared::Result<Option<GameRecord>>;
    async fn has_version(&self, id: GameId, version: &str) -> shared::Result<bool>;
    async fn bundle_for_version(
        &self,
        id: GameId,
        version: &str,
    ) -> shared::Result<Option<BundleId>>;
    async fn record_play(&self, id: GameId) -> shared::Result<()>;
}

/// Pre-extracted bundle file access; extraction itself happens upstream
pub trait BundleStorage: Send + Sync {
    /// Enumerate every file under the bundle path. A failure here is fatal
    /// to a scan of that bundle.
    fn list_files(&self, bundle_path: &Path) -> anyhow::Result<Vec<PathBuf>>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryBundleRepository {
    bundles: RwLock<HashMap<BundleId, GameBundle>>,
}

impl InMemoryBundleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BundleRepository for InMemoryBundleRepository {
    async fn insert(&self, bundle: GameBundle) -> shared::Result<()> {
        self.bundles.write().await.insert(bundle.id, bundle);
        Ok(())
    }

    async fn get(&self, id: BundleId) -> shared::Result<Option<GameBundle>> {
        Ok(self.bundles.read().await.get(&id).cloned())
    }

    async fn update(&self, id: BundleId, mutation: BundleMutation) -> shared::Result<GameBundle> {
        let mut bundles = self.bundles.write().await;
        let bundle = bundles
            .get_mut(&id)
            .ok_or_else(|| SandboxError::NotFound(format!("bundle {id}")))?;
        mutation(bundle)?;
        Ok(bundle.clone())
    }
}

#[derive(Default)]
pub struct InMemorySandboxRepository {
    sandboxes: RwLock<HashMap<SandboxId, Sandbox>>,
}

impl InMemorySandboxRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SandboxRepository for InMemorySandboxRepository {
    async fn insert(&self, sandbox: Sandbox) -> shared::Result<()> {
        self.sandboxes.write().await.insert(sandbox.id, sandbox);
        Ok(())
    }

    async fn get(&self, id: SandboxId) -> shared::Result<Option<Sandbox>> {
        Ok(self.sandboxes.read().await.get(&id).cloned())
    }

    async fn list(&self) -> shared::Result<Vec<Sandbox>> {
        Ok(self.sandboxes.read().await.values().cloned().collect())
    }

    async fn find_active_for_bundle(
        &self,
        game_id: GameId,
        bundle_id: BundleId,
    ) -> shared::Result<Option<Sandbox>> {
        Ok(self
            .sandboxes
            .read()
            .await
            .values()
            .find(|s| {
                s.game_id == game_id
                    && s.game_bundle_id == bundle_id
                    && matches!(s.status, SandboxStatus::Created | SandboxStatus::Running)
            })
            .cloned())
    }

    async fn update(&self, id: SandboxId, mutation: SandboxMutation) -> shared::Result<Sandbox> {
        let mut sandboxes = self.sandboxes.write().await;
        let sandbox = sandboxes
            .get_mut(&id)
            .ok_or_else(|| SandboxError::NotFound(format!("sandbox {id}")))?;
        mutation(sandbox)?;
        Ok(sandbox.clone())
    }
}

#[derive(Default)]
pub struct InMemoryGameRepository {
    games: RwLock<HashMap<GameId, GameRecord>>,
    bundles_by_version: RwLock<HashMap<(GameId, String), BundleId>>,
}

impl InMemoryGameRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_game(&self, game: GameRecord) {
        self.games.write().await.insert(game.id, game);
    }

    pub async fn register_bundle(&self, game_id: GameId, version: &str, bundle_id: BundleId) {
        self.bundles_by_version
            .write()
            .await
            .insert((game_id, version.to_string()), bundle_id);
    }
}

#[async_trait]
impl GameRepository for InMemoryGameRepository {
    async fn get_by_id(&self, id: GameId) -> shared::Result<Option<GameRecord>> {
        Ok(self.games.read().await.get(&id).cloned())
    }

    async fn has_version(&self, id: GameId, version: &str) -> shared::Result<bool> {
        Ok(self
            .bundles_by_version
            .read()
            .await
            .contains_key(&(id, version.to_string())))
    }

    async fn bundle_for_version(
        &self,
        id: GameId,
        version: &str,
    ) -> shared::Result<Option<BundleId>> {
        Ok(self
            .bundles_by_version
            .read()
            .await
            .get(&(id, version.to_string()))
            .copied())
    }

    async fn record_play(&self, id: GameId) -> shared::Result<()> {
        let mut games = self.games.write().await;
        let game = games
            .get_mut(&id)
            .ok_or_else(|| SandboxError::NotFound(format!("game {id}")))?;
        game.play_count += 1;
        Ok(())
    }
}

/// Bundle files on the local filesystem
pub struct LocalBundleStorage;

impl BundleStorage for LocalBundleStorage {
    fn list_files(&self, bundle_path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_files(bundle_path, &mut files)?;
        // Stable ordering keeps scan output deterministic.
        files.sort();
        Ok(files)
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SecurityLevel;
    use crate::policy::SandboxPolicyEngine;
    use chrono::Duration;
    use std::fs::File;
    use std::io::Write as _;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sandbox(game_id: GameId, bundle_id: BundleId) -> Sandbox {
        let level = SecurityLevel::Medium;
        Sandbox::new(
            game_id,
            bundle_id,
            level,
            SandboxPolicyEngine::resource_limits_for(Some(level)),
            SandboxPolicyEngine::network_policy_for(Some(level)),
            "playcade/game-sandbox:latest".to_string(),
            Duration::hours(24),
        )
    }

    #[tokio::test]
    async fn test_update_on_missing_sandbox_is_not_found() {
        let repo = InMemorySandboxRepository::new();
        let result = repo.update(Uuid::new_v4(), Box::new(|_| Ok(()))).await;
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mutation_failure_leaves_record_intact() {
        let repo = InMemorySandboxRepository::new();
        let sandbox = sandbox(Uuid::new_v4(), Uuid::new_v4());
        let id = sandbox.id;
        repo.insert(sandbox).await.unwrap();

        // Terminating twice: the second mutation fails inside the lock.
        repo.update(id, Box::new(|s| s.terminate("first"))).await.unwrap();
        let result = repo.update(id, Box::new(|s| s.terminate("second"))).await;
        assert!(matches!(result, Err(SandboxError::PolicyViolation(_))));

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.termination_reason.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_find_active_skips_terminated() {
        let repo = InMemorySandboxRepository::new();
        let game_id = Uuid::new_v4();
        let bundle_id = Uuid::new_v4();

        let mut dead = sandbox(game_id, bundle_id);
        dead.terminate("expired").unwrap();
        repo.insert(dead).await.unwrap();
        assert!(repo
            .find_active_for_bundle(game_id, bundle_id)
            .await
            .unwrap()
            .is_none());

        let live = sandbox(game_id, bundle_id);
        let live_id = live.id;
        repo.insert(live).await.unwrap();
        let found = repo
            .find_active_for_bundle(game_id, bundle_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, live_id);
    }

    #[tokio::test]
    async fn test_game_repository_play_count() {
        let repo = InMemoryGameRepository::new();
        let game_id = Uuid::new_v4();
        repo.insert_game(GameRecord {
            id: game_id,
            title: "Asteroid Run".to_string(),
            developer_id: Uuid::new_v4(),
            published: true,
            current_version: "1.0.0".to_string(),
            allowed_domains: vec![],
            security_metadata: GameSecurityMetadata::default(),
            play_count: 0,
        })
        .await;

        repo.record_play(game_id).await.unwrap();
        repo.record_play(game_id).await.unwrap();
        let game = repo.get_by_id(game_id).await.unwrap().unwrap();
        assert_eq!(game.play_count, 2);

        assert!(matches!(
            repo.record_play(Uuid::new_v4()).await,
            Err(SandboxError::NotFound(_))
        ));
    }

    #[test]
    fn test_local_storage_lists_nested_files_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        for name in ["main.js", "assets/sprite.png", "index.html"] {
            let mut file = File::create(dir.path().join(name)).unwrap();
            file.write_all(b"x").unwrap();
        }

        let files = LocalBundleStorage.list_files(dir.path()).unwrap();
        assert_eq!(files.len(), 3);
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
    }

    #[test]
    fn test_local_storage_missing_path_is_error() {
        let result = LocalBundleStorage.list_files(Path::new("/nonexistent/bundle/path"));
        assert!(result.is_err());
    }
}
