//! Game launch orchestration: gating, bundle resolution, sandbox
//! create-or-reuse, deployment, and the session-scoped launch config.

use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use shared::types::{GameId, LaunchSessionId, SandboxId, UserId};
use shared::SandboxError;

use crate::classifier::SecurityLevelClassifier;
use crate::storage::{GameRecord, GameRepository, SandboxRepository};

use super::create_sandbox::{self, CreateSandboxCommand};
use super::deploy::{self, DeploySandboxedGameCommand};
use super::SandboxServices;

#[derive(Debug, Clone, Deserialize)]
pub struct LaunchGameCommand {
    pub game_id: GameId,
    pub version: Option<String>,
    pub user_id: Option<UserId>,
    /// Asserted upstream by the marketplace auth layer; grants access to
    /// unpublished games for review.
    #[serde(default)]
    pub reviewer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchGameResult {
    pub sandbox_id: SandboxId,
    pub sandbox_url: String,
    pub game_id: GameId,
    pub version: String,
    pub launch_session_id: LaunchSessionId,
}

/// Per-launch configuration scoped to one player session
#[derive(Debug, Clone, Serialize)]
struct LaunchSessionConfig {
    launch_session_id: LaunchSessionId,
    allowed_domains: Vec<String>,
}

/// Launch a game for a player. Failures are wrapped for the caller while
/// the root cause is logged here.
pub async fn handle(
    services: &SandboxServices,
    cmd: LaunchGameCommand,
) -> shared::Result<LaunchGameResult> {
    let game_id = cmd.game_id;
    match launch(services, cmd).await {
        Ok(result) => Ok(result),
        Err(err) => {
            error!(game_id = %game_id, error = %err, "Game launch failed");
            Err(wrap_launch_error(err))
        }
    }
}

async fn launch(
    services: &SandboxServices,
    cmd: LaunchGameCommand,
) -> shared::Result<LaunchGameResult> {
    let game = services
        .games
        .get_by_id(cmd.game_id)
        .await?
        .ok_or_else(|| SandboxError::NotFound(format!("game {}", cmd.game_id)))?;

    enforce_publish_gating(&game, &cmd)?;

    let version = match &cmd.version {
        Some(requested) => {
            if !services.games.has_version(game.id, requested).await? {
                return Err(SandboxError::NotFound(format!(
                    "game {} has no version {requested}",
                    game.id
                )));
            }
            requested.clone()
        }
        None => game.current_version.clone(),
    };

    let bundle_id = services
        .games
        .bundle_for_version(game.id, &version)
        .await?
        .ok_or_else(|| {
            SandboxError::NotFound(format!("no bundle for game {} version {version}", game.id))
        })?;

    let session = LaunchSessionConfig {
        launch_session_id: Uuid::new_v4(),
        allowed_domains: game.allowed_domains.clone(),
    };

    let metadata_level = SecurityLevelClassifier::from_game_metadata(&game.security_metadata);
    let sandbox_id = create_sandbox::handle(
        services,
        CreateSandboxCommand {
            game_id: game.id,
            game_bundle_id: bundle_id,
            security_level: Some(metadata_level),
            expires_in_hours: None,
            container_image: None,
        },
    )
    .await?;

    deploy::handle(
        services,
        DeploySandboxedGameCommand {
            sandbox_id,
            game_id: game.id,
            game_bundle_id: bundle_id,
        },
    )
    .await?;

    let sandbox = services
        .sandboxes
        .get(sandbox_id)
        .await?
        .ok_or_else(|| SandboxError::Internal(format!("sandbox {sandbox_id} vanished")))?;
    let sandbox_url = sandbox
        .public_url
        .ok_or_else(|| SandboxError::Internal(format!("sandbox {sandbox_id} has no public URL")))?;

    info!(
        game_id = %game.id,
        sandbox_id = %sandbox_id,
        launch_session_id = %session.launch_session_id,
        allowed_domains = session.allowed_domains.len(),
        version = %version,
        "Game launched"
    );

    // Developers previewing their own game do not move the play counter.
    if cmd.user_id != Some(game.developer_id) {
        services.games.record_play(game.id).await?;
    }

    Ok(LaunchGameResult {
        sandbox_id,
        sandbox_url,
        game_id: game.id,
        version,
        launch_session_id: session.launch_session_id,
    })
}

/// Unpublished games are launchable only by their developer or a reviewer.
fn enforce_publish_gating(game: &GameRecord, cmd: &LaunchGameCommand) -> shared::Result<()> {
    if game.published || cmd.reviewer || cmd.user_id == Some(game.developer_id) {
        return Ok(());
    }
    Err(SandboxError::PolicyViolation(format!(
        "game {} is not published",
        game.id
    )))
}

/// Same taxonomy, caller-facing message. The root cause was already logged.
fn wrap_launch_error(err: SandboxError) -> SandboxError {
    let message = format!("Failed to launch game: {err}");
    match err {
        SandboxError::Validation(_) => SandboxError::Validation(message),
        SandboxError::NotFound(_) => SandboxError::NotFound(message),
        SandboxError::PolicyViolation(_) => SandboxError::PolicyViolation(message),
        SandboxError::Provisioning(_) => SandboxError::Provisioning(message),
        SandboxError::Scan(_) => SandboxError::Scan(message),
        SandboxError::Timeout(_) => SandboxError::Timeout(message),
        SandboxError::Internal(_) => SandboxError::Internal(message),
    }
}
