use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

mod classifier;
mod config;
mod handlers;
mod models;
mod monitor;
mod policy;
mod reaper;
mod runtime;
mod scanner;
mod storage;

use shared::observability::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use shared::types::{ApiResponse, UserId};
use shared::SandboxError;

use crate::config::Config;
use crate::handlers::bundles::RegisterBundleCommand;
use crate::handlers::create_sandbox::CreateSandboxCommand;
use crate::handlers::deploy::DeploySandboxedGameCommand;
use crate::handlers::launch::LaunchGameCommand;
use crate::handlers::scan::ScanBundleWorker;
use crate::handlers::status::GetSandboxStatusQuery;
use crate::handlers::SandboxServices;
use crate::monitor::SandboxMonitor;
use crate::reaper::Reaper;
use crate::runtime::InMemoryRuntime;
use crate::scanner::{ContentScanner, ContentScannerConfig};
use crate::storage::{
    BundleRepository, BundleStorage, InMemoryBundleRepository, InMemoryGameRepository,
    InMemorySandboxRepository, LocalBundleStorage,
};

#[derive(Clone)]
struct AppState {
    services: SandboxServices,
    bundle_storage: Arc<dyn BundleStorage>,
    scan_worker: Arc<ScanBundleWorker>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.validate()?;

    init_logging(LogConfig {
        level: LogLevel::parse(&config.logging.level),
        format: LogFormat::parse(&config.logging.format),
        service_name: "sandbox-service".to_string(),
        include_line_numbers: true,
    })
    .map_err(|e| anyhow::anyhow!(e))?;

    info!("Starting game sandbox service");

    let bundles: Arc<dyn BundleRepository> = Arc::new(InMemoryBundleRepository::new());
    let sandboxes = Arc::new(InMemorySandboxRepository::new());
    let games = Arc::new(InMemoryGameRepository::new());
    let container_runtime = Arc::new(InMemoryRuntime::new());
    let bundle_storage: Arc<dyn BundleStorage> = Arc::new(LocalBundleStorage);

    let services = SandboxServices {
        bundles: bundles.clone(),
        sandboxes: sandboxes.clone(),
        games,
        runtime: container_runtime.clone(),
        settings: config.sandbox.clone(),
    };

    let scan_worker = Arc::new(ScanBundleWorker::new(
        bundles.clone(),
        bundle_storage.clone(),
        ContentScanner::new(ContentScannerConfig {
            max_file_size_bytes: config.scanner.max_file_size_bytes(),
        }),
    ));

    // Background supervision: reaper sweeps and metrics polling.
    let reaper = Reaper::new(sandboxes.clone());
    tokio::spawn(reaper::run_sweep_loop(
        reaper,
        config.reaper.sweep_interval_seconds,
        config.reaper.idle_minutes,
    ));

    let sandbox_monitor = SandboxMonitor::new(sandboxes.clone(), container_runtime);
    tokio::spawn(monitor::run_monitor_loop(
        sandbox_monitor,
        config.sandbox.metrics_poll_seconds,
    ));

    let app_state = AppState {
        services,
        bundle_storage,
        scan_worker,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/bundles", post(register_bundle))
        .route("/bundles/:id/scan", post(scan_bundle))
        .route("/sandboxes", post(create_sandbox))
        .route("/sandboxes/:id", get(sandbox_status))
        .route("/sandboxes/:id/deploy", post(deploy_game))
        .route("/games/:id/launch", post(launch_game))
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Sandbox service listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

type ApiResult = (StatusCode, Json<ApiResponse<serde_json::Value>>);

fn error_response(err: SandboxError) -> ApiResult {
    let code = match &err {
        SandboxError::Validation(_) => "validation_failed",
        SandboxError::NotFound(_) => "not_found",
        SandboxError::PolicyViolation(_) => "policy_violation",
        SandboxError::Provisioning(_) => "provisioning_failed",
        SandboxError::Scan(_) => "scan_failed",
        SandboxError::Timeout(_) => "timeout",
        SandboxError::Internal(_) => "internal",
    };
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ApiResponse::error(code, err.to_string())))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "sandbox-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn register_bundle(
    State(state): State<AppState>,
    Json(cmd): Json<RegisterBundleCommand>,
) -> ApiResult {
    match handlers::bundles::handle(&state.services.bundles, &state.bundle_storage, cmd).await {
        Ok(bundle_id) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(json!({ "bundle_id": bundle_id }))),
        ),
        Err(err) => error_response(err),
    }
}

async fn scan_bundle(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    match state.services.bundles.get(id).await {
        Ok(Some(_)) => {
            let worker = state.scan_worker.clone();
            tokio::spawn(async move {
                if let Err(err) = worker.run(id).await {
                    error!(bundle_id = %id, error = %err, "Background scan failed");
                }
            });
            (
                StatusCode::ACCEPTED,
                Json(ApiResponse::ok(json!({ "bundle_id": id, "scan": "started" }))),
            )
        }
        Ok(None) => error_response(SandboxError::NotFound(format!("bundle {id}"))),
        Err(err) => error_response(err),
    }
}

async fn create_sandbox(
    State(state): State<AppState>,
    Json(cmd): Json<CreateSandboxCommand>,
) -> ApiResult {
    match handlers::create_sandbox::handle(&state.services, cmd).await {
        Ok(sandbox_id) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(json!({ "sandbox_id": sandbox_id }))),
        ),
        Err(err) => error_response(err),
    }
}

async fn sandbox_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    match handlers::status::handle(&state.services, GetSandboxStatusQuery { sandbox_id: id }).await
    {
        Ok(Some(view)) => match serde_json::to_value(&view) {
            Ok(value) => (StatusCode::OK, Json(ApiResponse::ok(value))),
            Err(err) => error_response(SandboxError::Internal(err.to_string())),
        },
        Ok(None) => error_response(SandboxError::NotFound(format!("sandbox {id}"))),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
struct DeployRequest {
    game_id: Uuid,
    game_bundle_id: Uuid,
}

async fn deploy_game(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DeployRequest>,
) -> ApiResult {
    let cmd = DeploySandboxedGameCommand {
        sandbox_id: id,
        game_id: req.game_id,
        game_bundle_id: req.game_bundle_id,
    };
    match handlers::deploy::handle(&state.services, cmd).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(json!({ "sandbox_id": id, "deployed": true }))),
        ),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
struct LaunchRequest {
    version: Option<String>,
    user_id: Option<UserId>,
    #[serde(default)]
    reviewer: bool,
}

async fn launch_game(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<LaunchRequest>,
) -> ApiResult {
    let cmd = LaunchGameCommand {
        game_id: id,
        version: req.version,
        user_id: req.user_id,
        reviewer: req.reviewer,
    };
    match handlers::launch::handle(&state.services, cmd).await {
        Ok(result) => match serde_json::to_value(&result) {
            Ok(value) => (StatusCode::OK, Json(ApiResponse::ok(value))),
            Err(err) => error_response(SandboxError::Internal(err.to_string())),
        },
        Err(err) => error_response(err),
    }
}
