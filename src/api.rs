//! HTTP surface over detection, site registration and sync.

use crate::config::Config;
use crate::db::{ContentStore, Database, NewSite, RemoteSite};
use crate::detector::{detect_and_store, detect_plugin_for, DetectError, PluginInfo};
use crate::security::constant_time_compare;
use crate::status::{SiteSyncState, SyncStatus};
use crate::sync::{sync_site, SyncError, SyncMode, SyncResult};
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        Self {
            config: Arc::new(config),
            db,
        }
    }
}

// ==================== Errors ====================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or invalid API key")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            ApiError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::InvalidSite(_) => ApiError::BadRequest(err.to_string()),
            DetectError::SiteNotFound(_) => ApiError::NotFound(err.to_string()),
            DetectError::Unreachable(_) => ApiError::BadGateway(err.to_string()),
            DetectError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::SiteNotFound(_) => ApiError::NotFound(err.to_string()),
            SyncError::MissingCredential | SyncError::InvalidSite(_) => {
                ApiError::BadRequest(err.to_string())
            }
            SyncError::AlreadySyncing { .. } => ApiError::Conflict(err.to_string()),
            SyncError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

// ==================== Request Bodies ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub site_url: String,
    pub username: String,
    pub app_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteRequest {
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub owner_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    pub app_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub app_password: String,
    #[serde(default = "default_mode")]
    pub mode: SyncMode,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
}

fn default_mode() -> SyncMode {
    SyncMode::Incremental
}

// ==================== Router ====================

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/detect", post(detect))
        .route("/sites", post(create_site).get(list_sites))
        .route("/sites/:id", get(get_site))
        .route("/sites/:id/detect", post(detect_site))
        .route("/sites/:id/sync", post(sync))
        .route("/sites/:id/reset-sync", post(reset_sync))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .nest("/api", protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Rejects requests without the configured key. A server with no key is open.
async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.config.api_key.as_deref() {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !constant_time_compare(provided, expected) {
            warn!("Rejected {} {}: bad API key", request.method(), request.uri().path());
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

// ==================== Handlers ====================

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn detect(
    State(state): State<AppState>,
    Json(body): Json<DetectRequest>,
) -> Result<Json<PluginInfo>, ApiError> {
    let info = detect_plugin_for(
        &state.config,
        &body.site_url,
        &body.username,
        &body.app_password,
    )
    .await?;
    Ok(Json(info))
}

async fn create_site(
    State(state): State<AppState>,
    Json(body): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<RemoteSite>), ApiError> {
    let base_url = body.base_url.trim().trim_end_matches('/');
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ApiError::BadRequest(
            "baseUrl must start with http:// or https://".to_string(),
        ));
    }
    if body.username.trim().is_empty() {
        return Err(ApiError::BadRequest("username is required".to_string()));
    }

    let site = state.db.create_site(&NewSite {
        name: body.name,
        base_url: base_url.to_string(),
        username: body.username,
        owner_id: body.owner_id,
    })?;

    Ok((StatusCode::CREATED, Json(site)))
}

async fn list_sites(State(state): State<AppState>) -> Result<Json<Vec<RemoteSite>>, ApiError> {
    Ok(Json(state.db.list_sites()?))
}

async fn get_site(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RemoteSite>, ApiError> {
    state
        .db
        .get_site(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Site {} not found", id)))
}

async fn detect_site(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<CredentialRequest>,
) -> Result<Json<PluginInfo>, ApiError> {
    let info = detect_and_store(&state.config, &state.db, id, &body.app_password).await?;
    Ok(Json(info))
}

async fn sync(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SyncRequest>,
) -> Result<Json<SyncResult>, ApiError> {
    let result = sync_site(
        &state.config,
        &state.db,
        id,
        &body.app_password,
        body.mode,
        body.languages,
    )
    .await?;
    Ok(Json(result))
}

/// Release a site left SYNCING by a run that never finished. Other states
/// are returned unchanged.
async fn reset_sync(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RemoteSite>, ApiError> {
    let site = state
        .db
        .get_site(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Site {} not found", id)))?;

    if site.sync.status != SyncStatus::Syncing {
        return Ok(Json(site));
    }

    state.db.save_sync_state(
        id,
        &SiteSyncState {
            status: SyncStatus::Idle,
            sync_started_at: None,
            ..site.sync.clone()
        },
    )?;
    info!("Site {} sync state reset to IDLE", id);

    state
        .db
        .get_site(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Site {} not found", id)))
}
