//! HTTP endpoint handlers for cloudlet server actions

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use cloudlet_common::{CloudletError, ImageRecord, PropertyMap, RequestContext};
use cloudlet_orchestrator::{CloudletApi, StatusReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const USER_ID_HEADER: &str = "X-User-Id";
const ANONYMOUS_USER: &str = "anonymous";

/// Shared application state
pub struct AppState {
    pub api: CloudletApi,
}

/// Server actions accepted on `/servers/:id/action`, keyed by action name.
#[derive(Debug, Deserialize)]
pub enum ServerAction {
    #[serde(rename = "cloudlet-base")]
    Base(Option<BaseAction>),
    #[serde(rename = "cloudlet-overlay-start")]
    OverlayStart(Option<OverlayStartAction>),
    #[serde(rename = "cloudlet-overlay-finish")]
    OverlayFinish(Option<OverlayFinishAction>),
}

#[derive(Debug, Default, Deserialize)]
pub struct BaseAction {
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<PropertyMap>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OverlayStartAction {
    #[serde(rename = "basevm-name")]
    pub basevm_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<PropertyMap>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OverlayFinishAction {
    #[serde(rename = "overlay-name")]
    pub overlay_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<PropertyMap>,
}

#[derive(Debug, Serialize)]
pub struct BaseResponse {
    #[serde(rename = "base-disk")]
    pub base_disk: ImageRecord,
    #[serde(rename = "base-memory")]
    pub base_memory: ImageRecord,
}

#[derive(Debug, Serialize)]
pub struct OverlayResponse {
    #[serde(rename = "overlay-id")]
    pub overlay_id: ImageRecord,
}

/// Run a cloudlet action against a server
#[instrument(skip(state, headers, body))]
pub async fn server_action(
    State(state): State<Arc<AppState>>,
    Path((project_id, server_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    let action = serde_json::from_value::<ServerAction>(body)
        .map_err(|e| AppError::BadRequest(format!("Unsupported server action: {}", e)))?;
    let ctx = request_context(&headers, project_id);

    match action {
        ServerAction::Base(args) => {
            let args = args.unwrap_or_default();
            let name = args
                .name
                .ok_or_else(|| AppError::BadRequest("Need to set base VM name".to_string()))?;
            info!("cloudlet Generate Base VM {}", server_id);

            let instance = state.api.get_instance(&ctx, &server_id).await?;
            let family = state
                .api
                .create_base(&ctx, &instance, &name, args.metadata.as_ref())
                .await?;

            let body = BaseResponse {
                base_disk: family.disk,
                base_memory: family.memory,
            };
            Ok((StatusCode::ACCEPTED, Json(body)).into_response())
        }
        ServerAction::OverlayStart(args) => {
            let args = args.unwrap_or_default();
            let basevm_name = args.basevm_name.unwrap_or_default();
            debug!("cloudlet overlay start {} from {:?}", server_id, basevm_name);

            let instance = state.api.get_instance(&ctx, &server_id).await?;
            state
                .api
                .create_overlay_start(&ctx, &instance, &basevm_name, args.metadata.as_ref())
                .await?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
        ServerAction::OverlayFinish(args) => {
            let args = args.unwrap_or_default();
            let overlay_name = args
                .overlay_name
                .ok_or_else(|| AppError::NotFound("Need overlay Name".to_string()))?;
            info!("cloudlet Generate overlay VM finish {}", server_id);

            let instance = state.api.get_instance(&ctx, &server_id).await?;
            let overlay = state
                .api
                .create_overlay_finish(&ctx, &instance, &overlay_name, args.metadata.as_ref())
                .await?;

            let body = OverlayResponse { overlay_id: overlay };
            Ok((StatusCode::ACCEPTED, Json(body)).into_response())
        }
    }
}

/// Static and dynamic resource status of this cloudlet
#[instrument(skip(state, headers))]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<StatusReport>, AppError> {
    let ctx = request_context(&headers, project_id);
    let app_request = if params.is_empty() {
        None
    } else {
        Some(serde_json::json!(params))
    };

    let report = state.api.get_status(&ctx, app_request.as_ref()).await?;
    Ok(Json(report))
}

/// Static resource status of this cloudlet
#[instrument(skip(state, headers))]
pub async fn get_static_status(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusReport>, AppError> {
    let ctx = request_context(&headers, project_id);
    let report = state.api.get_static_status(&ctx).await?;
    Ok(Json(report))
}

fn request_context(headers: &HeaderMap, project_id: String) -> RequestContext {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_USER);
    RequestContext::new(user_id, project_id)
}

/// Create router with all cloudlet endpoints
pub fn cloudlet_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v2/:project_id/servers/:id/action", post(server_action))
        .route("/v2/:project_id/os-cloudlet/status", get(get_status))
        .route(
            "/v2/:project_id/os-cloudlet/status/static",
            get(get_static_status),
        )
        .with_state(state)
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Cloudlet(CloudletError),
}

impl From<CloudletError> for AppError {
    fn from(err: CloudletError) -> Self {
        AppError::Cloudlet(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Cloudlet(err) => {
                let status = match &err {
                    CloudletError::InvalidState { .. } | CloudletError::Conflict { .. } => {
                        StatusCode::CONFLICT
                    }
                    CloudletError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    CloudletError::NotFound(_) => StatusCode::NOT_FOUND,
                    CloudletError::PolicyDenied { .. } => StatusCode::FORBIDDEN,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!(error = %err, "Cloudlet request failed");
                } else {
                    warn!(error = %err, "Cloudlet request rejected");
                }
                (status, err.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
