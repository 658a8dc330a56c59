use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::SupervisorError;
use crate::runtime::ProcessList;
use crate::service::ServiceStatus;
use crate::supervisor::Supervisor;

/// Shared application state
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub code: u32,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code {
            404 => StatusCode::NOT_FOUND,
            409 => StatusCode::CONFLICT,
            400 => StatusCode::BAD_REQUEST,
            502 => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<SupervisorError> for ApiError {
    fn from(e: SupervisorError) -> Self {
        let code = match &e {
            SupervisorError::NotFound(_) => 404,
            SupervisorError::InvalidState(_) => 409,
            SupervisorError::Runtime(_) | SupervisorError::Version(_) => 502,
            SupervisorError::Internal(_) => 500,
        };
        ApiError {
            error: e.to_string(),
            code,
        }
    }
}

// === Version ===

/// Version information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct VersionInfo {
    pub version: String,
}

/// Get supervisor version
#[utoipa::path(
    get,
    path = "/api/v1/version",
    responses(
        (status = 200, description = "Supervisor version", body = VersionInfo)
    ),
    tag = "system"
)]
pub async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === Status ===

/// Get the status of every service
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Status per service name", body = BTreeMap<String, ServiceStatus>)
    ),
    tag = "services"
)]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, ServiceStatus>> {
    Json(state.supervisor.get_status().await)
}

// === Lifecycle ===

/// Acknowledgement of a lifecycle request
#[derive(Serialize, Deserialize, ToSchema)]
pub struct Ack {
    pub service: String,
    pub ok: bool,
}

impl Ack {
    fn new(service: String) -> Json<Self> {
        Json(Ack { service, ok: true })
    }
}

/// Enable a service
#[utoipa::path(
    post,
    path = "/api/v1/services/{name}/enable",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Service enabled", body = Ack),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn enable_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.supervisor.enable(&name).await?;
    Ok(Ack::new(name))
}

/// Disable a service. It is stopped on the next maintenance tick.
#[utoipa::path(
    post,
    path = "/api/v1/services/{name}/disable",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Service disabled", body = Ack),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn disable_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.supervisor.disable(&name).await?;
    Ok(Ack::new(name))
}

/// Request to change a service's image tag
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SetVersionRequest {
    pub version: String,
}

/// Set the image tag used on the next start
#[utoipa::path(
    put,
    path = "/api/v1/services/{name}/version",
    params(("name" = String, Path, description = "Service name")),
    request_body = SetVersionRequest,
    responses(
        (status = 200, description = "Version recorded", body = Ack),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn set_version(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<SetVersionRequest>,
) -> Result<Json<Ack>, ApiError> {
    state.supervisor.set_version(&name, &req.version).await?;
    Ok(Ack::new(name))
}

/// Restart a service's container
#[utoipa::path(
    post,
    path = "/api/v1/services/{name}/restart",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Runtime-defined restart result, passed through"),
        (status = 404, description = "Unknown service", body = ApiError),
        (status = 409, description = "Service has no container", body = ApiError),
        (status = 502, description = "Runtime failure", body = ApiError)
    ),
    tag = "services"
)]
pub async fn restart_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(state.supervisor.restart(&name).await?))
}

/// Interactive session details
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AttachResponse {
    pub service: String,
    pub pid: u32,
}

/// Open the terminal bridge into a service, replacing any active session
#[utoipa::path(
    post,
    path = "/api/v1/services/{name}/attach",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Session started", body = AttachResponse),
        (status = 404, description = "Unknown service", body = ApiError),
        (status = 409, description = "Service has no container", body = ApiError)
    ),
    tag = "sessions"
)]
pub async fn attach_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<AttachResponse>, ApiError> {
    let pid = state.supervisor.attach(&name).await?;
    Ok(Json(AttachResponse { service: name, pid }))
}

// === Inspection ===

/// List processes inside a service's container
#[utoipa::path(
    get,
    path = "/api/v1/services/{name}/top",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Process table", body = ProcessList),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn get_top(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProcessList>, ApiError> {
    Ok(Json(state.supervisor.top(&name).await?))
}

/// Get a service's recent logs as plain text
#[utoipa::path(
    get,
    path = "/api/v1/services/{name}/logs",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Log text", body = String, content_type = "text/plain"),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let logs = state.supervisor.get_logs(&name).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], logs))
}

// === Versions ===

/// List image tags available for a service
#[utoipa::path(
    get,
    path = "/api/v1/services/{name}/versions",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Available tags", body = Vec<String>),
        (status = 404, description = "Unknown service", body = ApiError),
        (status = 502, description = "Registry failure", body = ApiError)
    ),
    tag = "versions"
)]
pub async fn get_available_versions(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.supervisor.available_versions(&name).await?))
}

/// Report which releases are fully available
#[utoipa::path(
    get,
    path = "/api/v1/releases",
    responses(
        (status = 200, description = "Availability per release", body = BTreeMap<String, bool>),
        (status = 502, description = "Registry or manifest failure", body = ApiError)
    ),
    tag = "versions"
)]
pub async fn get_releases(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, bool>>, ApiError> {
    Ok(Json(state.supervisor.check_releases().await?))
}
