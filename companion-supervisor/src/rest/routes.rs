use axum::{
    Json, Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::handlers::{self, AppState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Companion Supervisor API",
        version = "0.1.0",
        description = "REST API for the container supervisor. Enables, disables, versions and inspects managed services.",
        license(name = "MIT")
    ),
    tags(
        (name = "system", description = "System information"),
        (name = "services", description = "Service lifecycle and inspection"),
        (name = "sessions", description = "Interactive terminal sessions"),
        (name = "versions", description = "Image versions and releases")
    ),
    paths(
        handlers::get_version,
        handlers::get_status,
        handlers::enable_service,
        handlers::disable_service,
        handlers::set_version,
        handlers::restart_service,
        handlers::attach_service,
        handlers::get_top,
        handlers::get_logs,
        handlers::get_available_versions,
        handlers::get_releases,
    ),
    components(schemas(
        handlers::VersionInfo,
        handlers::ApiError,
        handlers::Ack,
        handlers::SetVersionRequest,
        handlers::AttachResponse,
        crate::service::ServiceStatus,
        crate::service::DesiredState,
        crate::runtime::ObservedState,
        crate::runtime::ProcessList,
    ))
)]
pub struct ApiDoc;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // System
        .route("/version", get(handlers::get_version))
        .route("/status", get(handlers::get_status))
        // Services
        .route("/services/{name}/enable", post(handlers::enable_service))
        .route("/services/{name}/disable", post(handlers::disable_service))
        .route("/services/{name}/version", put(handlers::set_version))
        .route("/services/{name}/restart", post(handlers::restart_service))
        .route("/services/{name}/attach", post(handlers::attach_service))
        .route("/services/{name}/top", get(handlers::get_top))
        .route("/services/{name}/logs", get(handlers::get_logs))
        // Versions
        .route("/services/{name}/versions", get(handlers::get_available_versions))
        .route("/releases", get(handlers::get_releases));

    Router::new()
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
