//! The basic identify and health routes

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::{Level, event, instrument};
use utoipa::OpenApi;

use crate::models::StatusReport;
use crate::models::backends::db;
use crate::utils::{ApiError, AppState};

/// API identification route
#[utoipa::path(
    get,
    path = "/api/",
    responses(
        (status = 200, description = "Identify this API as the clipforge API", body = String, example = json!("clipforge"))
    )
)]
#[instrument(name = "routes::basic::identify", skip_all)]
async fn identify() -> &'static str {
    "clipforge"
}

/// API health route checking the state store is reachable
///
/// # Arguments
///
/// * `state` - Shared clipforge objects
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "clipforge is healthy", body = StatusReport),
        (status = 503, description = "clipforge is unhealthy", body = StatusReport),
    )
)]
#[instrument(name = "routes::basic::status", skip_all, err(Debug))]
async fn status(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = db::system::status(&state.shared).await?;
    // log our health
    event!(Level::INFO, healthy = report.healthy());
    let code = if report.healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((code, Json(report)).into_response())
}

/// The struct containing our openapi docs
#[derive(OpenApi)]
#[openapi(paths(identify, status), components(schemas(StatusReport, ApiError)))]
pub struct BasicApiDocs;

/// Add the basic routes to our router
///
/// # Arguments
///
// * `router` - The router to add routes too
pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/", get(identify))
        .route("/api/status", get(status))
}
