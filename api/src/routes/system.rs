//! The observability routes for operators

use axum::Router;
use axum::extract::{Json, State};
use axum::routing::get;
use tracing::instrument;
use utoipa::OpenApi;

use crate::models::backends::db;
use crate::models::{AdmissionStats, SystemStats};
use crate::utils::{ApiError, AppState};

/// Get a snapshot of queue depth and pool usage
///
/// # Arguments
///
/// * `state` - Shared clipforge objects
#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "A snapshot of queue and pool state", body = SystemStats),
    )
)]
#[instrument(name = "routes::system::stats", skip_all, err(Debug))]
async fn stats(State(state): State<AppState>) -> Result<Json<SystemStats>, ApiError> {
    // gather the admission, queue, and binding views
    let machines = db::admission::stats(&state.shared).await?;
    let pending_jobs = db::jobs::pending_count(&state.shared).await?;
    let active = db::jobs::active_jobs(&state.shared).await?;
    let stats = SystemStats {
        machines,
        pending_jobs,
        active_jobs: active.len() as u64,
        active_job_ids: active.into_keys().collect(),
    };
    Ok(Json(stats))
}

/// The struct containing our openapi docs
#[derive(OpenApi)]
#[openapi(paths(stats), components(schemas(AdmissionStats, SystemStats)))]
pub struct SystemApiDocs;

/// Add the system routes to our router
///
/// # Arguments
///
// * `router` - The router to add routes too
pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router.route("/api/stats", get(stats))
}
