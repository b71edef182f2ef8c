//! The presigned upload route

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tracing::instrument;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::bad;
use crate::models::{Job, UploadRequest, UploadResponse};
use crate::utils::{ApiError, AppState};

/// Create a job in the uploading state and presign its upload url
///
/// The job sits in `uploading` until the object store reports the upload
/// landed; the reaper rescues uploads whose events never arrive.
///
/// # Arguments
///
/// * `state` - Shared clipforge objects
/// * `req` - The upload request
#[utoipa::path(
    post,
    path = "/api/upload",
    request_body = UploadRequest,
    responses(
        (status = 201, description = "The job was created and its upload url presigned", body = UploadResponse),
        (status = 400, description = "The upload request was invalid"),
    )
)]
#[instrument(name = "routes::uploads::upload", skip_all, err(Debug))]
async fn upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Response, ApiError> {
    // keep only the final segment of the filename
    let filename = req.filename.rsplit('/').next().unwrap_or_default();
    if filename.is_empty() {
        return bad!("filename cannot be empty".to_owned());
    }
    // build the key this upload will land at
    let job_id = Uuid::new_v4();
    let key = format!("inputs/{job_id}/{filename}");
    // presign a put for the upload
    let ttl = state.shared.config.clipforge.limits.presigned_url_expiry;
    let (upload_url, expires_at) = state
        .shared
        .s3
        .inputs
        .presign_put(&key, req.content_type.as_deref(), ttl)
        .await?;
    // persist the job in its uploading state
    let job = Job::from_upload(job_id, key.clone(), req);
    job.create(&state.shared).await?;
    // build response
    let response = Json(UploadResponse {
        job_id,
        upload_url,
        key,
        expires_at,
    });
    Ok((StatusCode::CREATED, response).into_response())
}

/// The struct containing our openapi docs
#[derive(OpenApi)]
#[openapi(paths(upload), components(schemas(UploadRequest, UploadResponse)))]
pub struct UploadApiDocs;

/// Add the upload routes to our router
///
/// # Arguments
///
// * `router` - The router to add routes too
pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router.route("/api/upload", post(upload))
}
