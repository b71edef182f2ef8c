//! The webhook ingest routes

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::post;
use tracing::{Level, event, instrument};
use utoipa::OpenApi;

use crate::bad;
use crate::models::backends::db;
use crate::models::{EventAction, Job, JobCompleteWebhook, JobStatus, UploadEvent};
use crate::utils::{ApiError, AppState};

/// Apply a workers completion webhook to its job record
///
/// # Arguments
///
/// * `state` - Shared clipforge objects
/// * `body` - The webhook a worker posted
#[utoipa::path(
    post,
    path = "/api/webhooks/job-complete",
    request_body = JobCompleteWebhook,
    responses(
        (status = 200, description = "The job record was updated"),
        (status = 400, description = "The webhook did not carry a terminal status"),
    )
)]
#[instrument(name = "routes::webhooks::job_complete", skip_all, err(Debug))]
async fn job_complete(
    State(state): State<AppState>,
    Json(body): Json<JobCompleteWebhook>,
) -> Result<StatusCode, ApiError> {
    // log what this webhook carried
    event!(
        Level::INFO,
        job = body.job_id.to_string(),
        status = body.status.as_str(),
        outputs = body.outputs.len()
    );
    match body.status {
        JobStatus::Completed => {
            Job::complete(
                &body.job_id,
                Some(&body.outputs),
                body.duration,
                &state.shared,
            )
            .await?;
        }
        JobStatus::Failed => {
            let error = body.error.as_deref().unwrap_or("Job failed");
            Job::fail(&body.job_id, error, &state.shared).await?;
        }
        status => return bad!(format!("{} is not a terminal status", status)),
    }
    Ok(StatusCode::OK)
}

/// Ingest a batch of object created notifications
///
/// The events land in the upload event queue; the event handler consumes
/// them and moves jobs from `uploading` to `pending`.
///
/// # Arguments
///
/// * `state` - Shared clipforge objects
/// * `events` - The notifications to ingest
#[utoipa::path(
    post,
    path = "/api/webhooks/object-created",
    request_body = Vec<UploadEvent>,
    responses(
        (status = 202, description = "The notifications were queued"),
    )
)]
#[instrument(name = "routes::webhooks::object_created", skip_all, fields(count = events.len()), err(Debug))]
async fn object_created(
    State(state): State<AppState>,
    Json(events): Json<Vec<UploadEvent>>,
) -> Result<StatusCode, ApiError> {
    db::events::add(&events, &state.shared).await?;
    Ok(StatusCode::ACCEPTED)
}

/// The struct containing our openapi docs
#[derive(OpenApi)]
#[openapi(
    paths(job_complete, object_created),
    components(schemas(EventAction, JobCompleteWebhook, UploadEvent))
)]
pub struct WebhookApiDocs;

/// Add the webhook routes to our router
///
/// # Arguments
///
// * `router` - The router to add routes too
pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/webhooks/job-complete", post(job_complete))
        .route("/api/webhooks/object-created", post(object_created))
}
