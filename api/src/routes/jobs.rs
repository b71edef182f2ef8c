//! The job submission and status routes

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tracing::{Level, event, instrument};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::models::{Job, JobCreated, JobOutput, JobRequest, JobStatus, Preset, R2Config};
use crate::spawner;
use crate::utils::{ApiError, AppState};

/// Enqueue a job directly by input url
///
/// The spawn that follows is best effort; the job is already queued when
/// it runs so a spawn failure never fails the submit.
///
/// # Arguments
///
/// * `state` - Shared clipforge objects
/// * `req` - The job to enqueue
#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body = JobRequest,
    responses(
        (status = 201, description = "The job was enqueued", body = JobCreated),
        (status = 400, description = "The job request was invalid"),
    )
)]
#[instrument(name = "routes::jobs::create", skip_all, err(Debug))]
async fn create(
    State(state): State<AppState>,
    Json(req): Json<JobRequest>,
) -> Result<Response, ApiError> {
    // build and enqueue this job
    let job = Job::from_request(req);
    job.enqueue(&state.shared).await?;
    // spawning is best effort once the job is queued
    if let Err(error) = spawner::maybe_spawn_worker(&state.shared).await {
        event!(
            Level::ERROR,
            msg = "Spawn after enqueue failed",
            job = job.id.to_string(),
            error = error.msg()
        );
    }
    // build response
    let response = Json(JobCreated {
        job_id: job.id,
        status: job.status,
    });
    Ok((StatusCode::CREATED, response).into_response())
}

/// Get a jobs current record
///
/// # Arguments
///
/// * `job_id` - The id of the job to get
/// * `state` - Shared clipforge objects
#[utoipa::path(
    get,
    path = "/api/jobs/{job_id}",
    params(
        ("job_id" = Uuid, Path, description = "The id of the job to get"),
    ),
    responses(
        (status = 200, description = "The jobs current record", body = Job),
        (status = 404, description = "No job exists under this id"),
    )
)]
#[instrument(name = "routes::jobs::get_job", skip_all, fields(job = job_id.to_string()), err(Debug))]
async fn get_job(
    Path(job_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Job>, ApiError> {
    // get this jobs record
    let job = Job::get(&job_id, &state.shared).await?;
    Ok(Json(job))
}

/// Requeue a running or failed job for another attempt
///
/// Jobs out of retries are failed with "Max retries exceeded" instead and
/// a 409 is returned.
///
/// # Arguments
///
/// * `job_id` - The id of the job to requeue
/// * `state` - Shared clipforge objects
#[utoipa::path(
    post,
    path = "/api/jobs/{job_id}/requeue",
    params(
        ("job_id" = Uuid, Path, description = "The id of the job to requeue"),
    ),
    responses(
        (status = 200, description = "The job was requeued"),
        (status = 404, description = "No job exists under this id"),
        (status = 409, description = "The jobs retries are exhausted"),
    )
)]
#[instrument(name = "routes::jobs::requeue", skip_all, fields(job = job_id.to_string()), err(Debug))]
async fn requeue(
    Path(job_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    // only running and failed jobs can move back to pending
    let job = Job::get(&job_id, &state.shared).await?;
    if !matches!(job.status, JobStatus::Running | JobStatus::Failed) {
        return crate::conflict!(format!(
            "job {} cannot be requeued from {}",
            job_id, job.status
        ));
    }
    // requeue this job if it has retries left
    if !Job::requeue(&job_id, &state.shared).await? {
        return crate::conflict!(format!("job {} is out of retries", job_id));
    }
    // a freshly queued job may need a worker
    if let Err(error) = spawner::maybe_spawn_worker(&state.shared).await {
        event!(
            Level::ERROR,
            msg = "Spawn after requeue failed",
            error = error.msg()
        );
    }
    Ok(StatusCode::OK)
}

/// The struct containing our openapi docs
#[derive(OpenApi)]
#[openapi(
    paths(create, get_job, requeue),
    components(schemas(Job, JobCreated, JobOutput, JobRequest, JobStatus, Preset, R2Config))
)]
pub struct JobApiDocs;

/// Add the job routes to our router
///
/// # Arguments
///
// * `router` - The router to add routes too
pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/jobs", post(create))
        .route("/api/jobs/{job_id}", get(get_job))
        .route("/api/jobs/{job_id}/requeue", post(requeue))
}
