//! The backend logic for transcode jobs

use chrono::prelude::*;
use std::collections::HashMap;
use tracing::{Level, event, instrument};
use uuid::Uuid;

use super::db;
use crate::models::{Job, JobOutput, JobRequest, JobStatus, Preset, UploadEvent, UploadRequest};
use crate::utils::{ApiError, Shared};
use crate::{bad, deserialize_opt, extract, not_found};

/// Parse a required ms timestamp field from a job record
///
/// # Arguments
///
/// * `raw` - The raw base 10 ms value
/// * `key` - The field this value came from
fn parse_ms(raw: &str, key: &str) -> Result<DateTime<Utc>, ApiError> {
    // timestamps are stored as base 10 ms integers
    let ms: i64 = match raw.parse() {
        Ok(ms) => ms,
        Err(error) => return bad!(format!("Failed to parse {} with error {}", key, error)),
    };
    match DateTime::from_timestamp_millis(ms) {
        Some(stamp) => Ok(stamp),
        None => bad!(format!("Timestamp {} is out of range: {}", key, ms)),
    }
}

/// Parse an optional ms timestamp field from a job record
///
/// # Arguments
///
/// * `map` - The raw job record
/// * `key` - The field to parse
fn parse_ms_opt(
    map: &HashMap<String, String>,
    key: &str,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    match map.get(key) {
        Some(raw) => Ok(Some(parse_ms(raw, key)?)),
        None => Ok(None),
    }
}

impl Job {
    /// Build a job from a direct submission
    ///
    /// # Arguments
    ///
    /// * `req` - The submitted job request
    #[must_use]
    pub fn from_request(req: JobRequest) -> Self {
        let id = req.job_id.unwrap_or_else(Uuid::new_v4);
        let now = Utc::now();
        Job {
            id,
            status: JobStatus::Pending,
            input_key: None,
            input_url: Some(req.input_url),
            output_url: req
                .output_url
                .unwrap_or_else(|| format!("outputs/{id}")),
            preset: req.preset,
            output_qualities: req.output_qualities,
            webhook_url: req.webhook_url,
            outputs: None,
            error: None,
            retries: 0,
            machine: None,
            duration: None,
            r2_config: req.r2_config,
            created_at: now,
            uploaded_at: None,
            queued_at: Some(now),
            started_at: None,
            completed_at: None,
        }
    }

    /// Build an uploading job waiting on a presigned upload
    ///
    /// # Arguments
    ///
    /// * `id` - The id this job was created under
    /// * `key` - The key the upload will land at
    /// * `req` - The upload request that created this job
    #[must_use]
    pub fn from_upload(id: Uuid, key: String, req: UploadRequest) -> Self {
        Job {
            id,
            status: JobStatus::Uploading,
            input_key: Some(key),
            input_url: None,
            output_url: format!("outputs/{id}"),
            preset: req.preset,
            output_qualities: req.output_qualities,
            webhook_url: req.webhook_url,
            outputs: None,
            error: None,
            retries: 0,
            machine: None,
            duration: None,
            r2_config: None,
            created_at: Utc::now(),
            uploaded_at: None,
            queued_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Build a fresh pending job from an upload event with no prior record
    ///
    /// # Arguments
    ///
    /// * `id` - The id extracted from the events key
    /// * `cast` - The upload event that fired
    /// * `input_url` - The canonical url the input can be downloaded from
    #[must_use]
    pub fn from_event(id: Uuid, cast: &UploadEvent, input_url: String) -> Self {
        let now = Utc::now();
        Job {
            id,
            status: JobStatus::Pending,
            input_key: Some(cast.key.clone()),
            input_url: Some(input_url),
            output_url: format!("outputs/{id}"),
            preset: Preset::Default,
            output_qualities: None,
            webhook_url: None,
            outputs: None,
            error: None,
            retries: 0,
            machine: None,
            duration: None,
            r2_config: None,
            created_at: now,
            uploaded_at: Some(now),
            queued_at: Some(now),
            started_at: None,
            completed_at: None,
        }
    }

    /// Try to cast a HashMap of strings into a Job
    ///
    /// # Arguments
    ///
    /// * `raw` - The HashMap to cast into a Job
    #[instrument(name = "Job::from_data", skip_all, err(Debug))]
    pub fn from_data(mut raw: HashMap<String, String>) -> Result<Self, ApiError> {
        // error if the record does not contain the required values
        if !raw.contains_key("id") {
            // check if this job was malformed or is just missing
            if raw.is_empty() {
                // this job is just empty
                event!(Level::ERROR, empty = true);
            } else {
                // this record has data but not the required values
                event!(Level::ERROR, malformed = true, data = format!("{raw:?}"));
            }
            return not_found!("Job not found".to_owned());
        }
        // the status token must be one we know
        let raw_status = extract!(raw, "status");
        let status = match JobStatus::from_token(&raw_status) {
            Some(status) => status,
            None => return bad!(format!("Unknown job status {}", raw_status)),
        };
        // the preset token must be one we know
        let raw_preset = extract!(raw, "preset");
        let preset = match Preset::from_token(&raw_preset) {
            Some(preset) => preset,
            None => return bad!(format!("Unknown preset {}", raw_preset)),
        };
        // cast our raw data to a Job
        let job = Job {
            id: Uuid::parse_str(&raw["id"])?,
            status,
            preset,
            input_key: raw.remove("input_key"),
            input_url: raw.remove("input_url"),
            output_url: extract!(raw, "output_url"),
            output_qualities: deserialize_opt!(raw, "output_qualities"),
            webhook_url: raw.remove("webhook_url"),
            outputs: deserialize_opt!(raw, "outputs"),
            error: raw.remove("error"),
            retries: match raw.remove("retries") {
                Some(raw_retries) => raw_retries.parse()?,
                None => 0,
            },
            machine: raw.remove("machine"),
            duration: match raw.remove("duration") {
                Some(raw_duration) => Some(raw_duration.parse()?),
                None => None,
            },
            r2_config: deserialize_opt!(raw, "r2_config"),
            created_at: parse_ms(&extract!(raw, "created_at"), "created_at")?,
            uploaded_at: parse_ms_opt(&raw, "uploaded_at")?,
            queued_at: parse_ms_opt(&raw, "queued_at")?,
            started_at: parse_ms_opt(&raw, "started_at")?,
            completed_at: parse_ms_opt(&raw, "completed_at")?,
        };
        Ok(job)
    }

    /// Gets a job object from the backend
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the job to retrieve
    /// * `shared` - Shared clipforge objects
    #[instrument(name = "Job::get", skip_all, err(Debug))]
    pub async fn get(id: &Uuid, shared: &Shared) -> Result<Job, ApiError> {
        db::jobs::get(id, shared).await
    }

    /// Writes this job without queueing it
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    #[instrument(name = "Job::create", skip_all, err(Debug))]
    pub async fn create(&self, shared: &Shared) -> Result<(), ApiError> {
        db::jobs::create(self, shared).await
    }

    /// Writes this job and adds it to the pending queue
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    #[instrument(name = "Job::enqueue", skip_all, err(Debug))]
    pub async fn enqueue(&self, shared: &Shared) -> Result<(), ApiError> {
        db::jobs::enqueue(self, shared).await
    }

    /// Pops the oldest pending job for a machine
    ///
    /// # Arguments
    ///
    /// * `machine` - The machine claiming a job
    /// * `shared` - Shared clipforge objects
    #[instrument(name = "Job::pop", skip_all, err(Debug))]
    pub async fn pop(machine: &str, shared: &Shared) -> Result<Option<Job>, ApiError> {
        db::jobs::pop(machine, shared).await
    }

    /// Marks a job completed
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the job that completed
    /// * `outputs` - The outputs this job produced if any were reported
    /// * `duration` - How long the transcode took if it was reported
    /// * `shared` - Shared clipforge objects
    #[instrument(name = "Job::complete", skip_all, err(Debug))]
    pub async fn complete(
        id: &Uuid,
        outputs: Option<&[JobOutput]>,
        duration: Option<f64>,
        shared: &Shared,
    ) -> Result<(), ApiError> {
        db::jobs::complete(id, outputs, duration, shared).await
    }

    /// Marks a job failed
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the job that failed
    /// * `error` - The error this job failed with
    /// * `shared` - Shared clipforge objects
    #[instrument(name = "Job::fail", skip_all, err(Debug))]
    pub async fn fail(id: &Uuid, error: &str, shared: &Shared) -> Result<(), ApiError> {
        db::jobs::fail(id, error, shared).await
    }

    /// Requeues a job unless its retries are exhausted
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the job to requeue
    /// * `shared` - Shared clipforge objects
    #[instrument(name = "Job::requeue", skip_all, err(Debug))]
    pub async fn requeue(id: &Uuid, shared: &Shared) -> Result<bool, ApiError> {
        db::jobs::requeue(id, shared).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::R2Config;

    /// Flatten a job the way db::jobs::build writes it
    ///
    /// Tests use this to round trip records without a live store.
    fn flatten(job: &Job) -> HashMap<String, String> {
        let mut raw = HashMap::default();
        raw.insert("id".into(), job.id.to_string());
        raw.insert("status".into(), job.status.as_str().into());
        raw.insert("output_url".into(), job.output_url.clone());
        raw.insert("preset".into(), job.preset.as_str().into());
        raw.insert("retries".into(), job.retries.to_string());
        raw.insert("created_at".into(), job.created_at.timestamp_millis().to_string());
        if let Some(input_key) = &job.input_key {
            raw.insert("input_key".into(), input_key.clone());
        }
        if let Some(input_url) = &job.input_url {
            raw.insert("input_url".into(), input_url.clone());
        }
        if let Some(webhook_url) = &job.webhook_url {
            raw.insert("webhook_url".into(), webhook_url.clone());
        }
        if let Some(machine) = &job.machine {
            raw.insert("machine".into(), machine.clone());
        }
        if let Some(error) = &job.error {
            raw.insert("error".into(), error.clone());
        }
        if let Some(duration) = &job.duration {
            raw.insert("duration".into(), duration.to_string());
        }
        if let Some(qualities) = &job.output_qualities {
            raw.insert(
                "output_qualities".into(),
                serde_json::to_string(qualities).unwrap(),
            );
        }
        if let Some(outputs) = &job.outputs {
            raw.insert("outputs".into(), serde_json::to_string(outputs).unwrap());
        }
        if let Some(r2_config) = &job.r2_config {
            raw.insert("r2_config".into(), serde_json::to_string(r2_config).unwrap());
        }
        if let Some(uploaded_at) = &job.uploaded_at {
            raw.insert("uploaded_at".into(), uploaded_at.timestamp_millis().to_string());
        }
        if let Some(queued_at) = &job.queued_at {
            raw.insert("queued_at".into(), queued_at.timestamp_millis().to_string());
        }
        if let Some(started_at) = &job.started_at {
            raw.insert("started_at".into(), started_at.timestamp_millis().to_string());
        }
        if let Some(completed_at) = &job.completed_at {
            raw.insert("completed_at".into(), completed_at.timestamp_millis().to_string());
        }
        raw
    }

    /// Truncate a timestamp to ms so round trips compare equal
    fn ms(stamp: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(stamp.timestamp_millis()).unwrap()
    }

    #[test]
    fn records_round_trip_with_every_field_set() {
        let req = JobRequest {
            job_id: None,
            input_url: "https://u/in.mp4".to_owned(),
            output_url: Some("outputs/j1".to_owned()),
            preset: Preset::HlsAdaptive,
            output_qualities: Some(vec!["1080p".to_owned(), "720p".to_owned()]),
            webhook_url: Some("https://hooks.example/done".to_owned()),
            r2_config: Some(R2Config {
                account_id: "acct".to_owned(),
                access_key_id: "ak".to_owned(),
                secret_access_key: "sk".to_owned(),
                bucket: "custom".to_owned(),
            }),
        };
        let mut job = Job::from_request(req);
        job.machine = Some("m1".to_owned());
        job.duration = Some(41.25);
        job.outputs = Some(vec![JobOutput {
            url: "outputs/j1/720p.m3u8".to_owned(),
            quality: Some("720p".to_owned()),
            size: Some(123),
        }]);
        job.started_at = Some(Utc::now());
        job.completed_at = Some(Utc::now());
        // normalize to ms precision like the store does
        job.created_at = ms(job.created_at);
        job.queued_at = job.queued_at.map(ms);
        job.started_at = job.started_at.map(ms);
        job.completed_at = job.completed_at.map(ms);
        let cast = Job::from_data(flatten(&job)).unwrap();
        assert_eq!(job, cast);
    }

    #[test]
    fn absent_optionals_stay_absent() {
        let req = UploadRequest {
            filename: "v.mp4".to_owned(),
            content_type: None,
            preset: Preset::Default,
            output_qualities: None,
            webhook_url: None,
        };
        let id = Uuid::new_v4();
        let mut job = Job::from_upload(id, format!("inputs/{id}/v.mp4"), req);
        job.created_at = ms(job.created_at);
        let cast = Job::from_data(flatten(&job)).unwrap();
        assert_eq!(cast.input_url, None);
        assert_eq!(cast.outputs, None);
        assert_eq!(cast.uploaded_at, None);
        assert_eq!(cast.queued_at, None);
        assert_eq!(cast.machine, None);
        assert_eq!(job, cast);
    }

    #[test]
    fn records_missing_their_id_are_not_found() {
        let error = Job::from_data(HashMap::default()).unwrap_err();
        assert_eq!(error.code, axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn malformed_composite_fields_are_rejected() {
        let job = Job::from_request(JobRequest {
            job_id: None,
            input_url: "https://u/in.mp4".to_owned(),
            output_url: None,
            preset: Preset::Default,
            output_qualities: None,
            webhook_url: None,
            r2_config: None,
        });
        let mut raw = flatten(&job);
        raw.insert("outputs".into(), "{not json".to_owned());
        let error = Job::from_data(raw).unwrap_err();
        assert_eq!(error.code, axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn direct_submits_default_their_output_prefix() {
        let job = Job::from_request(JobRequest {
            job_id: None,
            input_url: "https://u/in.mp4".to_owned(),
            output_url: None,
            preset: Preset::Default,
            output_qualities: None,
            webhook_url: None,
            r2_config: None,
        });
        assert_eq!(job.output_url, format!("outputs/{}", job.id));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.queued_at.is_some());
    }
}
