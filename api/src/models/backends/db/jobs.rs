//! The redis backed job manager for clipforge

use bb8_redis::redis::cmd;
use chrono::prelude::*;
use std::collections::HashMap;
use tracing::{Level, event, instrument};
use uuid::Uuid;

use super::keys::JobKeys;
use crate::models::{Job, JobOutput, JobStatus};
use crate::utils::{ApiError, Shared};
use crate::{bad, conn, not_found, query, serialize};

/// The reply shape of the claim pipeline in [`pop`]
type ClaimData = (HashMap<String, String>, u64, u64, u64, u64);

/// Builds a [`redis::Pipeline`] with the commands to write a [`Job`] record
///
/// Only fields that are set are written; optional fields stay absent so
/// deserialization can round trip them as `None`.
///
/// # Arguments
///
/// * `pipe` - The Redis [`redis::Pipeline`] to build ontop of
/// * `cast` - The job to write to redis
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
pub fn build<'a>(
    pipe: &'a mut redis::Pipeline,
    cast: &Job,
    shared: &Shared,
) -> Result<&'a mut redis::Pipeline, ApiError> {
    // build the key to this jobs record
    let data = JobKeys::status(&cast.id, shared);
    // write the required fields for this job
    pipe.cmd("hset").arg(&data).arg("id").arg(cast.id.to_string())
        .cmd("hset").arg(&data).arg("status").arg(cast.status.as_str())
        .cmd("hset").arg(&data).arg("output_url").arg(&cast.output_url)
        .cmd("hset").arg(&data).arg("preset").arg(cast.preset.as_str())
        .cmd("hset").arg(&data).arg("retries").arg(cast.retries)
        .cmd("hset").arg(&data).arg("created_at").arg(cast.created_at.timestamp_millis());
    // write the optional scalar fields if they are set
    if let Some(input_key) = &cast.input_key {
        pipe.cmd("hset").arg(&data).arg("input_key").arg(input_key);
    }
    if let Some(input_url) = &cast.input_url {
        pipe.cmd("hset").arg(&data).arg("input_url").arg(input_url);
    }
    if let Some(webhook_url) = &cast.webhook_url {
        pipe.cmd("hset").arg(&data).arg("webhook_url").arg(webhook_url);
    }
    if let Some(machine) = &cast.machine {
        pipe.cmd("hset").arg(&data).arg("machine").arg(machine);
    }
    if let Some(error) = &cast.error {
        pipe.cmd("hset").arg(&data).arg("error").arg(error);
    }
    if let Some(duration) = &cast.duration {
        pipe.cmd("hset").arg(&data).arg("duration").arg(*duration);
    }
    // composite fields are stored as json strings
    if let Some(qualities) = &cast.output_qualities {
        pipe.cmd("hset").arg(&data).arg("output_qualities").arg(serialize!(qualities));
    }
    if let Some(outputs) = &cast.outputs {
        pipe.cmd("hset").arg(&data).arg("outputs").arg(serialize!(outputs));
    }
    if let Some(r2_config) = &cast.r2_config {
        pipe.cmd("hset").arg(&data).arg("r2_config").arg(serialize!(r2_config));
    }
    // timestamps are stored as base 10 ms integers
    if let Some(uploaded_at) = &cast.uploaded_at {
        pipe.cmd("hset").arg(&data).arg("uploaded_at").arg(uploaded_at.timestamp_millis());
    }
    if let Some(queued_at) = &cast.queued_at {
        pipe.cmd("hset").arg(&data).arg("queued_at").arg(queued_at.timestamp_millis());
    }
    if let Some(started_at) = &cast.started_at {
        pipe.cmd("hset").arg(&data).arg("started_at").arg(started_at.timestamp_millis());
    }
    if let Some(completed_at) = &cast.completed_at {
        pipe.cmd("hset").arg(&data).arg("completed_at").arg(completed_at.timestamp_millis());
    }
    // records expire so abandoned jobs eventually age out
    pipe.cmd("expire").arg(&data).arg(shared.config.clipforge.limits.job_status_ttl);
    Ok(pipe)
}

/// Write a job record without queueing it
///
/// This is the upload path; the job sits in `uploading` until its input
/// lands and the event handler queues it.
///
/// # Arguments
///
/// * `job` - The job to write to redis
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::jobs::create", skip_all, fields(job = job.id.to_string()), err(Debug))]
pub async fn create(job: &Job, shared: &Shared) -> Result<(), ApiError> {
    // build the pipeline that writes this jobs record
    let mut pipe = redis::pipe();
    build(&mut pipe, job, shared)?;
    // execute it atomically so readers never see half a record
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Write a job record and add it to the pending queue
///
/// # Arguments
///
/// * `job` - The job to enqueue
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::jobs::enqueue", skip_all, fields(job = job.id.to_string()), err(Debug))]
pub async fn enqueue(job: &Job, shared: &Shared) -> Result<(), ApiError> {
    // the queue score is the moment this job became pending
    let score = job.queued_at.unwrap_or(job.created_at).timestamp_millis();
    // build the pipeline that writes this jobs record
    let mut pipe = redis::pipe();
    build(&mut pipe, job, shared)?;
    // and adds it to the pending queue
    pipe.cmd("zadd")
        .arg(JobKeys::pending(shared))
        .arg(score)
        .arg(job.id.to_string());
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Gets a job from the redis backend
///
/// # Arguments
///
/// * `id` - The id of the job to retrieve
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::jobs::get", skip_all, fields(job = id.to_string()), err(Debug))]
pub async fn get(id: &Uuid, shared: &Shared) -> Result<Job, ApiError> {
    // build key to job data
    let data_key = JobKeys::status(id, shared);
    // get all fields containing our job record
    let raw: HashMap<String, String> = query!(cmd("hgetall").arg(&data_key), shared).await?;
    if raw.contains_key("id") {
        Job::from_data(raw)
    } else {
        not_found!(format!("job {} has no data", &id))
    }
}

/// Gets a job by its raw record key if one still exists
///
/// # Arguments
///
/// * `key` - The full record key to read
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::jobs::get_by_key", skip_all, err(Debug))]
pub async fn get_by_key(key: &str, shared: &Shared) -> Result<Option<Job>, ApiError> {
    // get all fields containing our job record
    let raw: HashMap<String, String> = query!(cmd("hgetall").arg(key), shared).await?;
    if raw.contains_key("id") {
        Ok(Some(Job::from_data(raw)?))
    } else {
        Ok(None)
    }
}

/// Pops the oldest pending job and binds it to a machine
///
/// Returns None when the queue is empty. An orphaned queue member whose
/// record has expired is unbound again and surfaced as a 404 so the worker
/// can poll again.
///
/// # Arguments
///
/// * `machine` - The machine that is claiming a job
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::jobs::pop", skip(shared), err(Debug))]
pub async fn pop(machine: &str, shared: &Shared) -> Result<Option<Job>, ApiError> {
    // claim the pending job with the lowest score
    let raw_claim: Vec<(String, f64)> =
        query!(cmd("zpopmin").arg(JobKeys::pending(shared)), shared).await?;
    // if the queue was empty then there is nothing to do
    let Some((raw_id, _score)) = raw_claim.first() else {
        return Ok(None);
    };
    let id = Uuid::parse_str(raw_id)?;
    let now = Utc::now();
    // build the key to this jobs record
    let data = JobKeys::status(&id, shared);
    // read this jobs record and bind it to this machine in one round trip
    let mut pipe = redis::pipe();
    pipe.cmd("hgetall").arg(&data)
        .cmd("hset").arg(&data).arg("status").arg(JobStatus::Running.as_str())
        .cmd("hset").arg(&data).arg("machine").arg(machine)
        .cmd("hset").arg(&data).arg("started_at").arg(now.timestamp_millis())
        .cmd("hset").arg(JobKeys::active(shared)).arg(id.to_string()).arg(machine);
    let claim: ClaimData = pipe.atomic().query_async(conn!(shared)).await?;
    // an orphaned queue member has no record anymore
    if claim.0.is_empty() {
        // log that we found a job that is missing data
        event!(Level::ERROR, msg = "Missing job data", job = id.to_string());
        // unbind the orphan so it does not linger in the active map
        let mut pipe = redis::pipe();
        pipe.cmd("del").arg(&data)
            .cmd("hdel").arg(JobKeys::active(shared)).arg(id.to_string());
        let _: () = pipe.atomic().query_async(conn!(shared)).await?;
        return not_found!(format!("job {} has no data", id));
    }
    // the record we read predates the claim writes so patch the claim in
    let mut job = Job::from_data(claim.0)?;
    job.status = JobStatus::Running;
    job.machine = Some(machine.to_owned());
    job.started_at = Some(now);
    Ok(Some(job))
}

/// Marks a job completed and unbinds it from its machine
///
/// # Arguments
///
/// * `id` - The id of the job that completed
/// * `outputs` - The outputs this job produced if any were reported
/// * `duration` - How long the transcode took if it was reported
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::jobs::complete", skip(outputs, duration, shared), err(Debug))]
pub async fn complete(
    id: &Uuid,
    outputs: Option<&[JobOutput]>,
    duration: Option<f64>,
    shared: &Shared,
) -> Result<(), ApiError> {
    // build the key to this jobs record
    let data = JobKeys::status(id, shared);
    let mut pipe = redis::pipe();
    pipe.cmd("hset").arg(&data).arg("status").arg(JobStatus::Completed.as_str())
        .cmd("hset").arg(&data).arg("completed_at").arg(Utc::now().timestamp_millis());
    if let Some(outputs) = outputs {
        pipe.cmd("hset").arg(&data).arg("outputs").arg(serialize!(outputs));
    }
    if let Some(duration) = duration {
        pipe.cmd("hset").arg(&data).arg("duration").arg(duration);
    }
    // drop this job from the active map
    pipe.cmd("hdel").arg(JobKeys::active(shared)).arg(id.to_string());
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Marks a job failed and unbinds it from its machine
///
/// # Arguments
///
/// * `id` - The id of the job that failed
/// * `error` - The error this job failed with
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::jobs::fail", skip(error, shared), err(Debug))]
pub async fn fail(id: &Uuid, error: &str, shared: &Shared) -> Result<(), ApiError> {
    // build the key to this jobs record
    let data = JobKeys::status(id, shared);
    let mut pipe = redis::pipe();
    pipe.cmd("hset").arg(&data).arg("status").arg(JobStatus::Failed.as_str())
        .cmd("hset").arg(&data).arg("completed_at").arg(Utc::now().timestamp_millis())
        .cmd("hset").arg(&data).arg("error").arg(error)
        .cmd("hdel").arg(JobKeys::active(shared)).arg(id.to_string());
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Requeues a job unless its retries are exhausted
///
/// Returns false when the job was failed with "Max retries exceeded"
/// instead of being requeued.
///
/// # Arguments
///
/// * `id` - The id of the job to requeue
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::jobs::requeue", skip(shared), err(Debug))]
pub async fn requeue(id: &Uuid, shared: &Shared) -> Result<bool, ApiError> {
    // read the current retry count
    let job = get(id, shared).await?;
    // jobs out of retries fail instead of requeueing
    if job.retries >= shared.config.clipforge.limits.max_job_retries {
        fail(id, "Max retries exceeded", shared).await?;
        return Ok(false);
    }
    let now = Utc::now().timestamp_millis();
    // build the key to this jobs record
    let data = JobKeys::status(id, shared);
    let mut pipe = redis::pipe();
    pipe.cmd("zadd").arg(JobKeys::pending(shared)).arg(now).arg(id.to_string())
        .cmd("hset").arg(&data).arg("status").arg(JobStatus::Pending.as_str())
        .cmd("hset").arg(&data).arg("retries").arg(job.retries + 1)
        .cmd("hset").arg(&data).arg("queued_at").arg(now)
        .cmd("hdel").arg(&data).arg("machine")
        .cmd("hdel").arg(JobKeys::active(shared)).arg(id.to_string());
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(true)
}

/// Moves a stuck uploading job back to pending once its input exists
///
/// The record is re-read inside the pipeline callers build so the sweep can
/// confirm it is still uploading before calling this.
///
/// # Arguments
///
/// * `id` - The id of the job to recover
/// * `input_url` - The canonical url the input can now be downloaded from
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::jobs::recover_upload", skip(input_url, shared), err(Debug))]
pub async fn recover_upload(id: &Uuid, input_url: &str, shared: &Shared) -> Result<(), ApiError> {
    let now = Utc::now().timestamp_millis();
    // build the key to this jobs record
    let data = JobKeys::status(id, shared);
    let mut pipe = redis::pipe();
    pipe.cmd("hset").arg(&data).arg("status").arg(JobStatus::Pending.as_str())
        .cmd("hset").arg(&data).arg("input_url").arg(input_url)
        .cmd("hset").arg(&data).arg("uploaded_at").arg(now)
        .cmd("hset").arg(&data).arg("queued_at").arg(now)
        .cmd("zadd").arg(JobKeys::pending(shared)).arg(now).arg(id.to_string());
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Counts the jobs waiting on a worker
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::jobs::pending_count", skip_all, err(Debug))]
pub async fn pending_count(shared: &Shared) -> Result<u64, ApiError> {
    let count: u64 = query!(cmd("zcard").arg(JobKeys::pending(shared)), shared).await?;
    Ok(count)
}

/// Gets the current binding of in flight jobs to machines
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::jobs::active_jobs", skip_all, err(Debug))]
pub async fn active_jobs(shared: &Shared) -> Result<HashMap<Uuid, String>, ApiError> {
    // read the whole active map
    let raw: HashMap<String, String> = query!(cmd("hgetall").arg(JobKeys::active(shared)), shared).await?;
    // parse the job ids, surfacing corrupt entries instead of hiding them
    let mut active = HashMap::with_capacity(raw.len());
    for (raw_id, machine) in raw {
        match Uuid::parse_str(&raw_id) {
            Ok(id) => {
                active.insert(id, machine);
            }
            Err(error) => {
                return bad!(format!("Corrupt active map entry {}: {}", raw_id, error));
            }
        }
    }
    Ok(active)
}

/// Scan a page of job record keys for the stuck upload sweep
///
/// # Arguments
///
/// * `cursor` - The scan cursor to resume from
/// * `count` - The scan count hint
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::jobs::scan_status_keys", skip(shared), err(Debug))]
pub async fn scan_status_keys(
    cursor: u64,
    count: u64,
    shared: &Shared,
) -> Result<(u64, Vec<String>), ApiError> {
    // match only job record keys under our namespace
    let pattern = format!("{}*", JobKeys::status_prefix(shared));
    let reply: (u64, Vec<String>) = query!(
        cmd("scan")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(count),
        shared
    )
    .await?;
    Ok(reply)
}
