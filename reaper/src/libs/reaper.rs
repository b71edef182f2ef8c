//! Stops idle machines and rescues stuck uploads on a schedule
//!
//! Every sweep is best effort: per entry failures are logged and skipped
//! so one bad record never wedges the cron.

use chrono::prelude::*;
use clipforge::models::backends::db;
use clipforge::models::{Job, JobStatus, MachineState};
use clipforge::utils::{ApiError, Shared};
use clipforge::{Conf, log_err, spawner};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{Level, event, instrument};

use super::Tasks;
use crate::from_now;

/// The error a job with no input key fails with
const NO_INPUT_KEY: &str = "Upload never completed (no input key)";

/// The error a very old job with a missing object fails with
const NEVER_LANDED: &str = "Upload never completed (file not found after extended wait)";

/// The reaper that sweeps the pool and the job records
pub struct Reaper {
    /// The shared clipforge objects
    shared: Shared,
    /// The tasks to run at specific times
    tasks: BTreeMap<DateTime<Utc>, Tasks>,
}

impl Reaper {
    /// Build a new reaper
    ///
    /// # Arguments
    ///
    /// * `conf` - The clipforge config
    #[instrument(name = "Reaper::new", skip_all)]
    pub async fn new(conf: Conf) -> Self {
        // build our task queue before conf moves into shared
        let tasks = Tasks::setup_queue(&conf);
        // connect to the state store
        let shared = Shared::new(conf).await;
        Reaper { shared, tasks }
    }

    /// Stop every machine that has idled past the timeout
    ///
    /// Failures are logged and skipped; they do not abort the loop.
    #[instrument(name = "Reaper::idle_stop", skip_all, err(Debug))]
    async fn idle_stop(&self) -> Result<(), ApiError> {
        let timeout = self.shared.config.clipforge.limits.idle_timeout_ms as i64;
        // read our current view of the pool
        let pool = db::machines::pool(&self.shared).await?;
        for (machine, entry) in pool {
            // only idle machines past the timeout are stopped
            if entry.state != MachineState::Idle || entry.idle_ms() < timeout {
                continue;
            }
            match db::machines::stop_machine(&machine, &self.shared).await {
                Ok(()) => event!(Level::INFO, stopped = machine.as_str()),
                Err(error) => {
                    // skip this machine and keep sweeping
                    event!(
                        Level::ERROR,
                        msg = "Failed to stop idle machine",
                        machine = machine.as_str(),
                        error = error.msg()
                    );
                }
            }
        }
        Ok(())
    }

    /// Decide what to do with one possibly stuck job record
    ///
    /// # Arguments
    ///
    /// * `job` - The job record the scan surfaced
    #[instrument(name = "Reaper::check_upload", skip_all, fields(job = job.id.to_string()))]
    async fn check_upload(&self, job: Job) {
        // only uploading jobs past the presigned window are stuck
        if job.status != JobStatus::Uploading {
            return;
        }
        let age = (Utc::now() - job.created_at).num_milliseconds();
        let threshold = self.shared.config.clipforge.limits.stuck_upload_threshold_ms();
        if age < threshold {
            return;
        }
        // a job with no input key can never complete its upload
        let Some(key) = job.input_key.as_deref().filter(|key| !key.is_empty()) else {
            log_err!(Job::fail(&job.id, NO_INPUT_KEY, &self.shared).await);
            return;
        };
        // probe the object store for the input
        match self.shared.s3.inputs.exists(key).await {
            Ok(true) => {
                // the upload landed but its event was lost; confirm the
                // record is still uploading before queueing it
                match Job::get(&job.id, &self.shared).await {
                    Ok(current) if current.status == JobStatus::Uploading => {
                        let input_url = self.shared.s3.inputs.object_url(key);
                        if log_err!(
                            db::jobs::recover_upload(&job.id, &input_url, &self.shared).await
                        )
                        .is_some()
                        {
                            event!(Level::INFO, recovered = true);
                            // kick a worker for the freshly queued job
                            log_err!(spawner::maybe_spawn_worker(&self.shared).await);
                        }
                    }
                    // someone else already moved this job along
                    Ok(_) => (),
                    Err(error) => {
                        event!(Level::ERROR, msg = "Re-read failed", error = error.msg());
                    }
                }
            }
            Ok(false) => {
                // very old uploads with no object are never coming
                if age >= threshold * 2 {
                    log_err!(Job::fail(&job.id, NEVER_LANDED, &self.shared).await);
                }
            }
            Err(error) => {
                event!(Level::ERROR, msg = "Probe failed", error = error.msg());
            }
        }
    }

    /// Scan a bounded page of job records for stuck uploads
    ///
    /// The scan cursor is durable so an unfinished pass resumes on the
    /// next tick instead of starting over.
    #[instrument(name = "Reaper::stuck_uploads", skip_all, err(Debug))]
    async fn stuck_uploads(&self) -> Result<(), ApiError> {
        let limit = self.shared.config.clipforge.reaper.sweep_limit;
        // resume from wherever the last tick stopped
        let mut cursor = db::cursors::get_uploading_sweep(&self.shared).await?;
        let mut checked = 0;
        loop {
            let (next, keys) = db::jobs::scan_status_keys(cursor, 50, &self.shared).await?;
            cursor = next;
            for key in keys {
                checked += 1;
                // bad records are logged and skipped, never fatal
                match db::jobs::get_by_key(&key, &self.shared).await {
                    Ok(Some(job)) => self.check_upload(job).await,
                    Ok(None) => (),
                    Err(error) => {
                        event!(
                            Level::ERROR,
                            msg = "Unreadable job record",
                            key = key.as_str(),
                            error = error.msg()
                        );
                    }
                }
            }
            // a zero cursor means the scan wrapped; a full page means
            // this tick has done its share
            if cursor == 0 || checked >= limit {
                break;
            }
        }
        db::cursors::save_uploading_sweep(cursor, &self.shared).await?;
        event!(Level::INFO, checked, cursor);
        Ok(())
    }

    /// Reconcile the pool map against the provider
    #[instrument(name = "Reaper::pool_sync", skip_all, err(Debug))]
    async fn pool_sync(&self) -> Result<(), ApiError> {
        db::machines::sync_pool(&self.shared).await
    }

    /// Execute one task, logging instead of propagating failures
    ///
    /// # Arguments
    ///
    /// * `task` - The task to execute
    #[instrument(name = "Reaper::execute", skip_all, fields(task = task.as_str()))]
    async fn execute(&self, task: Tasks) {
        let result = match task {
            Tasks::IdleStop => self.idle_stop().await,
            Tasks::StuckUploads => self.stuck_uploads().await,
            Tasks::PoolSync => self.pool_sync().await,
        };
        // the reaper never propagates; sweeps log and continue
        if let Err(error) = result {
            event!(
                Level::ERROR,
                msg = "Task failed",
                task = task.as_str(),
                error = error.msg()
            );
        }
    }

    /// Run every scheduled task once and return
    ///
    /// This is the entrypoint external schedulers use.
    pub async fn run_once(&mut self) {
        // drain the whole queue in schedule order
        let tasks: Vec<Tasks> = self.tasks.values().copied().collect();
        self.tasks.clear();
        for task in tasks {
            self.execute(task).await;
        }
    }

    /// Start the reaper loop
    pub async fn start(&mut self) {
        loop {
            // find every task that is due
            let now = Utc::now();
            let due: Vec<DateTime<Utc>> = self
                .tasks
                .range(..=now)
                .map(|(when, _)| *when)
                .collect();
            for when in due {
                let Some(task) = self.tasks.remove(&when) else {
                    continue;
                };
                self.execute(task).await;
                // reschedule this task in the next open slot
                let mut start = from_now!(task.delay(&self.shared.config));
                loop {
                    if !self.tasks.contains_key(&start) {
                        break;
                    }
                    // bump by 1 second until we find an open slot
                    start += chrono::Duration::seconds(1);
                }
                self.tasks.insert(start, task);
            }
            // sleep before checking the schedule again
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}
