//! The worker for handling upload events

use clipforge::models::backends::db;
use clipforge::models::backends::db::events::PoppedEvent;
use clipforge::models::{Job, JobStatus};
use clipforge::utils::{ApiError, Shared, StatusCode};
use clipforge::{log_err, spawner};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, event, instrument};
use uuid::Uuid;

/// A worker for handling upload events
pub struct EventWorker {
    /// A shared clipforge object
    shared: Arc<Shared>,
    /// The max number of events to pop in one batch
    batch: u64,
    /// Track the total number of events handled
    total_seen: usize,
    /// Track the total number of jobs queued by events
    total_queued: usize,
    /// Track the total number of events that had to be retried
    total_retried: usize,
}

impl EventWorker {
    /// Create a new worker
    ///
    /// # Arguments
    ///
    /// * `shared` - A shared clipforge object
    /// * `batch` - The max number of events to pop in one batch
    pub fn new(shared: &Arc<Shared>, batch: u64) -> Self {
        EventWorker {
            shared: shared.clone(),
            batch,
            total_seen: 0,
            total_queued: 0,
            total_retried: 0,
        }
    }

    /// Handle one upload event
    ///
    /// Returns whether this event queued a job. Skips are acked like
    /// successes; only store errors bubble up for a retry.
    ///
    /// # Arguments
    ///
    /// * `popped` - The popped event to handle
    #[instrument(name = "EventWorker::handle", skip_all, err(Debug))]
    async fn handle(&self, popped: &PoppedEvent) -> Result<bool, ApiError> {
        let cast = &popped.event;
        // only creations on the input bucket move jobs along
        if !cast.is_input_upload(&self.shared.config.object_store.input_bucket) {
            return Ok(false);
        }
        // keys without a job id segment are not ours
        let Some(raw_id) = cast.job_id() else {
            return Ok(false);
        };
        // a segment that is not a job id is logged and skipped
        let Ok(id) = Uuid::parse_str(raw_id) else {
            event!(Level::WARN, msg = "Unparseable job id in key", key = cast.key.as_str());
            return Ok(false);
        };
        // the canonical url workers will download the input from
        let input_url = self
            .shared
            .config
            .object_store
            .object_url(&cast.bucket, &cast.key);
        match Job::get(&id, &self.shared).await {
            Ok(existing) => {
                // redelivered events for jobs already running or done are
                // acked without requeueing them
                if !matches!(existing.status, JobStatus::Uploading | JobStatus::Pending) {
                    event!(
                        Level::INFO,
                        msg = "Skipping event for settled job",
                        job = id.to_string(),
                        status = existing.status.as_str()
                    );
                    return Ok(false);
                }
                // the upload landed so queue this job
                db::jobs::recover_upload(&id, &input_url, &self.shared).await?;
            }
            // uploads with no prior record get a fresh default job
            Err(error) if error.code == StatusCode::NOT_FOUND => {
                let job = Job::from_event(id, cast, input_url);
                job.enqueue(&self.shared).await?;
            }
            Err(error) => return Err(error),
        }
        // spawning is best effort once the job is queued
        log_err!(spawner::maybe_spawn_worker(&self.shared).await);
        Ok(true)
    }

    /// The hot loop for an event handler worker
    ///
    /// Returns whether any events were handled this pass.
    #[instrument(name = "EventWorker::hot_loop", skip_all, err(Debug))]
    async fn hot_loop(&mut self) -> Result<bool, ApiError> {
        // try to get some events to handle
        let popped = db::events::pop(self.batch, &self.shared).await?;
        if popped.is_empty() {
            return Ok(false);
        }
        self.total_seen = self.total_seen.saturating_add(popped.len());
        // handle each event, acking successes and retrying failures
        for message in &popped {
            match self.handle(message).await {
                Ok(queued) => {
                    db::events::ack(message, &self.shared).await?;
                    if queued {
                        self.total_queued = self.total_queued.saturating_add(1);
                    }
                }
                Err(error) => {
                    // nak the message so the queue delivers it again
                    event!(
                        Level::ERROR,
                        msg = "Event failed, retrying",
                        error = error.msg()
                    );
                    db::events::nak(message, &self.shared).await?;
                    self.total_retried = self.total_retried.saturating_add(1);
                }
            }
        }
        // log the current worker stats
        event!(
            Level::INFO,
            seen = self.total_seen,
            queued = self.total_queued,
            retried = self.total_retried
        );
        Ok(true)
    }

    /// Start scanning and handling upload events
    pub async fn start(mut self) -> Result<(), ApiError> {
        // replay anything a crashed handler left in flight
        db::events::reset_all(&self.shared).await?;
        // keep looping and handling events
        loop {
            let got_events = self.hot_loop().await?;
            // if the queue was empty sleep before polling again
            if !got_events {
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
        }
    }
}
