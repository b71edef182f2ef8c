//! The worker that claims and executes transcode jobs

use clipforge::models::backends::db;
use clipforge::models::{Job, JobCompleteWebhook, JobOutput, JobStatus, MachineState};
use clipforge::utils::{ApiError, Shared, StatusCode};
use clipforge::{Conf, log_err};
use futures::{poll, task::Poll};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{Level, event, instrument, span};

use super::runner::{CommandRunner, Runner};
use crate::args::Args;

/// Helps default the transcoder command when none is configured
const DEFAULT_RUNNER_CMD: &str = "clipforge-runner";

/// A worker used to execute transcode jobs
pub struct Worker {
    /// The shared clipforge objects
    shared: Shared,
    /// The machine id this worker is running as
    pub machine: String,
    /// The runner jobs are executed through
    runner: Box<dyn Runner + Send + Sync>,
    /// The client completion webhooks are posted with
    client: reqwest::Client,
    /// How many jobs this worker has completed
    total_completed: u64,
    /// How many jobs this worker has failed
    total_failed: u64,
}

impl Worker {
    /// Build a new worker and join the machine pool
    ///
    /// # Arguments
    ///
    /// * `args` - Arguments passed to the worker
    /// * `conf` - The clipforge config
    #[instrument(name = "Worker::new", skip_all, err(Debug))]
    pub async fn new(args: &Args, conf: Conf) -> Result<Self, ApiError> {
        // build the runner this worker will execute jobs through
        let cmd = conf
            .clipforge
            .worker
            .runner_cmd
            .clone()
            .unwrap_or_else(|| DEFAULT_RUNNER_CMD.to_owned());
        // connect to the state store
        let shared = Shared::new(conf).await;
        let machine = args.machine_id();
        // join the pool; re-adding an existing machine just refreshes it
        db::machines::add_to_pool(&machine, &shared).await?;
        event!(Level::INFO, machine = machine.as_str(), runner = cmd.as_str());
        let worker = Worker {
            shared,
            machine,
            runner: Box::new(CommandRunner::new(cmd)),
            client: reqwest::Client::new(),
            total_completed: 0,
            total_failed: 0,
        };
        Ok(worker)
    }

    /// Post a jobs completion webhook if it has somewhere to go
    ///
    /// The jobs own webhook url wins; otherwise the orchestrators webhook
    /// route is used so the control plane still sees the outcome. Webhook
    /// failures are logged, never fatal.
    ///
    /// # Arguments
    ///
    /// * `job` - The job that reached a terminal status
    /// * `status` - The terminal status it reached
    /// * `outputs` - The outputs it produced
    /// * `error` - The error it failed with
    /// * `duration` - How long its transcode took
    #[instrument(name = "Worker::send_webhook", skip_all, fields(job = job.id.to_string()))]
    async fn send_webhook(
        &self,
        job: &Job,
        status: JobStatus,
        outputs: &[JobOutput],
        error: Option<&str>,
        duration: Option<f64>,
    ) {
        // figure out where this webhook goes
        let base = &self.shared.config.clipforge.webhooks.base_url;
        let url = match &job.webhook_url {
            Some(url) => url.clone(),
            None if !base.is_empty() => {
                format!("{}/api/webhooks/job-complete", base.trim_end_matches('/'))
            }
            None => return,
        };
        // build the webhook body
        let body = JobCompleteWebhook {
            job_id: job.id,
            status,
            input_url: job.input_url.clone(),
            outputs: outputs.to_vec(),
            error: error.map(str::to_owned),
            duration,
        };
        // post it, logging any failure
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if !resp.status().is_success() => {
                event!(
                    Level::ERROR,
                    msg = "Webhook rejected",
                    code = resp.status().as_u16()
                );
            }
            Ok(_) => (),
            Err(error) => {
                event!(
                    Level::ERROR,
                    msg = "Webhook failed",
                    error = error.to_string()
                );
            }
        }
    }

    /// Execute one claimed job through the runner and record its outcome
    ///
    /// # Arguments
    ///
    /// * `job` - The job to execute
    #[instrument(name = "Worker::process", skip_all, fields(job = job.id.to_string()))]
    async fn process(&mut self, job: Job) {
        // we are actively working so mark ourselves running
        log_err!(db::machines::update_state(&self.machine, MachineState::Running, &self.shared).await);
        // give this job its own scratch dir
        let scratch =
            PathBuf::from(&self.shared.config.clipforge.worker.scratch_dir).join(job.id.to_string());
        if let Err(error) = tokio::fs::create_dir_all(&scratch).await {
            // without scratch space this job cannot run here
            let msg = format!("Failed to create scratch dir: {error}");
            self.send_webhook(&job, JobStatus::Failed, &[], Some(&msg), None).await;
            log_err!(Job::fail(&job.id, &msg, &self.shared).await);
            self.total_failed += 1;
            return;
        }
        // time the transcode ourselves in case the runner does not
        let started = Instant::now();
        match self.runner.run(&job, &scratch).await {
            Ok(outcome) => {
                let duration = outcome
                    .duration
                    .or_else(|| Some(started.elapsed().as_secs_f64()));
                // the webhook goes out before the record flips so callers
                // polling on the webhook never see a half written record
                self.send_webhook(&job, JobStatus::Completed, &outcome.outputs, None, duration)
                    .await;
                log_err!(
                    Job::complete(&job.id, Some(&outcome.outputs), duration, &self.shared).await
                );
                self.total_completed += 1;
                event!(Level::INFO, completed = self.total_completed, failed = self.total_failed);
            }
            Err(error) => {
                let msg = error.msg();
                self.send_webhook(&job, JobStatus::Failed, &[], Some(&msg), None).await;
                log_err!(Job::fail(&job.id, &msg, &self.shared).await);
                self.total_failed += 1;
                event!(Level::ERROR, msg = "Job failed", error = msg);
            }
        }
        // clean up this jobs scratch space
        if let Err(error) = tokio::fs::remove_dir_all(&scratch).await {
            event!(
                Level::DEBUG,
                msg = "Failed to remove scratch dir",
                error = error.to_string()
            );
        }
    }

    /// Starts the worker loop
    ///
    /// The loop only stops between jobs; a job in flight always runs to
    /// completion before teardown.
    #[instrument(name = "Worker::start", skip_all, err(Debug))]
    pub async fn start(&mut self) -> Result<(), ApiError> {
        let idle = Duration::from_millis(self.shared.config.clipforge.limits.poll_interval_ms);
        // arm our shutdown signal once for the whole loop
        let mut shutdown = Box::pin(tokio::signal::ctrl_c());
        loop {
            // check for a shutdown between jobs; a claim in flight always
            // runs to completion so a popped job is never orphaned
            if let Poll::Ready(_) = poll!(&mut shutdown) {
                break;
            }
            let claimed = Job::pop(&self.machine, &self.shared).await;
            match claimed {
                // we claimed a job so run it to completion
                Ok(Some(job)) => self.process(job).await,
                // the queue is empty so go idle and wait
                Ok(None) => {
                    log_err!(
                        db::machines::update_state(&self.machine, MachineState::Idle, &self.shared)
                            .await
                    );
                    tokio::select! {
                        _ = &mut shutdown => break,
                        () = tokio::time::sleep(idle) => (),
                    }
                }
                // an orphaned queue member was pruned so poll again now
                Err(error) if error.code == StatusCode::NOT_FOUND => continue,
                // infrastructure errors abort this iteration only
                Err(error) => {
                    event!(Level::ERROR, msg = "Claim failed", error = error.msg());
                    tokio::select! {
                        _ = &mut shutdown => break,
                        () = tokio::time::sleep(idle) => (),
                    }
                }
            }
        }
        // ordered teardown: stop claiming and hand our seat to the reaper
        let span = span!(Level::INFO, "Worker Teardown");
        if let Err(error) =
            db::machines::update_state(&self.machine, MachineState::Idle, &self.shared).await
        {
            event!(parent: &span, Level::ERROR, msg = "Teardown failed", error = error.msg());
        }
        event!(
            parent: &span,
            Level::INFO,
            completed = self.total_completed,
            failed = self.total_failed
        );
        Ok(())
    }
}
