//! The opaque transcode runner workers execute jobs through
//!
//! The worker knows nothing about codecs; it hands the job spec to a
//! runner and records whatever outputs come back.

use async_trait::async_trait;
use clipforge::models::{Job, JobOutput};
use clipforge::utils::ApiError;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::instrument;

/// The outcome a runner reports for one job
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunnerOutcome {
    /// The outputs this transcode produced
    pub outputs: Vec<JobOutput>,
    /// How long the transcode took in seconds if the runner timed it
    #[serde(default)]
    pub duration: Option<f64>,
}

/// A transcode runner the worker can drive
#[async_trait]
pub trait Runner {
    /// Run one job to completion
    ///
    /// # Arguments
    ///
    /// * `job` - The job to transcode
    /// * `scratch` - A scratch dir scoped to this job
    async fn run(&self, job: &Job, scratch: &Path) -> Result<RunnerOutcome, ApiError>;
}

/// A runner that drives an external transcoder command
///
/// The job spec is written to the commands stdin as json and the outcome
/// is read back from its stdout, so media bytes and credentials never
/// cross argv.
pub struct CommandRunner {
    /// The command to invoke for each job
    cmd: String,
}

impl CommandRunner {
    /// Create a new command runner
    ///
    /// # Arguments
    ///
    /// * `cmd` - The command to invoke for each job
    #[must_use]
    pub fn new<T: Into<String>>(cmd: T) -> Self {
        CommandRunner { cmd: cmd.into() }
    }
}

#[async_trait]
impl Runner for CommandRunner {
    /// Run one job through the external transcoder
    ///
    /// # Arguments
    ///
    /// * `job` - The job to transcode
    /// * `scratch` - A scratch dir scoped to this job
    #[instrument(name = "CommandRunner::run", skip_all, fields(job = job.id.to_string()), err(Debug))]
    async fn run(&self, job: &Job, scratch: &Path) -> Result<RunnerOutcome, ApiError> {
        // serialize the job spec for the transcoder
        let payload = serde_json::to_string(job)?;
        // spawn the transcoder with its scratch dir as its only arg
        let mut child = Command::new(&self.cmd)
            .arg(scratch)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        // hand the job spec over on stdin
        match child.stdin.take() {
            Some(mut stdin) => {
                stdin.write_all(payload.as_bytes()).await?;
                // close stdin so the transcoder sees eof
                drop(stdin);
            }
            None => {
                return clipforge::internal_err!("Transcoder stdin was not piped".to_owned());
            }
        }
        // wait for the transcode to finish
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            // surface the tail of stderr as this jobs error
            let stderr = String::from_utf8_lossy(&output.stderr);
            let skip = stderr.chars().count().saturating_sub(512);
            let tail: String = stderr.chars().skip(skip).collect();
            return clipforge::internal_err!(format!(
                "Transcoder exited with {}: {}",
                output.status, tail
            ));
        }
        // the transcoder reports its outcome as json on stdout
        match serde_json::from_slice::<RunnerOutcome>(&output.stdout) {
            Ok(outcome) => Ok(outcome),
            Err(error) => clipforge::internal_err!(format!(
                "Transcoder reported an unreadable outcome: {}",
                error
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_parse_without_a_duration() {
        let raw = r#"{"outputs": [{"url": "outputs/j1/720p.mp4", "quality": "720p"}]}"#;
        let outcome: RunnerOutcome = serde_json::from_str(raw).unwrap();
        assert_eq!(outcome.outputs.len(), 1);
        assert_eq!(outcome.outputs[0].quality.as_deref(), Some("720p"));
        assert_eq!(outcome.duration, None);
    }

    #[test]
    fn outcomes_parse_with_a_duration() {
        let raw = r#"{"outputs": [], "duration": 41.25}"#;
        let outcome: RunnerOutcome = serde_json::from_str(raw).unwrap();
        assert!(outcome.outputs.is_empty());
        assert_eq!(outcome.duration, Some(41.25));
    }
}
