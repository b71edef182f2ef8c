//! Wrappers for interacting with transcode jobs within clipforge
//! Currently only Redis is supported

use chrono::prelude::*;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// The different possible statuses for a transcode job
///
/// Jobs move down the lattice `uploading -> pending -> running` and end in
/// `completed` or `failed`; requeues move `running|failed` back to `pending`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// This job is waiting on its input upload to land
    Uploading,
    /// This job is queued and waiting on a worker
    Pending,
    /// This job has been claimed and is transcoding
    Running,
    /// This job has completed
    Completed,
    /// This job has failed due to an error
    Failed,
}

impl JobStatus {
    /// Get this status as its wire token
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Uploading => "uploading",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Try to parse a status from its wire token
    ///
    /// `queued` is accepted as a synonym for `pending` at the upload event
    /// boundary.
    ///
    /// # Arguments
    ///
    /// * `raw` - The raw token to parse
    #[must_use]
    pub fn from_token(raw: &str) -> Option<Self> {
        match raw {
            "uploading" => Some(JobStatus::Uploading),
            "pending" | "queued" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Whether this status is terminal
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The transcode presets clipforge understands
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum Preset {
    /// A single mp4 at the source quality
    #[serde(rename = "default")]
    Default,
    /// A single web optimized mp4
    #[serde(rename = "web-optimized")]
    WebOptimized,
    /// A single quality hls rendition
    #[serde(rename = "hls")]
    Hls,
    /// A multi quality adaptive hls ladder
    #[serde(rename = "hls-adaptive")]
    HlsAdaptive,
}

impl Default for Preset {
    /// Default to the plain mp4 preset
    fn default() -> Self {
        Preset::Default
    }
}

impl Preset {
    /// Get this preset as its wire token
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Default => "default",
            Preset::WebOptimized => "web-optimized",
            Preset::Hls => "hls",
            Preset::HlsAdaptive => "hls-adaptive",
        }
    }

    /// Try to parse a preset from its wire token
    ///
    /// # Arguments
    ///
    /// * `raw` - The raw token to parse
    #[must_use]
    pub fn from_token(raw: &str) -> Option<Self> {
        match raw {
            "default" => Some(Preset::Default),
            "web-optimized" => Some(Preset::WebOptimized),
            "hls" => Some(Preset::Hls),
            "hls-adaptive" => Some(Preset::HlsAdaptive),
            _ => None,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One output a worker produced for a job
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    /// The url this output was written to
    pub url: String,
    /// The quality label for this output if the preset has a ladder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// The size of this output in bytes if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A per job object store override
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct R2Config {
    /// The account id outputs should be written under
    pub account_id: String,
    /// The access key to authenticate with
    pub access_key_id: String,
    /// The secret key to authenticate with
    pub secret_access_key: String,
    /// The bucket outputs should be written to
    pub bucket: String,
}

/// A single transcode job
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// The stable unique id for this job
    pub id: Uuid,
    /// The current status of this job
    pub status: JobStatus,
    /// The object store key the input was or will be uploaded to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_key: Option<String>,
    /// The url the input can be downloaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_url: Option<String>,
    /// The url prefix outputs are written under
    pub output_url: String,
    /// The preset this job transcodes with
    pub preset: Preset,
    /// The ordered quality ladder for multi output presets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_qualities: Option<Vec<String>>,
    /// The url to post this jobs completion webhook to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// The outputs this job produced on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<JobOutput>>,
    /// The error this job failed with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How many times this job has been requeued
    #[serde(default)]
    pub retries: u64,
    /// The machine currently bound to this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    /// How long this jobs transcode took in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// A per job object store override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2_config: Option<R2Config>,
    /// When this job was created
    pub created_at: DateTime<Utc>,
    /// When this jobs input upload landed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    /// When this job entered the pending queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    /// When a worker claimed this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When this job reached a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A request to enqueue a job directly by input url
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// The id to create this job under for idempotent resubmits
    #[serde(default)]
    pub job_id: Option<Uuid>,
    /// The url the input can be downloaded from
    pub input_url: String,
    /// The url prefix outputs should be written under
    #[serde(default)]
    pub output_url: Option<String>,
    /// The preset to transcode with
    #[serde(default)]
    pub preset: Preset,
    /// The ordered quality ladder for multi output presets
    #[serde(default)]
    pub output_qualities: Option<Vec<String>>,
    /// The url to post this jobs completion webhook to
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// A per job object store override
    #[serde(default)]
    pub r2_config: Option<R2Config>,
}

/// The response to a newly enqueued job
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobCreated {
    /// The id this job was created under
    pub job_id: Uuid,
    /// The status this job was created in
    pub status: JobStatus,
}

/// A request for a presigned upload that creates a job
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// The name of the file that will be uploaded
    pub filename: String,
    /// The content type the upload will carry
    #[serde(default)]
    pub content_type: Option<String>,
    /// The preset to transcode with once the upload lands
    #[serde(default)]
    pub preset: Preset,
    /// The ordered quality ladder for multi output presets
    #[serde(default)]
    pub output_qualities: Option<Vec<String>>,
    /// The url to post this jobs completion webhook to
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// The response to an upload request
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// The id the job was created under
    pub job_id: Uuid,
    /// The presigned url to PUT the input to
    pub upload_url: String,
    /// The key the upload will land at
    pub key: String,
    /// When the presigned url expires
    pub expires_at: DateTime<Utc>,
}

/// The webhook body workers post when a job reaches a terminal status
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobCompleteWebhook {
    /// The id of the job that finished
    pub job_id: Uuid,
    /// The terminal status this job reached
    pub status: JobStatus,
    /// The url the input was downloaded from
    #[serde(default)]
    pub input_url: Option<String>,
    /// The outputs this job produced
    #[serde(default)]
    pub outputs: Vec<JobOutput>,
    /// The error this job failed with
    #[serde(default)]
    pub error: Option<String>,
    /// How long this jobs transcode took in seconds
    #[serde(default)]
    pub duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tokens_round_trip() {
        for status in [
            JobStatus::Uploading,
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_token(status.as_str()), Some(status));
        }
        // queued is a synonym for pending at the event boundary
        assert_eq!(JobStatus::from_token("queued"), Some(JobStatus::Pending));
        assert_eq!(JobStatus::from_token("sleeping"), None);
    }

    #[test]
    fn preset_tokens_round_trip() {
        for preset in [
            Preset::Default,
            Preset::WebOptimized,
            Preset::Hls,
            Preset::HlsAdaptive,
        ] {
            assert_eq!(Preset::from_token(preset.as_str()), Some(preset));
        }
        assert_eq!(Preset::from_token("4k-remaster"), None);
    }

    #[test]
    fn job_records_render_camel_case_json() {
        let job = Job::from_request(JobRequest {
            job_id: None,
            input_url: "https://u/in.mp4".to_owned(),
            output_url: None,
            preset: Preset::Default,
            output_qualities: None,
            webhook_url: None,
            r2_config: None,
        });
        let raw = serde_json::to_value(&job).unwrap();
        assert!(raw.get("inputUrl").is_some());
        assert!(raw.get("outputUrl").is_some());
        assert!(raw.get("createdAt").is_some());
        assert_eq!(raw["status"], "pending");
        // absent optionals are omitted entirely
        assert!(raw.get("outputs").is_none());
        assert!(raw.get("error").is_none());
        assert!(raw.get("machine").is_none());
    }

    #[test]
    fn webhook_body_uses_camel_case() {
        let body = JobCompleteWebhook {
            job_id: Uuid::new_v4(),
            status: JobStatus::Completed,
            input_url: Some("https://acct.r2.example/in.mp4".to_owned()),
            outputs: vec![JobOutput {
                url: "outputs/j1/720p.mp4".to_owned(),
                quality: Some("720p".to_owned()),
                size: None,
            }],
            error: None,
            duration: Some(12.5),
        };
        let raw = serde_json::to_value(&body).unwrap();
        assert_eq!(raw["status"], "completed");
        assert!(raw.get("jobId").is_some());
        assert!(raw.get("inputUrl").is_some());
        assert_eq!(raw["outputs"][0]["quality"], "720p");
    }
}
