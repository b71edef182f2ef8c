//! The object store notifications clipforge turns into job transitions

use chrono::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use utoipa::ToSchema;

/// Matches the job id segment of an input or output object key
static JOB_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:inputs|outputs)/([^/]+)/").expect("Invalid job key regex"));

/// The object store actions a notification can carry
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum EventAction {
    /// An object was written in one shot
    PutObject,
    /// An object was copied into the bucket
    CopyObject,
    /// A multipart upload finished assembling an object
    CompleteMultipartUpload,
    /// An object was deleted
    DeleteObject,
}

impl EventAction {
    /// Whether this action created a whole new object
    #[must_use]
    pub fn is_creation(self) -> bool {
        matches!(
            self,
            EventAction::PutObject | EventAction::CompleteMultipartUpload
        )
    }
}

/// One object store notification message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    /// The bucket this event fired in
    pub bucket: String,
    /// The key this event fired for
    pub key: String,
    /// The action that fired this event
    pub action: EventAction,
    /// The size of the object if the notification carried one
    #[serde(default)]
    pub object_size: Option<u64>,
    /// The etag of the object if the notification carried one
    #[serde(default)]
    pub e_tag: Option<String>,
    /// When this event fired
    pub event_time: DateTime<Utc>,
}

impl UploadEvent {
    /// Extract the job id segment from this events key if one exists
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        JOB_KEY_RE
            .captures(&self.key)
            .and_then(|caps| caps.get(1))
            .map(|found| found.as_str())
    }

    /// Whether this event should transition a job on the given input bucket
    ///
    /// # Arguments
    ///
    /// * `input_bucket` - The bucket uploads are expected to land in
    #[must_use]
    pub fn is_input_upload(&self, input_bucket: &str) -> bool {
        self.action.is_creation() && self.bucket == input_bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a test event for a key/action pair
    fn event(bucket: &str, key: &str, action: EventAction) -> UploadEvent {
        UploadEvent {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            action,
            object_size: Some(1024),
            e_tag: None,
            event_time: Utc::now(),
        }
    }

    #[test]
    fn job_ids_come_from_the_key_prefix() {
        let put = event("in", "inputs/j2/v.mp4", EventAction::PutObject);
        assert_eq!(put.job_id(), Some("j2"));
        let out = event("out", "outputs/j9/720p.mp4", EventAction::PutObject);
        assert_eq!(out.job_id(), Some("j9"));
        // keys without the prefix or a second segment never match
        assert_eq!(event("in", "v.mp4", EventAction::PutObject).job_id(), None);
        assert_eq!(
            event("in", "inputs/dangling", EventAction::PutObject).job_id(),
            None
        );
        assert_eq!(
            event("in", "uploads/j2/v.mp4", EventAction::PutObject).job_id(),
            None
        );
    }

    #[test]
    fn only_creations_on_the_input_bucket_count() {
        let key = "inputs/j2/v.mp4";
        assert!(event("in", key, EventAction::PutObject).is_input_upload("in"));
        assert!(event("in", key, EventAction::CompleteMultipartUpload).is_input_upload("in"));
        assert!(!event("in", key, EventAction::CopyObject).is_input_upload("in"));
        assert!(!event("in", key, EventAction::DeleteObject).is_input_upload("in"));
        assert!(!event("other", key, EventAction::PutObject).is_input_upload("in"));
    }
}
