//! The observability models for the clipforge api

use utoipa::ToSchema;
use uuid::Uuid;

/// The admission controllers view of the machine pool
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStats {
    /// The advisory count of currently held machine slots
    pub active_machines: u64,
    /// The hard cap on pool size
    pub max_machines: u64,
}

/// A snapshot of queue and pool state for operators
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    /// The admission controllers machine stats
    pub machines: AdmissionStats,
    /// How many jobs are waiting on a worker
    pub pending_jobs: u64,
    /// How many jobs are currently bound to workers
    pub active_jobs: u64,
    /// The ids of the jobs currently bound to workers
    pub active_job_ids: Vec<Uuid>,
}

/// The health report for the clipforge api
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Whether the state store answered a ping
    pub ping: bool,
    /// Whether an echoed read came back intact
    pub echo: bool,
}

impl StatusReport {
    /// Whether every check passed
    #[must_use]
    pub fn healthy(&self) -> bool {
        self.ping && self.echo
    }
}
