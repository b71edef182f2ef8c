//! The models used by clipforge and its services

pub mod backends;
mod events;
mod jobs;
mod machines;
mod system;

pub use events::{EventAction, UploadEvent};
pub use jobs::{
    Job, JobCompleteWebhook, JobCreated, JobOutput, JobRequest, JobStatus, Preset, R2Config,
    UploadRequest, UploadResponse,
};
pub use machines::{MachinePoolEntry, MachineState};
pub use system::{AdmissionStats, StatusReport, SystemStats};
