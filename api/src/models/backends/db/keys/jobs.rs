//! The keys to store/retrieve job data/queues

use uuid::Uuid;

use crate::utils::Shared;

/// The keys to the job queues and records
#[derive(Debug)]
pub struct JobKeys;

impl JobKeys {
    /// Builds the key to the pending job queue
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn pending(shared: &Shared) -> String {
        format!("{}:jobs:pending", shared.config.clipforge.namespace)
    }

    /// Builds the key to the active job map
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn active(shared: &Shared) -> String {
        format!("{}:jobs:active", shared.config.clipforge.namespace)
    }

    /// Builds the key to a jobs status record
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the job
    /// * `shared` - Shared clipforge objects
    pub fn status(id: &Uuid, shared: &Shared) -> String {
        format!("{}:jobs:status:{}", shared.config.clipforge.namespace, id)
    }

    /// Builds the prefix all job status records live under
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn status_prefix(shared: &Shared) -> String {
        format!("{}:jobs:status:", shared.config.clipforge.namespace)
    }
}
