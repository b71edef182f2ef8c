//! The keys to the upload event queue

use crate::utils::Shared;

/// The keys to the upload event queue and its in flight index
#[derive(Debug)]
pub struct EventKeys;

impl EventKeys {
    /// Builds the key to the upload event queue
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn uploads(shared: &Shared) -> String {
        format!("{}:events:uploads", shared.config.clipforge.namespace)
    }

    /// Builds the key to the in flight upload event set
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn flight(shared: &Shared) -> String {
        format!("{}:events:uploads:flight", shared.config.clipforge.namespace)
    }
}
