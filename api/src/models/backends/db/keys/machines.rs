//! The keys to the machine pool and its indexes

use crate::utils::Shared;

/// The keys to the machine pool map and the stopped set
#[derive(Debug)]
pub struct MachineKeys;

impl MachineKeys {
    /// Builds the key to the machine pool map
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn pool(shared: &Shared) -> String {
        format!("{}:machines:pool", shared.config.clipforge.namespace)
    }

    /// Builds the key to the stopped machine set
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn stopped(shared: &Shared) -> String {
        format!("{}:machines:stopped", shared.config.clipforge.namespace)
    }
}
