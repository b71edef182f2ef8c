//! The keys to the admission controllers counters

use crate::utils::Shared;

/// The keys to the admission counters
#[derive(Debug)]
pub struct CounterKeys;

impl CounterKeys {
    /// Builds the key to the active machine slot counter
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn active_machines(shared: &Shared) -> String {
        format!("{}:counters:active_machines", shared.config.clipforge.namespace)
    }

    /// Builds the key to the provider rate limit counter
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn rate_limit(shared: &Shared) -> String {
        format!("{}:counters:rate_limit", shared.config.clipforge.namespace)
    }
}
