//! The keys to durable sweep cursors

use crate::utils::Shared;

/// The keys to the reapers durable cursors
#[derive(Debug)]
pub struct CursorKeys;

impl CursorKeys {
    /// Builds the key to the stuck upload sweeps scan cursor
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared clipforge objects
    pub fn uploading_sweep(shared: &Shared) -> String {
        format!("{}:cursors:uploading_sweep", shared.config.clipforge.namespace)
    }
}
