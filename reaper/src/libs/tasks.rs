//! The reapers background tasks and their cadence

use chrono::prelude::*;
use clipforge::Conf;
use std::collections::BTreeMap;

/// Get a UTC timestamp a number of seconds from now
#[macro_export]
macro_rules! from_now {
    ($secs:expr) => {
        chrono::Utc::now() + chrono::Duration::seconds($secs as i64)
    };
}

/// Actions to complete at specific times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tasks {
    /// Stop machines that have idled past their timeout
    IdleStop,
    /// Rescue jobs stuck in uploading past their presigned window
    StuckUploads,
    /// Reconcile the pool map against the provider
    PoolSync,
}

impl Tasks {
    /// Setup a task queue with all tasks
    ///
    /// Tasks are inserted in a spread out way to minimize collisions. Dev
    /// mode has no machines to stop or reconcile so only the upload sweep
    /// is scheduled.
    ///
    /// # Arguments
    ///
    /// * `conf` - The clipforge config
    pub fn setup_queue(conf: &Conf) -> BTreeMap<DateTime<Utc>, Tasks> {
        // create an empty map
        let mut queue = BTreeMap::default();
        queue.insert(from_now!(3), Self::StuckUploads);
        if !conf.dev_mode() {
            queue.insert(from_now!(7), Self::IdleStop);
            queue.insert(from_now!(11), Self::PoolSync);
        }
        queue
    }

    /// Get the amount of time to wait before repeating this task
    ///
    /// # Arguments
    ///
    /// * `conf` - The clipforge config
    pub fn delay(&self, conf: &Conf) -> u32 {
        match self {
            Tasks::IdleStop => conf.clipforge.reaper.idle_stop,
            Tasks::StuckUploads => conf.clipforge.reaper.stuck_uploads,
            Tasks::PoolSync => conf.clipforge.reaper.pool_sync,
        }
    }

    /// Get our task as a str
    pub fn as_str(&self) -> &str {
        match self {
            Tasks::IdleStop => "IdleStop",
            Tasks::StuckUploads => "StuckUploads",
            Tasks::PoolSync => "PoolSync",
        }
    }
}
