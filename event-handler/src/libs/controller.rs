//! The controller for handling upload events

use clipforge::Conf;
use clipforge::utils::{ApiError, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::worker::EventWorker;
use crate::args::Args;

/// The controller for handling upload events
pub struct EventController {
    /// A shared clipforge object
    shared: Arc<Shared>,
    /// The max number of events to pop in one batch
    batch: u64,
    /// The different worker handles
    handles: Vec<JoinHandle<Result<(), ApiError>>>,
}

impl EventController {
    /// Create a new event handler controller
    ///
    /// # Arguments
    ///
    /// * `args` - The command line args passed to the event handler
    /// * `conf` - The clipforge config
    pub async fn new(args: &Args, conf: Conf) -> Self {
        // connect to the state store
        let shared = Arc::new(Shared::new(conf).await);
        EventController {
            shared,
            batch: args.batch,
            handles: Vec::with_capacity(1),
        }
    }

    /// Spawn all of our workers
    pub fn spawn(&mut self) {
        // create and spawn our one and only worker
        let worker = EventWorker::new(&self.shared, self.batch);
        let handle = tokio::task::spawn(worker.start());
        // add this to our task list
        self.handles.push(handle);
    }

    /// Check if any of our tasks have failed
    pub async fn check_tasks(&mut self) -> Result<(), ApiError> {
        // check all spawned tasks
        for handle in self.handles.iter_mut() {
            // this handle finishing means the worker died
            if handle.is_finished() {
                handle.await??;
            }
        }
        Ok(())
    }

    /// Start handling upload events
    pub async fn start(mut self) {
        // spawn all of our workers
        self.spawn();
        // loop forever checking for task failures
        loop {
            // check if any of our tasks have failed
            self.check_tasks().await.unwrap();
            // sleep for 5 seconds
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}
