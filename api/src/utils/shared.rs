//! Shared objects and methods across all requests

use axum::extract::FromRef;
use bb8_redis::{RedisConnectionManager, bb8::Pool};
use std::sync::Arc;

use super::s3::S3;
use crate::models::backends::setup;
use crate::provider::Machines;
use crate::{Conf, error, info};

/// Tries to execute a future 10 times with a custom timeout
///
/// # Arguments
///
/// * `future` - The future to try to complete
/// * `timeout` - How long to wait for each attempt to complete
macro_rules! retry {
    ($future:expr, $timeout:expr, $name:expr, $config:expr) => {{
        // setup a counter variable at 0 to track how many attempts have been made
        let mut i = 0;
        // loop and try to complete this future
        loop {
            match tokio::time::timeout(std::time::Duration::from_secs($timeout), $future).await {
                // the future completed so return the result
                Ok(res) => break res,
                // the future failed so try again if we have failed less then 10 times or panic
                Err(err) => {
                    // log this error
                    error!(
                        $config.clipforge.tracing.level,
                        format!(
                            "Future {} failed to complete in {} seconds. Restarting!",
                            $name, $timeout
                        )
                    );
                    if i == 9 {
                        // we failed 10 times so panic
                        panic!("{:#?}", err)
                    } else {
                        // increment i and try again
                        i += 1;
                        continue;
                    }
                }
            }
        }
    }};
}

/// Shared objects between all requests
pub struct Shared {
    /// The clipforge config
    pub config: Conf,
    /// A connection pool for redis
    pub redis: Pool<RedisConnectionManager>,
    /// s3 clients for each bucket clipforge uses
    pub s3: S3,
    /// A client for the compute provider machines run on
    pub provider: Machines,
}

impl Shared {
    /// Sets up the shared object
    ///
    /// # Arguments
    ///
    /// * `config` - The clipforge config to use
    pub async fn new(config: Conf) -> Self {
        // log the namespace we will be using
        info!(
            config.clipforge.tracing.level,
            format!("Using namespace {}", config.clipforge.namespace)
        );
        // setup redis connection pool
        let redis = retry!(setup::redis(&config), 2, "Redis setup", config);
        // setup s3 clients
        let s3 = S3::new(&config);
        // build our provider client
        let provider = Machines::new(&config);
        Shared {
            config,
            redis,
            s3,
            provider,
        }
    }
}

/// All of the global states in Axum
#[derive(Clone)]
pub struct AppState {
    /// The shared objects in clipforge
    pub shared: Arc<Shared>,
}

impl AppState {
    /// Wrap a shared object for axum
    ///
    /// # Arguments
    ///
    /// * `shared` - The shared objects to wrap
    #[must_use]
    pub fn new(shared: Shared) -> Self {
        AppState {
            shared: Arc::new(shared),
        }
    }
}

impl FromRef<AppState> for Arc<Shared> {
    fn from_ref(state: &AppState) -> Self {
        state.shared.clone()
    }
}
