//! Health checks against the state store

use bb8_redis::redis::cmd;
use tracing::instrument;

use crate::models::StatusReport;
use crate::query;
use crate::utils::{ApiError, Shared};

/// Pings the state store and echoes a value through it
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::system::status", skip_all, err(Debug))]
pub async fn status(shared: &Shared) -> Result<StatusReport, ApiError> {
    // make sure the store answers at all
    let pong: String = query!(cmd("ping"), shared).await?;
    // make sure a value survives a round trip
    let echoed: String = query!(cmd("echo").arg("clipforge"), shared).await?;
    Ok(StatusReport {
        ping: pong == "PONG",
        echo: echoed == "clipforge",
    })
}
