//! Durable cursors for resumable sweeps

use bb8_redis::redis::cmd;
use tracing::instrument;

use super::keys::CursorKeys;
use crate::query;
use crate::utils::{ApiError, Shared};

/// Gets the stuck upload sweeps scan cursor
///
/// A missing cursor starts the scan from the beginning.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::cursors::get_uploading_sweep", skip_all, err(Debug))]
pub async fn get_uploading_sweep(shared: &Shared) -> Result<u64, ApiError> {
    let cursor: Option<u64> =
        query!(cmd("get").arg(CursorKeys::uploading_sweep(shared)), shared).await?;
    Ok(cursor.unwrap_or(0))
}

/// Saves the stuck upload sweeps scan cursor
///
/// # Arguments
///
/// * `cursor` - The cursor to resume from next tick
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::cursors::save_uploading_sweep", skip(shared), err(Debug))]
pub async fn save_uploading_sweep(cursor: u64, shared: &Shared) -> Result<(), ApiError> {
    let _: () = query!(
        cmd("set")
            .arg(CursorKeys::uploading_sweep(shared))
            .arg(cursor),
        shared
    )
    .await?;
    Ok(())
}
