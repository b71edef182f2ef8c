//! The process wide admission gate for machine creation
//!
//! The counter is advisory; the authoritative capacity check reads the pool
//! map. The counter exists to absorb bursty concurrent acquisitions without
//! a full map scan each time.

use bb8_redis::redis::cmd;
use std::time::Duration;
use tracing::{Level, event, instrument};

use super::keys::CounterKeys;
use super::machines;
use crate::models::AdmissionStats;
use crate::utils::{ApiError, Shared};
use crate::{exec_query, query};

/// The result of trying to reserve a machine slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// A slot was reserved
    Acquired,
    /// The pool is full
    Full {
        /// How many machines the pool held when the check failed
        current: u64,
    },
}

/// Checks whether a provider call is allowed in the current window
///
/// The window is a fixed 1 second bucket; only the first increment in a
/// bucket is allowed through.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::admission::check_rate_limit", skip_all, err(Debug))]
pub async fn check_rate_limit(shared: &Shared) -> Result<bool, ApiError> {
    let key = CounterKeys::rate_limit(shared);
    // bump the counter for this window
    let count: u64 = query!(cmd("incr").arg(&key), shared).await?;
    // the first hit in a window sets the windows ttl
    if count == 1 {
        let window_ms = shared.config.clipforge.limits.rate_limit_window_ms;
        let window_secs = window_ms.div_ceil(1000).max(1);
        let _ = exec_query!(cmd("expire").arg(&key).arg(window_secs), shared).await?;
    }
    Ok(count <= 1)
}

/// Waits until a provider call is allowed
///
/// Callers cancelling this future leave nothing to clean up.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::admission::wait_for_rate_limit", skip_all, err(Debug))]
pub async fn wait_for_rate_limit(shared: &Shared) -> Result<(), ApiError> {
    loop {
        if check_rate_limit(shared).await? {
            return Ok(());
        }
        // sleep one window and try again
        tokio::time::sleep(Duration::from_millis(
            shared.config.clipforge.limits.rate_limit_window_ms,
        ))
        .await;
    }
}

/// Checks whether the pool has room for another machine
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::admission::check_capacity", skip_all, err(Debug))]
pub async fn check_capacity(shared: &Shared) -> Result<(bool, u64), ApiError> {
    // the pool map is the authoritative capacity source
    let current = machines::pool_size(shared).await?;
    let allowed = current < shared.config.clipforge.limits.max_machines;
    Ok((allowed, current))
}

/// Reserves a machine slot if the pool has room
///
/// An overshoot past the cap is compensated by releasing the slot again.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::admission::acquire_machine_slot", skip_all, err(Debug))]
pub async fn acquire_machine_slot(shared: &Shared) -> Result<SlotOutcome, ApiError> {
    // wait until the provider rate limit lets us through
    wait_for_rate_limit(shared).await?;
    // re-check capacity now that we may have slept
    let (allowed, current) = check_capacity(shared).await?;
    if !allowed {
        return Ok(SlotOutcome::Full { current });
    }
    // reserve our slot and re-validate against the cap
    let held: u64 = query!(cmd("incr").arg(CounterKeys::active_machines(shared)), shared).await?;
    if held > shared.config.clipforge.limits.max_machines {
        // we overshot so give the slot back
        release_machine_slot(shared).await?;
        event!(Level::INFO, overshoot = held, current);
        return Ok(SlotOutcome::Full { current });
    }
    Ok(SlotOutcome::Acquired)
}

/// Releases a machine slot with a clamped decrement
///
/// A counter at or below zero is written back to zero instead of going
/// negative.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::admission::release_machine_slot", skip_all, err(Debug))]
pub async fn release_machine_slot(shared: &Shared) -> Result<(), ApiError> {
    let key = CounterKeys::active_machines(shared);
    let current: Option<i64> = query!(cmd("get").arg(&key), shared).await?;
    match current {
        Some(count) if count > 0 => {
            let _ = exec_query!(cmd("decr").arg(&key), shared).await?;
        }
        // clamp anything at or below zero back to zero
        _ => {
            let _ = exec_query!(cmd("set").arg(&key).arg(0), shared).await?;
        }
    }
    Ok(())
}

/// Gets the admission controllers view of the pool for observability
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::admission::stats", skip_all, err(Debug))]
pub async fn stats(shared: &Shared) -> Result<AdmissionStats, ApiError> {
    let held: Option<i64> = query!(
        cmd("get").arg(CounterKeys::active_machines(shared)),
        shared
    )
    .await?;
    Ok(AdmissionStats {
        active_machines: held.unwrap_or(0).max(0) as u64,
        max_machines: shared.config.clipforge.limits.max_machines,
    })
}
