//! The redis backed machine pool for clipforge

use bb8_redis::redis::cmd;
use std::collections::{HashMap, HashSet};
use tracing::{Level, event, instrument};

use super::keys::MachineKeys;
use crate::models::{MachinePoolEntry, MachineState};
use crate::utils::{ApiError, Shared};
use crate::{conn, deserialize, query, serialize};

/// Adds a machine to the pool as running
///
/// Adding an existing machine again just refreshes its entry.
///
/// # Arguments
///
/// * `machine` - The id of the machine to add
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::machines::add_to_pool", skip(shared), err(Debug))]
pub async fn add_to_pool(machine: &str, shared: &Shared) -> Result<MachinePoolEntry, ApiError> {
    // build a fresh running entry for this machine
    let entry = MachinePoolEntry::new(machine);
    let _: () = query!(
        cmd("hset")
            .arg(MachineKeys::pool(shared))
            .arg(machine)
            .arg(serialize!(&entry)),
        shared
    )
    .await?;
    Ok(entry)
}

/// Gets a single machines pool entry if one exists
///
/// # Arguments
///
/// * `machine` - The id of the machine to get
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::machines::get_entry", skip(shared), err(Debug))]
pub async fn get_entry(
    machine: &str,
    shared: &Shared,
) -> Result<Option<MachinePoolEntry>, ApiError> {
    let raw: Option<String> = query!(
        cmd("hget").arg(MachineKeys::pool(shared)).arg(machine),
        shared
    )
    .await?;
    match raw {
        Some(raw) => Ok(Some(deserialize!(&raw))),
        None => Ok(None),
    }
}

/// Moves a machine between its running and idle states
///
/// The entries created_at is preserved; a missing entry is treated as
/// brand new.
///
/// # Arguments
///
/// * `machine` - The id of the machine to update
/// * `state` - The state to move this machine to
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::machines::update_state", skip(shared), err(Debug))]
pub async fn update_state(
    machine: &str,
    state: MachineState,
    shared: &Shared,
) -> Result<(), ApiError> {
    // read the current entry to preserve its created_at
    let entry = match get_entry(machine, shared).await? {
        Some(entry) => entry.transition(state),
        None => MachinePoolEntry::new(machine).transition(state),
    };
    let _: () = query!(
        cmd("hset")
            .arg(MachineKeys::pool(shared))
            .arg(machine)
            .arg(serialize!(&entry)),
        shared
    )
    .await?;
    Ok(())
}

/// Starts a stopped machine at the provider and marks it running
///
/// Pool state is only touched once the provider rpc succeeds.
///
/// # Arguments
///
/// * `machine` - The id of the machine to start
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::machines::start_machine", skip(shared), err(Debug))]
pub async fn start_machine(machine: &str, shared: &Shared) -> Result<(), ApiError> {
    // ask the provider to start this machine first
    shared.provider.start(machine).await?;
    // read the current entry to preserve its created_at
    let entry = match get_entry(machine, shared).await? {
        Some(entry) => entry.transition(MachineState::Running),
        None => MachinePoolEntry::new(machine),
    };
    // move this machine out of the stopped set and rewrite its entry
    let mut pipe = redis::pipe();
    pipe.cmd("srem").arg(MachineKeys::stopped(shared)).arg(machine)
        .cmd("hset").arg(MachineKeys::pool(shared)).arg(machine).arg(serialize!(&entry));
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Stops a machine at the provider and marks it stopped
///
/// # Arguments
///
/// * `machine` - The id of the machine to stop
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::machines::stop_machine", skip(shared), err(Debug))]
pub async fn stop_machine(machine: &str, shared: &Shared) -> Result<(), ApiError> {
    // ask the provider to stop this machine first
    shared.provider.stop(machine).await?;
    // read the current entry to preserve its created_at
    let entry = match get_entry(machine, shared).await? {
        Some(entry) => entry.transition(MachineState::Stopped),
        None => MachinePoolEntry::new(machine).transition(MachineState::Stopped),
    };
    // add this machine to the stopped set and rewrite its entry
    let mut pipe = redis::pipe();
    pipe.cmd("sadd").arg(MachineKeys::stopped(shared)).arg(machine)
        .cmd("hset").arg(MachineKeys::pool(shared)).arg(machine).arg(serialize!(&entry));
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Atomically takes one stopped machine for reuse if any exist
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::machines::pop_stopped", skip_all, err(Debug))]
pub async fn pop_stopped(shared: &Shared) -> Result<Option<String>, ApiError> {
    let popped: Option<String> =
        query!(cmd("spop").arg(MachineKeys::stopped(shared)), shared).await?;
    Ok(popped)
}

/// Puts a machine back in the stopped set
///
/// This is the compensation for a reuse attempt whose start rpc failed.
///
/// # Arguments
///
/// * `machine` - The id of the machine to put back
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::machines::readd_stopped", skip(shared), err(Debug))]
pub async fn readd_stopped(machine: &str, shared: &Shared) -> Result<(), ApiError> {
    let _: () = query!(
        cmd("sadd").arg(MachineKeys::stopped(shared)).arg(machine),
        shared
    )
    .await?;
    Ok(())
}

/// Reads the whole machine pool map
///
/// Entries that fail to deserialize are logged and skipped; reconciliation
/// rewrites them on its next pass.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::machines::pool", skip_all, err(Debug))]
pub async fn pool(shared: &Shared) -> Result<HashMap<String, MachinePoolEntry>, ApiError> {
    // read the whole pool map
    let raw: HashMap<String, String> =
        query!(cmd("hgetall").arg(MachineKeys::pool(shared)), shared).await?;
    // deserialize each entry
    let mut pool = HashMap::with_capacity(raw.len());
    for (machine, raw_entry) in raw {
        match serde_json::from_str::<MachinePoolEntry>(&raw_entry) {
            Ok(entry) => {
                pool.insert(machine, entry);
            }
            Err(error) => {
                event!(
                    Level::ERROR,
                    msg = "Corrupt pool entry",
                    machine,
                    error = error.to_string()
                );
            }
        }
    }
    Ok(pool)
}

/// Counts the machines currently in the pool
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::machines::pool_size", skip_all, err(Debug))]
pub async fn pool_size(shared: &Shared) -> Result<u64, ApiError> {
    let raw: HashMap<String, String> =
        query!(cmd("hgetall").arg(MachineKeys::pool(shared)), shared).await?;
    Ok(raw.len() as u64)
}

/// Reads the stopped machine set
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::machines::stopped_set", skip_all, err(Debug))]
pub async fn stopped_set(shared: &Shared) -> Result<HashSet<String>, ApiError> {
    let stopped: HashSet<String> =
        query!(cmd("smembers").arg(MachineKeys::stopped(shared)), shared).await?;
    Ok(stopped)
}

/// Reconciles the pool map against what the provider actually has
///
/// The pool map owns logical state but the provider owns physical
/// existence; machines the provider no longer reports are dropped and
/// provider side stops are reflected into the stopped set. All writes land
/// in one pipeline so readers never see a half synced pool.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::machines::sync_pool", skip_all, err(Debug))]
pub async fn sync_pool(shared: &Shared) -> Result<(), ApiError> {
    // list every machine the provider knows about
    let provider_machines = shared.provider.list().await?;
    // read our current view of the pool
    let pool = pool(shared).await?;
    let stopped = stopped_set(shared).await?;
    // build one pipeline with every reconciliation write
    let mut pipe = redis::pipe();
    let pool_key = MachineKeys::pool(shared);
    let stopped_key = MachineKeys::stopped(shared);
    for machine in &provider_machines {
        // map the providers physical state onto our logical one
        let state = if machine.is_stopped() {
            MachineState::Stopped
        } else {
            MachineState::Running
        };
        // preserve timestamps for machines we already track
        let entry = match pool.get(&machine.id) {
            Some(existing) => MachinePoolEntry {
                machine_id: machine.id.clone(),
                state,
                last_active_at: existing.last_active_at,
                created_at: existing.created_at,
            },
            None => MachinePoolEntry::new(&machine.id).transition(state),
        };
        pipe.cmd("hset").arg(&pool_key).arg(&machine.id).arg(serialize!(&entry));
        // keep the stopped set in step with the entry
        if machine.is_stopped() {
            if !stopped.contains(&machine.id) {
                pipe.cmd("sadd").arg(&stopped_key).arg(&machine.id);
            }
        } else {
            pipe.cmd("srem").arg(&stopped_key).arg(&machine.id);
        }
    }
    // drop pool entries the provider no longer reports
    for machine in pool.keys() {
        if !provider_machines.iter().any(|found| &found.id == machine) {
            pipe.cmd("hdel").arg(&pool_key).arg(machine)
                .cmd("srem").arg(&stopped_key).arg(machine);
        }
    }
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    // log how many machines we reconciled
    event!(
        Level::INFO,
        provider = provider_machines.len(),
        pooled = pool.len()
    );
    Ok(())
}
