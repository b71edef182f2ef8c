//! Spawns worker machines, reusing stopped ones when possible

use std::collections::HashMap;
use tracing::{Level, event, instrument};
use uuid::Uuid;

use crate::models::backends::db;
use crate::models::backends::db::admission::SlotOutcome;
use crate::provider::{GuestSpec, MachineConfig, MachineSpec, ProviderError, RestartPolicy};
use crate::utils::retry::{Backoff, retry_with};
use crate::utils::{ApiError, Shared};

/// A worker machine the spawner produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spawned {
    /// The id of the machine that was spawned
    pub machine_id: String,
    /// The state the machine was spawned in
    pub state: String,
}

/// The result of a spawn attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// A machine was started or created
    Spawned(Spawned),
    /// The pool is full
    CapacityFull,
}

/// Build the create spec for a brand new worker machine
///
/// The env carries everything a worker needs to join the pool: the state
/// store connection, the namespace it keys under, and where to post
/// completion webhooks.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
fn machine_spec(shared: &Shared) -> MachineSpec {
    let conf = &shared.config;
    // build the env to inject into this worker
    let mut env = HashMap::with_capacity(4);
    env.insert(
        "UPSTREAM_STATE_STORE_URL".to_owned(),
        conf.redis.connection_url(),
    );
    if let Some(password) = &conf.redis.password {
        env.insert("UPSTREAM_STATE_STORE_TOKEN".to_owned(), password.clone());
    }
    env.insert(
        "WEBHOOK_BASE_URL".to_owned(),
        conf.clipforge.webhooks.base_url.clone(),
    );
    env.insert(
        "CLIPFORGE__CLIPFORGE__NAMESPACE".to_owned(),
        conf.clipforge.namespace.clone(),
    );
    MachineSpec {
        name: Some(format!("worker-{}", Uuid::new_v4().simple())),
        region: conf.provider.region.clone(),
        config: MachineConfig {
            image: conf.provider.image.clone(),
            env,
            guest: GuestSpec::default(),
            restart: RestartPolicy::default(),
            auto_destroy: false,
        },
    }
}

/// Spawn a worker machine, preferring a stopped one
///
/// The reuse path compensates a failed start by putting the machine back
/// in the stopped set; the create path releases its reserved slot on any
/// terminal failure.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "spawner::spawn_worker", skip_all, err(Debug))]
pub async fn spawn_worker(shared: &Shared) -> Result<SpawnOutcome, ApiError> {
    // try to restart a stopped machine before creating a new one
    if let Some(machine) = db::machines::pop_stopped(shared).await? {
        match db::machines::start_machine(&machine, shared).await {
            Ok(()) => {
                event!(Level::INFO, reused = machine.as_str());
                return Ok(SpawnOutcome::Spawned(Spawned {
                    machine_id: machine,
                    state: "started".to_owned(),
                }));
            }
            Err(error) => {
                // put the machine back so a later spawn can retry it
                db::machines::readd_stopped(&machine, shared).await?;
                return Err(error);
            }
        }
    }
    // no stopped machine so reserve a slot for a new one
    match db::admission::acquire_machine_slot(shared).await? {
        SlotOutcome::Acquired => (),
        SlotOutcome::Full { current } => {
            event!(Level::INFO, capacity_full = true, current);
            return Ok(SpawnOutcome::CapacityFull);
        }
    }
    // build the spec for this worker
    let spec = machine_spec(shared);
    // create it with retries on rate limits and server errors
    let backoff = Backoff::from_limits(&shared.config.clipforge.limits);
    let created = retry_with(&backoff, ProviderError::retryable, || {
        shared.provider.create(&spec)
    })
    .await;
    match created {
        Ok(machine) => {
            // track the new machine in the pool
            db::machines::add_to_pool(&machine.id, shared).await?;
            event!(Level::INFO, created = machine.id.as_str(), state = machine.state.as_str());
            Ok(SpawnOutcome::Spawned(Spawned {
                machine_id: machine.id,
                state: machine.state,
            }))
        }
        Err(error) => {
            // the machine never existed so give the slot back
            db::admission::release_machine_slot(shared).await?;
            Err(ApiError::from(error))
        }
    }
}

/// Spawn a worker if the pool has room, quietly doing nothing otherwise
///
/// This is the best effort hook job enqueues and upload events call; dev
/// mode and a full pool both return None without side effects.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[instrument(name = "spawner::maybe_spawn_worker", skip_all, err(Debug))]
pub async fn maybe_spawn_worker(shared: &Shared) -> Result<Option<Spawned>, ApiError> {
    // dev mode never touches the provider
    if shared.config.dev_mode() {
        return Ok(None);
    }
    // a full pool means nothing to do
    let size = db::machines::pool_size(shared).await?;
    if size >= shared.config.clipforge.limits.max_machines {
        return Ok(None);
    }
    match spawn_worker(shared).await? {
        SpawnOutcome::Spawned(spawned) => Ok(Some(spawned)),
        SpawnOutcome::CapacityFull => Ok(None),
    }
}
