//! The redis backed upload event queue
//!
//! Events are delivered at least once: popped messages are parked in an in
//! flight set until they are acked, nakked messages go back in the queue,
//! and a restarting handler replays anything still parked.

use bb8_redis::redis::cmd;
use chrono::prelude::*;
use tracing::{Level, event, instrument};

use super::keys::EventKeys;
use crate::models::UploadEvent;
use crate::utils::{ApiError, Shared};
use crate::{conn, query, serialize};

/// One popped upload event plus the raw form its queue bookkeeping uses
#[derive(Debug, Clone)]
pub struct PoppedEvent {
    /// The raw serialized message as it sits in the queue
    pub raw: String,
    /// The score this message was queued with
    pub score: i64,
    /// The parsed event
    pub event: UploadEvent,
}

/// Adds a batch of upload events to the queue
///
/// # Arguments
///
/// * `events` - The events to queue
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::events::add", skip_all, fields(count = events.len()), err(Debug))]
pub async fn add(events: &[UploadEvent], shared: &Shared) -> Result<(), ApiError> {
    if events.is_empty() {
        return Ok(());
    }
    // queue every event scored by when it fired
    let mut pipe = redis::pipe();
    for cast in events {
        pipe.cmd("zadd")
            .arg(EventKeys::uploads(shared))
            .arg(cast.event_time.timestamp_millis())
            .arg(serialize!(cast));
    }
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Pops a batch of upload events and parks them in flight
///
/// Messages that fail to parse are dropped with a log instead of poisoning
/// the queue forever.
///
/// # Arguments
///
/// * `count` - The max number of events to pop
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::events::pop", skip(shared), err(Debug))]
pub async fn pop(count: u64, shared: &Shared) -> Result<Vec<PoppedEvent>, ApiError> {
    // take the oldest events off the queue
    let raw_batch: Vec<(String, f64)> = query!(
        cmd("zpopmin").arg(EventKeys::uploads(shared)).arg(count),
        shared
    )
    .await?;
    if raw_batch.is_empty() {
        return Ok(Vec::new());
    }
    // park everything we popped in the in flight set
    let mut pipe = redis::pipe();
    for (raw, _) in &raw_batch {
        pipe.cmd("sadd").arg(EventKeys::flight(shared)).arg(raw);
    }
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    // parse the batch, dropping poisoned messages
    let mut popped = Vec::with_capacity(raw_batch.len());
    for (raw, score) in raw_batch {
        match serde_json::from_str::<UploadEvent>(&raw) {
            Ok(cast) => popped.push(PoppedEvent {
                raw,
                score: score as i64,
                event: cast,
            }),
            Err(error) => {
                // log and unpark the poisoned message so it does not linger
                event!(
                    Level::ERROR,
                    msg = "Dropping malformed upload event",
                    error = error.to_string()
                );
                let _: () = query!(
                    cmd("srem").arg(EventKeys::flight(shared)).arg(&raw),
                    shared
                )
                .await?;
            }
        }
    }
    Ok(popped)
}

/// Acks a handled event, removing it from the in flight set
///
/// # Arguments
///
/// * `popped` - The popped event to ack
/// * `shared` - Shared clipforge objects
#[instrument(name = "db::events::ack", skip_all, err(Debug))]
pub async fn ack(popped: &PoppedEvent, shared: &Shared) -> Result<(), ApiError> {
    let _: () = query!(
        cmd("srem").arg(EventKeys::flight(shared)).arg(&popped.raw),
        shared
    )
    .await?;
    Ok(())
}

/// Naks a failed event so the queue delivers it again
///
/// # Arguments
///
/// * `popped` - The popped event to requeue
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::events::nak", skip_all, err(Debug))]
pub async fn nak(popped: &PoppedEvent, shared: &Shared) -> Result<(), ApiError> {
    let mut pipe = redis::pipe();
    pipe.cmd("srem").arg(EventKeys::flight(shared)).arg(&popped.raw)
        .cmd("zadd").arg(EventKeys::uploads(shared)).arg(popped.score).arg(&popped.raw);
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(())
}

/// Replays every in flight event back onto the queue
///
/// A handler calls this on startup so messages parked by a crashed
/// predecessor are delivered again.
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
#[rustfmt::skip]
#[instrument(name = "db::events::reset_all", skip_all, err(Debug))]
pub async fn reset_all(shared: &Shared) -> Result<u64, ApiError> {
    // read everything still parked in flight
    let parked: Vec<String> = query!(cmd("smembers").arg(EventKeys::flight(shared)), shared).await?;
    if parked.is_empty() {
        return Ok(0);
    }
    let now = Utc::now().timestamp_millis();
    // requeue each parked message and unpark it
    let mut pipe = redis::pipe();
    for raw in &parked {
        pipe.cmd("zadd").arg(EventKeys::uploads(shared)).arg(now).arg(raw)
            .cmd("srem").arg(EventKeys::flight(shared)).arg(raw);
    }
    let _: () = pipe.atomic().query_async(conn!(shared)).await?;
    Ok(parked.len() as u64)
}
