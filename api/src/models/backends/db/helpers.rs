//! Helpers for talking to the redis backed state store

use bb8_redis::{RedisConnectionManager, bb8};

use crate::unavailable;
use crate::utils::{ApiError, Shared};

/// Gets a connection from the connection pool
#[doc(hidden)]
#[macro_export]
macro_rules! conn {
    ($shared:expr) => {
        &mut *$crate::models::backends::db::helpers::get_conn($shared).await?
    };
}

/// Perform a non pipelined query to Redis
#[doc(hidden)]
#[macro_export]
macro_rules! query {
    ($cmd:expr, $shared:expr) => {
        $cmd.query_async(&mut *$crate::models::backends::db::helpers::get_conn($shared).await?)
    };
}

/// Perform a non pipelined query with no return value to Redis
#[doc(hidden)]
#[macro_export]
macro_rules! exec_query {
    ($cmd:expr, $shared:expr) => {
        $cmd.query_async::<()>(
            &mut *$crate::models::backends::db::helpers::get_conn($shared).await?,
        )
    };
}

/// Gets a connection from the Redis connection pool
///
/// # Arguments
///
/// * `shared` - Shared clipforge objects
pub async fn get_conn(
    shared: &Shared,
) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>, ApiError> {
    // get connection from redis pool
    match shared.redis.get().await {
        Ok(conn) => Ok(conn),
        Err(error) => unavailable!(format!("Failed to get connection from pool: {:#?}", error)),
    }
}
