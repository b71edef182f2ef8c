//! Setup redis

use bb8_redis::{RedisConnectionManager, bb8::Pool};

use crate::{Conf, setup};

/// Setup a connection pool to the redis backend
///
/// # Arguments
///
/// * `config` - The config for the clipforge services
///
/// # Panics
///
/// This will panic if we fail to connect to redis
pub async fn redis(config: &Conf) -> Pool<RedisConnectionManager> {
    // get redis config
    let redis = &config.redis;
    // build url to server using authentication if its configured
    let url = redis.connection_url();
    setup!(
        config.clipforge.tracing.level,
        format!(
            "Connecting to redis at {}:{}",
            config.redis.host, config.redis.port
        )
    );
    // build manager
    let manager = match RedisConnectionManager::new(url) {
        Ok(manager) => manager,
        Err(e) => panic!("{}", e),
    };
    // build redis connection pool
    let pool = Pool::builder()
        .max_size(redis.pool_size.unwrap_or(50))
        .build(manager)
        .await
        .expect("Failed to build redis connection pool");
    setup!(config.clipforge.tracing.level, "Connected to redis");
    pool
}
