//! Setup the backends clipforge talks to

mod redis_setup;

pub use redis_setup::redis;
