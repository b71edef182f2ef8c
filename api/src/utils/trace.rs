//! Sets up tracing for clipforge services on stdout/stderr

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::conf::Tracing;

/// Log a message at the info level before tracing is initialized
#[macro_export]
macro_rules! info {
    ($level:expr, $($msg:tt)+) => {
        if $level == $crate::conf::LogLevel::Info
        || $level == $crate::conf::LogLevel::Debug
        || $level == $crate::conf::LogLevel::Trace {
            println!("{}", serde_json::json!({"timestamp": chrono::Utc::now(), "level": "INFO", "msg": $($msg)+}));
        }
    }
}

/// Log a setup message before tracing is initialized
#[macro_export]
macro_rules! setup {
    ($level:expr, $($msg:tt)+) => {
        if $level == $crate::conf::LogLevel::Setup
        || $level == $crate::conf::LogLevel::Info
        || $level == $crate::conf::LogLevel::Debug
        || $level == $crate::conf::LogLevel::Trace {
            println!("{}", serde_json::json!({"timestamp": chrono::Utc::now(), "level": "SETP", "msg": $($msg)+}));
        }
    }
}

/// Log a message at the error level before tracing is initialized
#[macro_export]
macro_rules! error {
    ($level:expr, $($msg:tt)+) => {
        if $level != $crate::conf::LogLevel::Off {
            println!("{}", serde_json::json!({"timestamp": chrono::Utc::now(), "level": "ERRO", "msg": $($msg)+}));
        }
    }
}

/// Setup our tracers/subscribers for a clipforge service
///
/// An explicit `RUST_LOG` env filter wins over the configured level.
///
/// # Arguments
///
/// * `name` - The name of the service to trace
/// * `conf` - The tracing settings to apply
pub fn setup(name: &str, conf: &Tracing) {
    // prefer an explicit env filter over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(conf.level.to_filter().into()));
    // build our local stdout layer
    let local = fmt::layer().with_target(true);
    // init our tracing registry
    Registry::default()
        .with(filter)
        .with(local)
        .try_init()
        .expect("Failed to register tracers/subscribers");
    info!(conf.level, format!("Tracing initialized for {}", name));
}
