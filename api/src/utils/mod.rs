//! Shared utilities for the clipforge services

mod errors;
mod macros;
pub mod retry;
mod s3;
mod shared;
pub mod trace;

pub use errors::{ApiError, StatusCode};
pub use s3::{S3, S3Client};
pub use shared::{AppState, Shared};
