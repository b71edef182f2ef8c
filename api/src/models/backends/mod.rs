//! The backend implementations for clipforge models
//! Currently only Redis is supported

pub mod db;
mod jobs;
pub mod setup;
