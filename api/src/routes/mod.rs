//! The http routes for the clipforge api

pub mod basic;
pub mod docs;
pub mod jobs;
pub mod system;
pub mod uploads;
pub mod webhooks;
