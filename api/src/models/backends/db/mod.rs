//! The raw redis operations backing the clipforge core

pub mod admission;
pub mod cursors;
pub mod events;
pub mod helpers;
pub mod jobs;
pub mod keys;
pub mod machines;
pub mod system;
