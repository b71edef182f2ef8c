//! The keys clipforge stores state under in redis

pub mod counters;
pub mod cursors;
pub mod events;
pub mod jobs;
pub mod machines;

pub use counters::CounterKeys;
pub use cursors::CursorKeys;
pub use events::EventKeys;
pub use jobs::JobKeys;
pub use machines::MachineKeys;
