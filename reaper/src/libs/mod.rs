mod reaper;
mod tasks;

pub use reaper::Reaper;
pub use tasks::Tasks;
