mod runner;
mod worker;

pub use runner::{CommandRunner, Runner, RunnerOutcome};
pub use worker::Worker;
