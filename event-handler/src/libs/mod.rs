mod controller;
mod worker;

pub use controller::EventController;
pub use worker::EventWorker;
