//! The clipforge event handler

use clap::Parser;

mod args;
mod libs;

use libs::EventController;

#[tokio::main]
async fn main() {
    // get command line args
    let args = args::Args::parse();
    // try to load a config file
    let conf = clipforge::Conf::new(&args.config).expect("Failed to load config");
    // setup our tracer
    clipforge::utils::trace::setup("ClipforgeEventHandler", &conf.clipforge.tracing);
    // build our event controller
    let controller = EventController::new(&args, conf).await;
    // start our event handler workers
    controller.start().await;
}
