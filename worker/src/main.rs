use clap::Parser;
use tracing::{Level, event, span};

mod args;
mod libs;
use libs::Worker;

/// The clipforge worker main loop
#[tokio::main]
async fn main() {
    // load command line args
    let args = args::Args::parse();
    // try to load a config file
    let conf = clipforge::Conf::new(&args.config).expect("Failed to load config");
    // setup our tracers/subscribers
    clipforge::utils::trace::setup("ClipforgeWorker", &conf.clipforge.tracing);
    // start our worker launch span
    let span = span!(Level::INFO, "Worker Launch");
    // build and execute worker
    match Worker::new(&args, conf).await {
        Ok(mut worker) => match worker.start().await {
            Ok(()) => (),
            Err(error) => {
                // log that this worker died while executing jobs
                event!(
                    parent: &span,
                    Level::ERROR,
                    msg = "Worker Failed",
                    error = error.msg()
                );
            }
        },
        Err(error) => {
            // log that this worker never came up
            event!(
                parent: &span,
                Level::ERROR,
                msg = "Worker Creation Failed",
                error = error.msg()
            );
        }
    }
}
