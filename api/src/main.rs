mod args;

use clap::Parser;

/// Start the clipforge API
#[tokio::main]
async fn main() {
    // load command line args
    let args = args::Args::parse();
    // load config
    let conf = clipforge::conf::Conf::new(&args.config).expect("Failed to load config");
    // setup our tracer
    clipforge::utils::trace::setup("ClipforgeAPI", &conf.clipforge.tracing);
    // launch our api
    Box::pin(clipforge::axum(conf)).await;
}
