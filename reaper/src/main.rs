use clap::Parser;

mod args;
mod libs;
use libs::Reaper;

/// The clipforge reaper
#[tokio::main]
async fn main() {
    // get command line args
    let args = args::Args::parse();
    // try to load a config file
    let conf = clipforge::Conf::new(&args.config).expect("Failed to load config");
    // setup our tracer
    clipforge::utils::trace::setup("ClipforgeReaper", &conf.clipforge.tracing);
    // setup reaper
    let mut reaper = Reaper::new(conf).await;
    // run a single pass for external schedulers or loop forever
    if args.once {
        reaper.run_once().await;
    } else {
        reaper.start().await;
    }
}
