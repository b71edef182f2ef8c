use clap::Parser;

/// The command line args passed to the clipforge event handler
#[derive(Parser, Debug, Clone)]
#[clap(version, author)]
pub struct Args {
    /// The path to load the config file from
    #[clap(short, long, default_value = "clipforge.yml")]
    pub config: String,
    /// The max number of events to pop in one batch
    #[clap(short, long, default_value_t = 100)]
    pub batch: u64,
}
