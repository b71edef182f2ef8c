use clap::Parser;

/// The command line args passed to the clipforge API
#[derive(Parser, Debug)]
#[clap(version, author)]
pub struct Args {
    /// The path to load the config file from
    #[clap(short, long, default_value = "clipforge.yml")]
    pub config: String,
}
