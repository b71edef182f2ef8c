use clap::Parser;

/// The command line args passed to the clipforge reaper
#[derive(Parser, Debug, Clone)]
#[clap(version, author)]
pub struct Args {
    /// The path to load the config file from
    #[clap(short, long, default_value = "clipforge.yml")]
    pub config: String,
    /// Run every sweep once and exit instead of looping
    ///
    /// This is the mode external schedulers invoke.
    #[clap(long, default_value_t)]
    pub once: bool,
}
