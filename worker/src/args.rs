use clap::Parser;
use gethostname::gethostname;

/// The command line args passed to the clipforge worker
#[derive(Parser, Debug, Clone)]
#[clap(version, author)]
pub struct Args {
    /// The path to load the config file from
    #[clap(short, long, default_value = "clipforge.yml")]
    pub config: String,
    /// The machine id identifying this worker in the pool
    ///
    /// The spawner boots workers on machines whose hostname is the
    /// provider assigned machine id, so the hostname is the default.
    #[clap(short, long)]
    pub machine: Option<String>,
}

impl Args {
    /// Get this workers machine id, falling back to the hostname
    #[must_use]
    pub fn machine_id(&self) -> String {
        match &self.machine {
            Some(machine) => machine.clone(),
            None => gethostname().to_string_lossy().into_owned(),
        }
    }
}
