use modules::options::{ListenOptions, LogOptions, PublishOptions};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(about = "Publishes raw data and inspects what transformers receive")]
pub struct MainOptions {
    #[structopt(flatten)]
    pub log: LogOptions,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Publishes JSON lines read from stdin as raw data
    ///
    /// Lines which are complete envelopes are published as they are,
    /// everything else is wrapped into an envelope of the configured provider.
    Publish(PublishOptions),

    /// Consumes a queue and logs every resolved raw document
    Inspect(InspectOptions),
}

#[derive(Debug, StructOpt)]
pub struct InspectOptions {
    #[structopt(flatten)]
    pub listen: ListenOptions,

    /// Abort the process immediately when the broker connection is lost
    #[structopt(long)]
    pub abort_on_connection_loss: bool,
}
