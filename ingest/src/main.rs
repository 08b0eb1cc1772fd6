use anyhow::Result;
use modules::logging;
use modules::options::apply_legacy_env_aliases;
use options::{Command, MainOptions};
use structopt::StructOpt;
use tracing::info;

mod inspect;
mod options;
mod publish;

fn main() -> Result<()> {
    // Environment has to be modified before the runtime spawns its workers
    apply_legacy_env_aliases();

    let options = MainOptions::from_args();
    logging::init_from_options(&options.log)?;

    info!("Ingest {}", env!("CARGO_PKG_VERSION"));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            match options.command {
                Command::Publish(options) => publish::run(options).await,
                Command::Inspect(options) => inspect::run(options).await,
            }
        })
}
