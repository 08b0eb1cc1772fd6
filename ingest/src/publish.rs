use anyhow::Result;
use domain::RawAny;
use modules::collector::Collector;
use modules::options::PublishOptions;
use serde_json::Value;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub async fn run(options: PublishOptions) -> Result<()> {
    let collector = Collector::from_options(&options).await?;
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut published = 0usize;
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(error) => {
                warn!(line = line_number, %error, "Skipping line which is not valid JSON");
                continue;
            }
        };

        match serde_json::from_value::<RawAny>(value.clone()) {
            Ok(envelope) => collector.forward(envelope).await?,
            Err(_) => collector.collect(value).await?,
        }

        published += 1;
    }

    collector.shutdown().await?;
    info!(published, "Reached end of input");

    Ok(())
}
