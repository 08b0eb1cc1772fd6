//! Process wide log output

use crate::options::{LogFormat, LogOptions};
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Normalizes bare level names like `INFO` which are commonly passed in upper case
fn normalize_filter(filter: &str) -> String {
    let trimmed = filter.trim();

    if LEVELS.iter().any(|level| level.eq_ignore_ascii_case(trimmed)) {
        trimmed.to_ascii_lowercase()
    } else {
        trimmed.to_owned()
    }
}

/// Installs the global subscriber writing events to stdout
///
/// Only binaries should call this, libraries merely emit events.
pub fn init(filter: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(normalize_filter(filter))?;
    let formatter = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => formatter.try_init(),
        LogFormat::Compact => formatter.compact().try_init(),
        LogFormat::Json => formatter.json().try_init(),
    }
    .map_err(|e| anyhow!(e))
}

/// Installs the global subscriber as configured by the options
pub fn init_from_options(options: &LogOptions) -> Result<()> {
    init(&options.level, options.format)
}
