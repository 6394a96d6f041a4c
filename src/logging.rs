//! Log setup for the `kumade` binary.
//!
//! Priority for determining the log filter:
//! 1. `--log-level` CLI flag
//! 2. `KUMADE_LOG` environment variable, any `EnvFilter` directive
//! 3. `info`
//!
//! Log lines go through the `tracing-indicatif` writer, so they are printed
//! above the progress bars instead of tearing them.

use anyhow::{Context, Result};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::LogLevel;

const ENV: &str = "KUMADE_LOG";

pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => match std::env::var(ENV) {
            Ok(directives) => EnvFilter::try_new(&directives)
                .with_context(|| format!("invalid {ENV} value '{directives}'"))?,
            Err(_) => EnvFilter::new("info"),
        },
    };

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .try_init()
        .context("logging was already initialized")?;

    Ok(())
}
