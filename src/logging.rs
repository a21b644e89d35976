//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays parseable. The level comes from
//! `[logging] level`, raised by `-v`/`-vv` or lowered by `--quiet`;
//! `RUST_LOG` overrides both. `[logging] json = true` switches to one
//! JSON object per line.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// The filter directive for the given config and CLI flags.
pub fn filter_directive(config: &LoggingConfig, verbose: u8, quiet: bool) -> String {
    match verbose {
        0 if quiet => "error".to_string(),
        0 => config.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(config: &LoggingConfig, verbose: u8, quiet: bool) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(filter_directive(config, verbose, quiet))?,
    };

    let human_layer = (!config.json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let json_layer = config
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(human_layer)
        .with(json_layer)
        .try_init()?;
    Ok(())
}
