// Copyright (c) 2024 Botho Foundation

//! Tracing setup for the binaries.
//!
//! `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug`
//! with `--verbose` or `[telemetry] verbose = true`.
//!
//! ```text
//! RUST_LOG=umbra::network::route=debug umbra check-config
//! ```

use crate::config::Config;
use anyhow::{anyhow, Result};
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for the given verbosity.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Verbose if the flag is set or the config at `path` asks for it.
///
/// A missing or unreadable config counts as quiet; commands report config
/// errors themselves.
pub fn verbose_from(flag: bool, path: &Path) -> bool {
    flag || (Config::exists(path) && Config::load(path).is_ok_and(|c| c.telemetry.verbose))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow!("Failed to install tracing subscriber: {}", err))
}
