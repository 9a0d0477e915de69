//! Logging setup for applications embedding the store
//!
//! Stores log through `tracing`; nothing is printed until the host installs
//! a subscriber. `init` installs the same stack the store is developed with.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global `fmt` subscriber at `debug` (verbose) or `info` level.
///
/// Fails if a global subscriber is already installed.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()?;
    Ok(())
}
