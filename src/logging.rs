//! Diagnostic logging to stderr.
//!
//! The per-file report is printed to stdout by [`output`](crate::output);
//! everything else goes through `tracing`. The level comes from `RUST_LOG`
//! (default `info`), and `--verbose` raises it to `debug`, which logs every
//! encode attempt of the shrink loop.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbose: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(fmt_layer)
        .try_init()
        .ok();
}
