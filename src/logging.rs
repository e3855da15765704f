//! Purpose: Route agent diagnostics through `tracing` at the configured verbosity.
//! Exports: `init`, `level_for`.
//! Role: Installs one stderr subscriber per process; later loads only change its level.
//! Invariants: Errors are always reported, even at `log=silent`.
//! Invariants: Never panics when another global subscriber already exists.
use std::sync::OnceLock;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Registry, fmt, reload};

use crate::core::options::Verbosity;

static LEVEL: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

pub fn level_for(verbosity: Verbosity) -> LevelFilter {
    match verbosity {
        Verbosity::Silent => LevelFilter::ERROR,
        Verbosity::Normal => LevelFilter::INFO,
        Verbosity::Verbose => LevelFilter::DEBUG,
    }
}

pub fn init(verbosity: Verbosity) {
    let level = level_for(verbosity);
    if let Some(handle) = LEVEL.get() {
        let _ = handle.reload(level);
        return;
    }
    let (filter, handle) = reload::Layer::new(level);
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
    if installed.is_ok() {
        let _ = LEVEL.set(handle);
    }
}
