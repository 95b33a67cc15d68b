//! Logger bootstrap for the binary and for hosts embedding the core.

use env_logger::{Builder, Env};
use log::{debug, LevelFilter};

/// Installs `env_logger` as the global logger.
///
/// `verbose` lowers the default level from `info` to `debug`, which shows
/// every queued write and routed signal. `RUST_LOG` overrides either default.
/// Calling this again once a logger is installed leaves the first one in
/// place.
pub fn init(verbose: bool) {
    let fallback = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::from_env(Env::default().default_filter_or(fallback.to_string()));
    builder.format_target(false).format_timestamp_millis();

    if builder.try_init().is_err() {
        debug!("logger already installed, keeping it");
    }
}
