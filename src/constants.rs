//! Shared limits and defaults used across the registry, router and storage.
//!
//! Tick values use the host's discrete time unit.

/// Smallest delay a `ReceiverDelayer` accepts, in ticks.
pub const MIN_DELAY_TICKS: u32 = 50;
/// Smallest pulse period a `ReceiverClock` accepts, in ticks.
pub const MIN_CLOCK_PERIOD_TICKS: u32 = 50;
/// Periods a clock may fall behind in one `advance_to` call before the
/// missed pulses are collapsed into a single output of the right parity.
pub const MAX_CLOCK_CATCH_UP: u64 = 64;
/// Directory the flat-file backend writes channel documents into when the
/// configuration does not name one.
pub const DEFAULT_CHANNEL_DIR: &str = "channels";
/// File name of the `SQLite` database inside the data directory.
pub const SQLITE_FILE_NAME: &str = "channels.db";
/// Extension used for flat-file channel documents.
pub const CHANNEL_FILE_EXTENSION: &str = "json";
