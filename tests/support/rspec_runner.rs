//! Runs `rspec` suites one example at a time.

use std::sync::Arc;

use rspec::report::Report;
use rspec::{block::Suite, ConfigurationBuilder, Logger, Runner};

/// Runs `suite` without parallelism.
///
/// Scenario environments share a storage worker and a recording host, so
/// examples must not interleave.
pub fn run_serial<T>(suite: &Suite<T>)
where
    T: Clone + Send + Sync + std::fmt::Debug,
{
    let config = ConfigurationBuilder::default()
        .parallel(false)
        .exit_on_failure(false)
        .build()
        .unwrap_or_else(|err| panic!("invalid rspec configuration: {err}"));
    let logger = Arc::new(Logger::new(std::io::stdout()));
    let report = Runner::new(config, vec![logger]).run(suite);
    assert!(report.is_success(), "scenario suite reported failures");
}
