//! Host adapter that records every output it is asked to apply.

use std::sync::Mutex;

use wireless::{HostError, Location, Tick, WorldAdapter};

/// One `apply_output` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Tick the host was at when the output arrived.
    pub tick: Tick,
    /// Block that was driven.
    pub location: Location,
    /// Level it was driven to.
    pub level: bool,
}

/// World adapter knowing a fixed set of worlds.
#[derive(Debug)]
pub struct RecordingWorld {
    worlds: Vec<String>,
    tick: Mutex<Tick>,
    outputs: Mutex<Vec<Output>>,
}

impl RecordingWorld {
    /// Creates a host where only `worlds` are loaded.
    pub fn with_worlds(worlds: &[&str]) -> Self {
        Self {
            worlds: worlds.iter().map(|w| (*w).to_owned()).collect(),
            tick: Mutex::new(0),
            outputs: Mutex::new(Vec::new()),
        }
    }

    /// Sets the tick stamped on subsequent outputs.
    pub fn set_tick(&self, tick: Tick) {
        *self.tick.lock().unwrap_or_else(|e| e.into_inner()) = tick;
    }

    /// Outputs recorded so far.
    pub fn outputs(&self) -> Vec<Output> {
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl WorldAdapter for RecordingWorld {
    fn world_exists(&self, world: &str) -> bool {
        self.worlds.iter().any(|w| w.eq_ignore_ascii_case(world))
    }

    fn apply_output(&self, location: &Location, level: bool) -> Result<(), HostError> {
        let tick = *self.tick.lock().unwrap_or_else(|e| e.into_inner());
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Output {
                tick,
                location: location.clone(),
                level,
            });
        Ok(())
    }
}
