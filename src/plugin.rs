//! Bevy plugin driving the signal clock from the fixed timestep.

use std::sync::Arc;

use bevy_app::{App, FixedUpdate, Plugin};
use bevy_ecs::prelude::*;
use log::debug;

use crate::context::Wireless;
use crate::endpoint::Tick;

/// Shared handle to the wireless core.
#[derive(Resource, Debug, Clone)]
pub struct WirelessResource(pub Arc<Wireless>);

/// Tick the signal clock last advanced to.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SignalClock {
    /// Current tick.
    pub tick: Tick,
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "Bevy system parameters use `Res<T>` by value."
)]
fn advance_signal_clock(wireless: Res<WirelessResource>, mut clock: ResMut<SignalClock>) {
    clock.tick = wireless.0.tick();
}

/// Installs the wireless core as a resource and advances its clock once per
/// `FixedUpdate`.
#[derive(Debug, Clone)]
pub struct WirelessPlugin {
    wireless: Arc<Wireless>,
}

impl WirelessPlugin {
    /// Wraps an already-opened core.
    #[must_use]
    pub const fn new(wireless: Arc<Wireless>) -> Self {
        Self { wireless }
    }
}

impl Plugin for WirelessPlugin {
    fn build(&self, app: &mut App) {
        debug!("installing wireless plugin");
        app.insert_resource(WirelessResource(Arc::clone(&self.wireless)))
            .insert_resource(SignalClock {
                tick: self.wireless.now(),
            })
            .add_systems(FixedUpdate, advance_signal_clock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockWorldAdapter;
    use crate::storage::MemoryBackend;
    use rstest::rstest;

    #[rstest]
    fn fixed_update_advances_clock() {
        let wireless = Arc::new(
            Wireless::new(
                Box::new(MemoryBackend::new()),
                Arc::new(MockWorldAdapter::new()),
            )
            .expect("open core"),
        );
        let mut app = App::new();
        app.add_plugins(WirelessPlugin::new(Arc::clone(&wireless)));

        app.world_mut().run_schedule(FixedUpdate);
        app.world_mut().run_schedule(FixedUpdate);

        let clock = app.world().resource::<SignalClock>();
        assert_eq!(clock.tick, 2);
        assert_eq!(wireless.now(), 2);
    }
}
