//! Signal routing from transmitters to the receivers on their channel.
//!
//! The router is driven by two calls from the host: a transmitter changing
//! level, and time advancing. Both read topology from the gateway's
//! [`Cache`] and write block levels back through the [`WorldAdapter`].

mod receiver;
mod scheduler;

pub use receiver::{ReceiverState, TimerRequest, Transition};
pub use scheduler::{Fired, TickScheduler};

use hashbrown::HashMap;
use log::{debug, warn};

use crate::channel::ChannelKey;
use crate::endpoint::{Endpoint, Location, Role, Tick};
use crate::host::WorldAdapter;
use crate::storage::Cache;

/// Fans transmitter changes out to receivers and runs their timers.
#[derive(Debug, Default)]
pub struct SignalRouter {
    states: HashMap<Location, ReceiverState>,
    scheduler: TickScheduler,
    levels: HashMap<ChannelKey, bool>,
    now: Tick,
}

impl SignalRouter {
    /// Creates a router at tick zero with no receiver state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick the router has advanced to.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.now
    }

    /// Last level seen on `channel`. Channels never driven read as low.
    #[must_use]
    pub fn is_channel_active(&self, channel: &str) -> bool {
        self.levels
            .get(&ChannelKey::new(channel))
            .copied()
            .unwrap_or(false)
    }

    /// Number of receivers holding runtime state.
    #[must_use]
    pub fn tracked_receivers(&self) -> usize {
        self.states.len()
    }

    /// Number of receivers with a pending timer.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }

    /// Drops runtime state for the receiver at `location`.
    pub fn forget(&mut self, location: &Location) {
        self.states.remove(location);
        self.scheduler.cancel(location);
    }

    /// Propagates a transmitter at `location` switching to `level`.
    ///
    /// Immediate receivers are driven synchronously in endpoint order;
    /// delayers and clocks schedule timers relative to [`Self::now`]. Events
    /// from locations that are not a cached transmitter are ignored.
    pub fn notify_transmitter_changed(
        &mut self,
        cache: &Cache,
        host: &dyn WorldAdapter,
        location: &Location,
        level: bool,
    ) {
        let Some(channel) = cache.channel_at(location) else {
            debug!("no channel at {location}, ignoring level change");
            return;
        };
        if !matches!(
            channel.endpoint_at(location).map(|e| e.role),
            Some(Role::Transmitter)
        ) {
            debug!("{location} is not a transmitter on `{}`", channel.name);
            return;
        }
        debug!("channel `{}` switched to {level}", channel.name);
        self.levels.insert(channel.key(), level);

        for endpoint in channel.receivers() {
            if !host.world_exists(&endpoint.location.world) {
                warn!(
                    "skipping receiver at {}: world is not loaded",
                    endpoint.location
                );
                continue;
            }
            let now = self.now;
            let Some(state) = self.state_for(endpoint) else {
                continue;
            };
            let transition = state.on_input(endpoint.role, level, now);
            self.apply(host, &endpoint.location, transition);
        }
    }

    /// Advances time to `now`, firing every timer due on the way.
    ///
    /// Timers fire one at a time in tick order, so a clock that reschedules
    /// itself within the window fires again before this returns. A clock
    /// that has fallen far behind collapses its missed pulses into one.
    /// Moving backwards is ignored.
    pub fn advance_to(&mut self, cache: &Cache, host: &dyn WorldAdapter, now: Tick) {
        if now < self.now {
            debug!("ignoring clock moving back from {} to {now}", self.now);
            return;
        }
        while let Some(fired) = self.scheduler.pop_due(now) {
            self.now = fired.fire_at;
            self.fire(cache, host, &fired, now);
        }
        self.now = now;
    }

    fn fire(&mut self, cache: &Cache, host: &dyn WorldAdapter, fired: &Fired, until: Tick) {
        let Some(endpoint) = cache.endpoint_at(&fired.location) else {
            debug!("timer for removed receiver at {}", fired.location);
            self.states.remove(&fired.location);
            return;
        };
        if !host.world_exists(&endpoint.location.world) {
            warn!(
                "dropping timer at {}: world is not loaded",
                endpoint.location
            );
            self.states.remove(&fired.location);
            return;
        }
        let Some(state) = self.state_for(endpoint) else {
            return;
        };
        let transition = state.on_timer(endpoint.role, fired.fire_at, until);
        self.apply(host, &endpoint.location, transition);
    }

    /// State for `endpoint`, reset when its role no longer matches.
    fn state_for(&mut self, endpoint: &Endpoint) -> Option<&mut ReceiverState> {
        let fresh = ReceiverState::for_role(endpoint.role)?;
        let state = self
            .states
            .entry(endpoint.location.clone())
            .or_insert(fresh);
        if state.kind() != endpoint.role.kind() {
            *state = fresh;
        }
        Some(state)
    }

    fn apply(&mut self, host: &dyn WorldAdapter, location: &Location, transition: Transition) {
        match transition.timer {
            TimerRequest::Keep => {}
            TimerRequest::Schedule(at) => self.scheduler.schedule(location.clone(), at),
            TimerRequest::Cancel => self.scheduler.cancel(location),
        }
        if let Some(level) = transition.emit {
            if let Err(err) = host.apply_output(location, level) {
                warn!("output at {location} failed: {err}");
            }
        }
    }
}
