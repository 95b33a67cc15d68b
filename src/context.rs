//! Application context tying storage, registry and router together.
//!
//! A host constructs one [`Wireless`] at start-up and routes every adapter
//! call through it. There is no global state.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info};
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

use crate::channel::Channel;
use crate::config::{Config, ConfigError};
use crate::endpoint::{Endpoint, Location, Tick};
use crate::host::{Authority, WorldAdapter};
use crate::registry::{ChannelRegistry, Registered, Registration, RegistryError};
use crate::router::SignalRouter;
use crate::storage::{StorageBackend, StorageError, StorageGateway, WriteStats};

/// Failures constructing or shutting down a [`Wireless`] context.
#[derive(Debug, Error)]
pub enum WirelessError {
    /// The storage backend could not be opened or loaded.
    #[error("storage initialisation failed: {0}")]
    StorageInit(#[source] StorageError),
    /// Configuration was unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Closing the backend failed.
    #[error("storage shutdown failed: {0}")]
    Close(#[source] StorageError),
}

/// Wireless channel core bound to one host world adapter.
pub struct Wireless {
    registry: ChannelRegistry,
    router: Mutex<SignalRouter>,
    host: Arc<dyn WorldAdapter>,
}

impl Wireless {
    /// Opens `backend`, loads the topology and prepares the router.
    ///
    /// # Errors
    /// Returns [`WirelessError::StorageInit`] when the backend cannot be
    /// opened. This is fatal: the host should disable the feature.
    pub fn new(
        backend: Box<dyn StorageBackend>,
        host: Arc<dyn WorldAdapter>,
    ) -> Result<Self, WirelessError> {
        let gateway = StorageGateway::open(backend).map_err(|err| {
            error!("cannot open channel storage: {err}");
            WirelessError::StorageInit(err)
        })?;
        let registry = ChannelRegistry::new(Arc::new(gateway));
        info!(
            "wireless core ready with {} channels",
            registry.channels().len()
        );
        Ok(Self {
            registry,
            router: Mutex::new(SignalRouter::new()),
            host,
        })
    }

    /// Opens the backend selected by `config`.
    ///
    /// # Errors
    /// Returns [`WirelessError::Config`] when the backend is unavailable, or
    /// [`WirelessError::StorageInit`] when it cannot be opened.
    pub fn from_config(
        config: &Config,
        host: Arc<dyn WorldAdapter>,
    ) -> Result<Self, WirelessError> {
        Self::new(config.open_backend()?, host)
    }

    /// Registry holding the staged topology.
    #[must_use]
    pub const fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Gateway persisting the topology.
    #[must_use]
    pub fn gateway(&self) -> &StorageGateway {
        self.registry.gateway()
    }

    /// Write counters of the storage gateway.
    #[must_use]
    pub fn stats(&self) -> &WriteStats {
        self.gateway().stats()
    }

    /// Locks the router after dropping state for endpoints whose removal
    /// has since reached the cache.
    fn router(&self) -> MutexGuard<'_, SignalRouter> {
        let mut router = self.router.lock();
        for location in self.gateway().take_retired() {
            router.forget(&location);
        }
        router
    }

    /// Reports a transmitter at `location` switching to `level`.
    pub fn notify_transmitter_changed(&self, location: &Location, level: bool) {
        let cache = self.gateway().cache();
        self.router()
            .notify_transmitter_changed(&cache, self.host.as_ref(), location, level);
    }

    /// Advances the signal clock to `now`, firing due timers.
    pub fn advance_to(&self, now: Tick) {
        let cache = self.gateway().cache();
        self.router().advance_to(&cache, self.host.as_ref(), now);
    }

    /// Advances the signal clock by one tick and returns the new tick.
    #[must_use]
    pub fn tick(&self) -> Tick {
        let cache = self.gateway().cache();
        let mut router = self.router();
        let next = router.now().saturating_add(1);
        router.advance_to(&cache, self.host.as_ref(), next);
        next
    }

    /// Current signal clock tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.router.lock().now()
    }

    /// Registers an endpoint on `channel`.
    ///
    /// # Errors
    /// See [`ChannelRegistry::add_endpoint`].
    pub fn register_endpoint(
        &self,
        channel: &str,
        registration: Registration,
    ) -> Result<Registered, RegistryError> {
        self.registry.add_endpoint(channel, registration)
    }

    /// Unregisters the endpoint at `location` and drops its runtime state.
    #[must_use]
    pub fn unregister_endpoint(&self, channel: &str, location: &Location) -> bool {
        let removed = self.registry.remove_endpoint(channel, location);
        if removed {
            self.router.lock().forget(location);
        }
        removed
    }

    /// Channel holding an endpoint at `location`, read from the committed
    /// cache.
    #[must_use]
    pub fn find_channel_at(&self, location: &Location) -> Option<Channel> {
        self.gateway().cache().channel_at(location).cloned()
    }

    /// Last level seen on `channel`.
    #[must_use]
    pub fn is_channel_active(&self, channel: &str) -> bool {
        self.router.lock().is_channel_active(channel)
    }

    /// Adds an owner to `channel`.
    ///
    /// # Errors
    /// See [`ChannelRegistry::add_owner`].
    pub fn add_owner(&self, channel: &str, owner: &str) -> Result<(), RegistryError> {
        self.registry.add_owner(channel, owner)
    }

    /// Removes an owner from `channel`.
    ///
    /// # Errors
    /// See [`ChannelRegistry::remove_owner`].
    pub fn remove_owner(&self, channel: &str, owner: &str) -> Result<(), RegistryError> {
        self.registry.remove_owner(channel, owner)
    }

    /// Deletes `channel` and forgets the runtime state of its receivers.
    ///
    /// # Errors
    /// See [`ChannelRegistry::remove_channel`].
    pub fn remove_channel(&self, channel: &str) -> Result<Channel, RegistryError> {
        let removed = self.registry.remove_channel(channel)?;
        let mut router = self.router.lock();
        for endpoint in &removed.endpoints {
            router.forget(&endpoint.location);
        }
        Ok(removed)
    }

    /// Returns `true` when `requester` may manage `channel`.
    #[must_use]
    pub fn has_access(&self, authority: &dyn Authority, requester: &str, channel: &str) -> bool {
        self.registry.has_access_with(authority, requester, channel)
    }

    /// Endpoints in worlds the host no longer knows, by channel name.
    #[must_use]
    pub fn invalid_endpoints(&self) -> BTreeMap<String, Vec<Endpoint>> {
        self.registry.invalid_endpoints(self.host.as_ref())
    }

    /// Removes every endpoint in an unknown world. Returns how many went.
    #[must_use]
    pub fn purge_invalid_endpoints(&self) -> usize {
        let invalid = self.invalid_endpoints();
        let count = self.registry.purge_invalid_endpoints(self.host.as_ref());
        let mut router = self.router.lock();
        for endpoint in invalid.values().flatten() {
            router.forget(&endpoint.location);
        }
        count
    }

    /// Snapshot of every channel in the staged view.
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        self.registry.channels()
    }

    /// Drains pending writes and closes storage. Safe to call twice.
    ///
    /// # Errors
    /// Returns [`WirelessError::Close`] when the backend fails to close.
    pub fn close(&self) -> Result<(), WirelessError> {
        self.gateway().close().map_err(WirelessError::Close)
    }
}

impl std::fmt::Debug for Wireless {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wireless")
            .field("registry", &self.registry)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
