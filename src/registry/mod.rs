//! Channel registry: names, owners and the endpoints on each channel.
//!
//! The registry keeps a staged copy of the topology that is updated
//! synchronously under one lock. Every accepted mutation is validated against
//! the staged view and handed to the [`StorageGateway`] while that lock is
//! still held, so the write queue sees mutations in exactly the order they
//! were validated. Callers observe their own changes immediately, while the
//! router reads the gateway's committed cache.

mod error;

pub use error::RegistryError;

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::channel::{Channel, ChannelKey};
use crate::endpoint::{Direction, Endpoint, InvalidDelay, Location, Role, RoleKind};
use crate::host::{Authority, WorldAdapter};
use crate::storage::{StorageGateway, WriteOp};

/// Everything needed to place an endpoint on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Where the endpoint sits.
    pub location: Location,
    /// Whether the sign hangs on a wall.
    pub wall_mounted: bool,
    /// Direction the sign faces.
    pub facing: Direction,
    /// Player placing the endpoint.
    pub owner: String,
    /// Requested role.
    pub kind: RoleKind,
    /// Delay or period for timed receivers; ignored otherwise.
    pub delay: u32,
}

impl Registration {
    /// Starts a floor-mounted registration with no delay.
    #[must_use]
    pub fn new(location: Location, owner: impl Into<String>, kind: RoleKind) -> Self {
        Self {
            location,
            wall_mounted: false,
            facing: Direction::default(),
            owner: owner.into(),
            kind,
            delay: 0,
        }
    }

    /// Sets the delay or period.
    #[must_use]
    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }

    /// Sets how the sign is mounted.
    #[must_use]
    pub fn mounted(mut self, wall_mounted: bool, facing: Direction) -> Self {
        self.wall_mounted = wall_mounted;
        self.facing = facing;
        self
    }

    fn into_endpoint(self) -> Result<Endpoint, InvalidDelay> {
        let role = Role::with_delay(self.kind, self.delay)?;
        Ok(Endpoint::new(self.location, self.owner, role).mounted(self.wall_mounted, self.facing))
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// The channel did not exist and was created around the endpoint.
    Created,
    /// The endpoint joined an existing channel.
    Extended,
}

/// Owns the channel topology and enforces its invariants.
pub struct ChannelRegistry {
    staged: Mutex<HashMap<ChannelKey, Channel>>,
    gateway: Arc<StorageGateway>,
}

impl ChannelRegistry {
    /// Seeds the staged view from the gateway's cache.
    #[must_use]
    pub fn new(gateway: Arc<StorageGateway>) -> Self {
        let staged: HashMap<_, _> = gateway
            .cache()
            .channels()
            .into_iter()
            .map(|channel| (channel.key(), channel.clone()))
            .collect();
        Self {
            staged: Mutex::new(staged),
            gateway,
        }
    }

    /// Gateway receiving this registry's writes.
    #[must_use]
    pub fn gateway(&self) -> &Arc<StorageGateway> {
        &self.gateway
    }

    fn submit(&self, op: WriteOp) {
        let channel = op.channel_name().to_owned();
        if let Err(err) = self.gateway.enqueue(op) {
            warn!("write for channel `{channel}` was not queued: {err}");
        }
    }

    fn key_for(name: &str) -> Result<ChannelKey, RegistryError> {
        let key = ChannelKey::new(name);
        if key.is_empty() {
            return Err(RegistryError::InvalidName);
        }
        Ok(key)
    }

    /// Returns the channel named `name`, or an unsaved channel owned by
    /// `initial_owner` when none exists yet.
    ///
    /// A new channel is only stored once an endpoint is registered on it.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidName`] for blank names.
    pub fn resolve_or_create(
        &self,
        name: &str,
        initial_owner: &str,
    ) -> Result<Channel, RegistryError> {
        let key = Self::key_for(name)?;
        Ok(self
            .staged
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Channel::new(name, initial_owner)))
    }

    /// Registers an endpoint on `channel`, creating the channel if needed.
    ///
    /// Nothing is mutated or queued when validation fails.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidName`] for blank names,
    /// [`RegistryError::InvalidDelay`] when a delayer or clock is given less
    /// than its minimum, or [`RegistryError::LocationTaken`] when any channel
    /// already has an endpoint at the location.
    pub fn add_endpoint(
        &self,
        channel: &str,
        registration: Registration,
    ) -> Result<Registered, RegistryError> {
        let key = Self::key_for(channel)?;
        let endpoint = registration.into_endpoint()?;

        let mut staged = self.staged.lock();
        if let Some(holder) = staged.values().find(|c| c.contains(&endpoint.location)) {
            return Err(RegistryError::LocationTaken {
                channel: holder.name.clone(),
                location: endpoint.location,
            });
        }

        if let Some(existing) = staged.get_mut(&key) {
            existing.endpoints.push(endpoint.clone());
            debug!(
                "{} joined channel `{}` at {}",
                endpoint.role.kind(),
                existing.name,
                endpoint.location
            );
            let name = existing.name.clone();
            self.submit(WriteOp::CreateEndpoint {
                channel: name,
                endpoint,
            });
            return Ok(Registered::Extended);
        }

        let mut created = Channel::new(channel, endpoint.owner.clone());
        created.endpoints.push(endpoint);
        info!("created channel `{}`", created.name);
        staged.insert(key, created.clone());
        self.submit(WriteOp::CreateChannel(created));
        Ok(Registered::Created)
    }

    /// Removes the endpoint at `location` from `channel`.
    ///
    /// Returns `false`, changing nothing, when the channel or the endpoint is
    /// missing. The channel itself is kept even when it becomes empty.
    #[must_use]
    pub fn remove_endpoint(&self, channel: &str, location: &Location) -> bool {
        let mut staged = self.staged.lock();
        let Some(existing) = staged.get_mut(&ChannelKey::new(channel)) else {
            return false;
        };
        if existing.take_endpoint(location).is_none() {
            return false;
        }
        debug!("removed endpoint at {location} from `{}`", existing.name);
        let name = existing.name.clone();
        self.submit(WriteOp::RemoveEndpoint {
            channel: name,
            location: location.clone(),
        });
        true
    }

    /// Adds `owner` to the owners of `channel`.
    ///
    /// # Errors
    /// Returns [`RegistryError::ChannelNotFound`] or
    /// [`RegistryError::AlreadyOwner`].
    pub fn add_owner(&self, channel: &str, owner: &str) -> Result<(), RegistryError> {
        let mut staged = self.staged.lock();
        let existing = staged
            .get_mut(&ChannelKey::new(channel))
            .ok_or_else(|| RegistryError::ChannelNotFound(channel.to_owned()))?;
        if existing.is_owner(owner) {
            return Err(RegistryError::AlreadyOwner {
                channel: existing.name.clone(),
                owner: owner.to_owned(),
            });
        }
        existing.owners.push(owner.to_owned());
        let op = WriteOp::UpdateChannel {
            channel: existing.name.clone(),
            owners: existing.owners.clone(),
        };
        self.submit(op);
        Ok(())
    }

    /// Removes `owner` from the owners of `channel`.
    ///
    /// Removing the last owner leaves the channel open to everyone.
    ///
    /// # Errors
    /// Returns [`RegistryError::ChannelNotFound`] or
    /// [`RegistryError::NotOwner`].
    pub fn remove_owner(&self, channel: &str, owner: &str) -> Result<(), RegistryError> {
        let mut staged = self.staged.lock();
        let existing = staged
            .get_mut(&ChannelKey::new(channel))
            .ok_or_else(|| RegistryError::ChannelNotFound(channel.to_owned()))?;
        let Some(index) = existing.owners.iter().position(|o| o == owner) else {
            return Err(RegistryError::NotOwner {
                channel: existing.name.clone(),
                owner: owner.to_owned(),
            });
        };
        existing.owners.remove(index);
        let op = WriteOp::UpdateChannel {
            channel: existing.name.clone(),
            owners: existing.owners.clone(),
        };
        self.submit(op);
        Ok(())
    }

    /// Deletes `channel` together with all of its endpoints.
    ///
    /// # Errors
    /// Returns [`RegistryError::ChannelNotFound`].
    pub fn remove_channel(&self, channel: &str) -> Result<Channel, RegistryError> {
        let mut staged = self.staged.lock();
        let removed = staged
            .remove(&ChannelKey::new(channel))
            .ok_or_else(|| RegistryError::ChannelNotFound(channel.to_owned()))?;
        info!(
            "deleted channel `{}` with {} endpoints",
            removed.name,
            removed.endpoints.len()
        );
        self.submit(WriteOp::DeleteChannel {
            channel: removed.name.clone(),
        });
        Ok(removed)
    }

    /// Returns `true` when `requester` may manage `channel`.
    ///
    /// Unknown channels and channels without owners are open to everyone.
    #[must_use]
    pub fn has_access(&self, requester_is_admin: bool, requester: &str, channel: &str) -> bool {
        let staged = self.staged.lock();
        match staged.get(&ChannelKey::new(channel)) {
            None => true,
            Some(existing) if existing.owners.is_empty() => true,
            Some(existing) => requester_is_admin || existing.is_owner(requester),
        }
    }

    /// [`Self::has_access`] with the admin flag taken from `authority`.
    #[must_use]
    pub fn has_access_with(
        &self,
        authority: &dyn Authority,
        requester: &str,
        channel: &str,
    ) -> bool {
        self.has_access(authority.is_admin(requester), requester, channel)
    }

    /// Channel holding an endpoint at `location`.
    #[must_use]
    pub fn find_channel_containing(&self, location: &Location) -> Option<Channel> {
        self.staged
            .lock()
            .values()
            .find(|c| c.contains(location))
            .cloned()
    }

    /// Snapshot of the channel named `name`.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.staged.lock().get(&ChannelKey::new(name)).cloned()
    }

    /// Snapshot of every channel, sorted by key.
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.staged.lock().values().cloned().collect();
        channels.sort_by_key(Channel::key);
        channels
    }

    /// Endpoints whose world the host does not know, grouped by channel name.
    #[must_use]
    pub fn invalid_endpoints(&self, host: &dyn WorldAdapter) -> BTreeMap<String, Vec<Endpoint>> {
        let staged = self.staged.lock();
        let mut invalid = BTreeMap::new();
        for channel in staged.values() {
            let lost: Vec<_> = channel
                .endpoints
                .iter()
                .filter(|e| !host.world_exists(&e.location.world))
                .cloned()
                .collect();
            if !lost.is_empty() {
                invalid.insert(channel.name.clone(), lost);
            }
        }
        invalid
    }

    /// Removes every endpoint reported by [`Self::invalid_endpoints`].
    ///
    /// Returns how many endpoints were removed.
    #[must_use]
    pub fn purge_invalid_endpoints(&self, host: &dyn WorldAdapter) -> usize {
        let mut staged = self.staged.lock();
        let mut removed = Vec::new();
        for channel in staged.values_mut() {
            let (lost, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut channel.endpoints)
                .into_iter()
                .partition(|e| !host.world_exists(&e.location.world));
            channel.endpoints = kept;
            removed.extend(lost.into_iter().map(|e| (channel.name.clone(), e.location)));
        }
        let count = removed.len();
        for (channel, location) in removed {
            self.submit(WriteOp::RemoveEndpoint { channel, location });
        }
        drop(staged);
        if count > 0 {
            info!("purged {count} endpoints in unloaded worlds");
        }
        count
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.staged.lock().len())
            .finish_non_exhaustive()
    }
}
