//! Committed view of the stored topology.

use hashbrown::HashMap;

use super::WriteOp;
use crate::channel::{Channel, ChannelKey};
use crate::endpoint::{Endpoint, Location};

/// Channel snapshots plus an index from endpoint location to channel key.
///
/// Only the gateway worker mutates the cache, after it has attempted each
/// queued write against the backend.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    channels: HashMap<ChannelKey, Channel>,
    index: HashMap<Location, ChannelKey>,
}

impl Cache {
    /// Builds the view from the channels loaded at start-up.
    #[must_use]
    pub fn from_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        let mut cache = Self::default();
        for channel in channels {
            cache.insert(channel);
        }
        cache
    }

    /// Channel stored under `key`.
    #[must_use]
    pub fn channel(&self, key: &ChannelKey) -> Option<&Channel> {
        self.channels.get(key)
    }

    /// Channel holding an endpoint at `location`.
    #[must_use]
    pub fn channel_at(&self, location: &Location) -> Option<&Channel> {
        self.index.get(location).and_then(|key| self.channels.get(key))
    }

    /// Endpoint registered at `location`.
    #[must_use]
    pub fn endpoint_at(&self, location: &Location) -> Option<&Endpoint> {
        self.channel_at(location)
            .and_then(|channel| channel.endpoint_at(location))
    }

    /// Key of the channel holding an endpoint at `location`.
    #[must_use]
    pub fn key_at(&self, location: &Location) -> Option<&ChannelKey> {
        self.index.get(location)
    }

    /// Every channel, sorted by key.
    #[must_use]
    pub fn channels(&self) -> Vec<&Channel> {
        let mut channels: Vec<_> = self.channels.values().collect();
        channels.sort_by_key(|c| c.key());
        channels
    }

    /// Number of cached channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` when no channel is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn insert(&mut self, channel: Channel) {
        let key = channel.key();
        self.remove(&key);
        for endpoint in &channel.endpoints {
            self.index.insert(endpoint.location.clone(), key.clone());
        }
        self.channels.insert(key, channel);
    }

    fn remove(&mut self, key: &ChannelKey) -> Option<Channel> {
        let channel = self.channels.remove(key)?;
        for endpoint in &channel.endpoints {
            if self.index.get(&endpoint.location) == Some(key) {
                self.index.remove(&endpoint.location);
            }
        }
        Some(channel)
    }

    /// Folds one queued write into the view and returns the locations whose
    /// endpoint it removed.
    pub(crate) fn apply(&mut self, op: &WriteOp) -> Vec<Location> {
        match op {
            WriteOp::CreateChannel(channel) => {
                self.insert(channel.clone());
                Vec::new()
            }
            WriteOp::UpdateChannel { channel, owners } => {
                if let Some(cached) = self.channels.get_mut(&ChannelKey::new(channel)) {
                    cached.owners.clone_from(owners);
                }
                Vec::new()
            }
            WriteOp::DeleteChannel { channel } => self
                .remove(&ChannelKey::new(channel))
                .map(|removed| removed.endpoints.into_iter().map(|e| e.location).collect())
                .unwrap_or_default(),
            WriteOp::CreateEndpoint { channel, endpoint } => {
                let key = ChannelKey::new(channel);
                let Some(cached) = self.channels.get_mut(&key) else {
                    return Vec::new();
                };
                let replaced = cached.take_endpoint(&endpoint.location);
                cached.endpoints.push(endpoint.clone());
                self.index.insert(endpoint.location.clone(), key);
                replaced.map(|e| e.location).into_iter().collect()
            }
            WriteOp::RemoveEndpoint { channel, location } => {
                let key = ChannelKey::new(channel);
                let Some(cached) = self.channels.get_mut(&key) else {
                    return Vec::new();
                };
                let Some(removed) = cached.take_endpoint(location) else {
                    return Vec::new();
                };
                if self.index.get(location) == Some(&key) {
                    self.index.remove(location);
                }
                vec![removed.location]
            }
        }
    }
}
