//! Volatile backend for tests and hosts that do not need durability.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ChannelRecord, EndpointRecord, StorageBackend, StorageError};
use crate::channel::{Channel, ChannelKey};
use crate::endpoint::Location;

/// In-memory store.
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the gateway worker wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    channels: Arc<Mutex<BTreeMap<ChannelKey, Channel>>>,
}

impl MemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with `channels`.
    #[must_use]
    pub fn with_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        let map = channels.into_iter().map(|c| (c.key(), c)).collect();
        Self {
            channels: Arc::new(Mutex::new(map)),
        }
    }

    /// Copies the stored channels in key order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Channel> {
        self.channels.lock().values().cloned().collect()
    }
}

impl StorageBackend for MemoryBackend {
    fn init(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn list_channels(&mut self) -> Result<Vec<Channel>, StorageError> {
        Ok(self.snapshot())
    }

    fn channel(&mut self, key: &ChannelKey) -> Result<Option<Channel>, StorageError> {
        Ok(self.channels.lock().get(key).cloned())
    }

    fn insert_channel(&mut self, record: &ChannelRecord) -> Result<(), StorageError> {
        let mut channels = self.channels.lock();
        let channel = channels
            .entry(ChannelKey::new(&record.name))
            .or_insert_with(|| Channel::new(record.name.clone(), String::new()));
        channel.name.clone_from(&record.name);
        channel.owners.clone_from(&record.owners);
        Ok(())
    }

    fn update_channel(
        &mut self,
        key: &ChannelKey,
        record: &ChannelRecord,
    ) -> Result<(), StorageError> {
        let mut channels = self.channels.lock();
        let channel = channels
            .get_mut(key)
            .ok_or_else(|| StorageError::MissingChannel(key.to_string()))?;
        channel.name.clone_from(&record.name);
        channel.owners.clone_from(&record.owners);
        Ok(())
    }

    fn delete_channel(&mut self, key: &ChannelKey) -> Result<(), StorageError> {
        self.channels.lock().remove(key);
        Ok(())
    }

    fn insert_endpoint(
        &mut self,
        key: &ChannelKey,
        record: &EndpointRecord,
    ) -> Result<(), StorageError> {
        let endpoint = record.clone().into_endpoint()?;
        let mut channels = self.channels.lock();
        let channel = channels
            .get_mut(key)
            .ok_or_else(|| StorageError::MissingChannel(key.to_string()))?;
        channel.take_endpoint(&endpoint.location);
        channel.endpoints.push(endpoint);
        Ok(())
    }

    fn delete_endpoint(
        &mut self,
        key: &ChannelKey,
        location: &Location,
    ) -> Result<(), StorageError> {
        if let Some(channel) = self.channels.lock().get_mut(key) {
            channel.take_endpoint(location);
        }
        Ok(())
    }
}
