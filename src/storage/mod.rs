//! Durable storage for channel topology.
//!
//! Every mutation travels through the [`StorageGateway`]: callers enqueue a
//! [`WriteOp`], a single worker thread applies the queue to a
//! [`StorageBackend`] in submission order, then patches the [`Cache`] read by
//! the router. Backends only need to honour the record-level contract below;
//! they never see concurrent calls.

mod cache;
mod gateway;
mod json_dir;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use cache::Cache;
pub use gateway::{StorageGateway, WriteOp, WriteStats};
pub use json_dir::JsonDirBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub use sqlite::SqliteBackend;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{Channel, ChannelKey};
use crate::endpoint::{Direction, Endpoint, Location, Role, RoleKind};

/// Errors raised by storage backends and the gateway.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A flat-file document could not be encoded or decoded.
    #[error("channel document is malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// The relational backend reported an error.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored record violates the endpoint model.
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
    /// The operation referenced a channel the backend does not hold.
    #[error("channel `{0}` is not stored")]
    MissingChannel(String),
    /// The backend was used before `init` or after `close`.
    #[error("storage backend is not open")]
    NotOpen,
    /// The gateway worker has stopped.
    #[error("storage gateway is closed")]
    Closed,
    /// The worker thread could not be started.
    #[error("failed to start storage worker: {0}")]
    Worker(#[source] io::Error),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Persisted shape of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Channel name as first registered.
    pub name: String,
    /// Owner identifiers in insertion order.
    pub owners: Vec<String>,
}

impl From<&Channel> for ChannelRecord {
    fn from(channel: &Channel) -> Self {
        Self {
            name: channel.name.clone(),
            owners: channel.owners.clone(),
        }
    }
}

/// Persisted shape of an endpoint, scoped to its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    /// Name of the owning channel.
    pub channel_name: String,
    /// World the endpoint lives in.
    pub world: String,
    /// Block x coordinate.
    pub x: i32,
    /// Block y coordinate.
    pub y: i32,
    /// Block z coordinate.
    pub z: i32,
    /// Whether the sign hangs on a wall.
    pub wall_mounted: bool,
    /// Direction the sign faces.
    pub facing: Direction,
    /// Player that placed the endpoint.
    pub owner_id: String,
    /// Role discriminator.
    pub role: RoleKind,
    /// Delay or period for timed receivers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
}

impl EndpointRecord {
    /// Flattens `endpoint` into its record under `channel_name`.
    #[must_use]
    pub fn new(channel_name: &str, endpoint: &Endpoint) -> Self {
        Self {
            channel_name: channel_name.to_owned(),
            world: endpoint.location.world.clone(),
            x: endpoint.location.x,
            y: endpoint.location.y,
            z: endpoint.location.z,
            wall_mounted: endpoint.wall_mounted,
            facing: endpoint.facing,
            owner_id: endpoint.owner.clone(),
            role: endpoint.role.kind(),
            delay: endpoint.role.delay(),
        }
    }

    /// Location named by the record.
    #[must_use]
    pub fn location(&self) -> Location {
        Location::new(self.world.clone(), self.x, self.y, self.z)
    }

    /// Rebuilds the endpoint, re-validating its role parameter.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidRecord`] when a stored delay is below
    /// the minimum for its role.
    pub fn into_endpoint(self) -> Result<Endpoint, StorageError> {
        let role = Role::with_delay(self.role, self.delay.unwrap_or_default())
            .map_err(|err| StorageError::InvalidRecord(err.to_string()))?;
        let location = self.location();
        Ok(Endpoint {
            location,
            wall_mounted: self.wall_mounted,
            facing: self.facing,
            owner: self.owner_id,
            role,
        })
    }
}

/// Record-level contract every durable store implements.
///
/// The gateway worker is the only caller, one operation at a time.
#[cfg_attr(test, mockall::automock)]
pub trait StorageBackend: Send {
    /// Opens the store, creating its schema or directory when missing.
    ///
    /// # Errors
    /// Returns an error when the store cannot be opened; the gateway treats
    /// this as fatal.
    fn init(&mut self) -> Result<(), StorageError>;

    /// Loads every channel with its endpoints.
    ///
    /// # Errors
    /// Propagates backend read failures.
    fn list_channels(&mut self) -> Result<Vec<Channel>, StorageError>;

    /// Loads one channel by key.
    ///
    /// # Errors
    /// Propagates backend read failures.
    fn channel(&mut self, key: &ChannelKey) -> Result<Option<Channel>, StorageError>;

    /// Stores a channel record.
    ///
    /// A record already stored under the same key has its name and owners
    /// replaced; its endpoints are kept.
    ///
    /// # Errors
    /// Propagates backend write failures.
    fn insert_channel(&mut self, record: &ChannelRecord) -> Result<(), StorageError>;

    /// Replaces the stored record of the channel at `key`.
    ///
    /// # Errors
    /// Returns [`StorageError::MissingChannel`] when nothing is stored under
    /// `key`, or propagates backend write failures.
    fn update_channel(
        &mut self,
        key: &ChannelKey,
        record: &ChannelRecord,
    ) -> Result<(), StorageError>;

    /// Deletes the channel at `key` and all of its endpoints.
    ///
    /// # Errors
    /// Propagates backend write failures.
    fn delete_channel(&mut self, key: &ChannelKey) -> Result<(), StorageError>;

    /// Stores an endpoint under the channel at `key`.
    ///
    /// # Errors
    /// Returns [`StorageError::MissingChannel`] when the channel is absent, or
    /// propagates backend write failures.
    fn insert_endpoint(
        &mut self,
        key: &ChannelKey,
        record: &EndpointRecord,
    ) -> Result<(), StorageError>;

    /// Deletes the endpoint at `location` from the channel at `key`.
    ///
    /// # Errors
    /// Propagates backend write failures.
    fn delete_endpoint(
        &mut self,
        key: &ChannelKey,
        location: &Location,
    ) -> Result<(), StorageError>;

    /// Releases backend resources.
    ///
    /// # Errors
    /// Propagates failures flushing or closing the store.
    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn endpoint_record_round_trips_role_parameters() {
        let endpoint = Endpoint::new(
            Location::new("world", 4, 5, 6),
            "alice",
            Role::ReceiverClock { period: 120 },
        )
        .mounted(true, Direction::East);
        let record = EndpointRecord::new("Red", &endpoint);
        assert_eq!(record.delay, Some(120));
        assert_eq!(record.role, RoleKind::ReceiverClock);
        let rebuilt = record.into_endpoint().expect("record should be valid");
        assert_eq!(rebuilt, endpoint);
    }

    #[rstest]
    fn record_with_short_delay_is_rejected() {
        let mut record = EndpointRecord::new(
            "Red",
            &Endpoint::new(
                Location::new("world", 0, 0, 0),
                "alice",
                Role::ReceiverDelayer { delay: 60 },
            ),
        );
        record.delay = Some(10);
        assert!(matches!(
            record.into_endpoint(),
            Err(StorageError::InvalidRecord(_))
        ));
    }

    #[rstest]
    fn record_serialises_with_camel_case_fields() {
        let record = EndpointRecord::new(
            "Red",
            &Endpoint::new(Location::new("world", 0, 1, 2), "alice", Role::Transmitter),
        );
        let json = serde_json::to_value(&record).expect("record should serialise");
        assert_eq!(json["channelName"], "Red");
        assert_eq!(json["role"], "TRANSMITTER");
        assert!(json.get("delay").is_none());
    }
}
