//! Validation failures reported by the channel registry.

use thiserror::Error;

use crate::endpoint::{InvalidDelay, Location};

/// Reasons a topology mutation was refused.
///
/// Storage failures never appear here: the registry hands durable writes to
/// the gateway, which logs and counts them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The channel name is empty once trimmed.
    #[error("channel name must not be blank")]
    InvalidName,
    /// A delayer or clock was placed with too short a delay.
    #[error(transparent)]
    InvalidDelay(#[from] InvalidDelay),
    /// No channel is registered under the name.
    #[error("channel `{0}` does not exist")]
    ChannelNotFound(String),
    /// No endpoint is registered at the location.
    #[error("no endpoint at {0}")]
    EndpointNotFound(Location),
    /// The player already owns the channel.
    #[error("`{owner}` already owns channel `{channel}`")]
    AlreadyOwner {
        /// Channel name.
        channel: String,
        /// Player identifier.
        owner: String,
    },
    /// The player is not an owner of the channel.
    #[error("`{owner}` does not own channel `{channel}`")]
    NotOwner {
        /// Channel name.
        channel: String,
        /// Player identifier.
        owner: String,
    },
    /// Another endpoint already occupies the location.
    #[error("{location} is already registered on channel `{channel}`")]
    LocationTaken {
        /// Channel holding the existing endpoint.
        channel: String,
        /// Contested location.
        location: Location,
    },
}
