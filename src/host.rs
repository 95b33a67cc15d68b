//! Seams between the core and the host that owns the physical world.

use thiserror::Error;

use crate::endpoint::Location;

/// Failures reported by the host when it cannot apply an output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The target world is not loaded.
    #[error("world `{0}` is not loaded")]
    WorldUnloaded(String),
    /// The host refused the write, for example because the block changed.
    #[error("host rejected output at {location}: {reason}")]
    Rejected {
        /// Where the write was attempted.
        location: Location,
        /// Host supplied explanation.
        reason: String,
    },
}

/// World adapter consumed by the router and the registry.
#[cfg_attr(test, mockall::automock)]
pub trait WorldAdapter: Send + Sync {
    /// Returns `true` while `world` is loaded.
    fn world_exists(&self, world: &str) -> bool;

    /// Drives the block at `location` to `level`.
    ///
    /// Called while the router holds its lock, so implementations must not
    /// call back into the wireless context.
    ///
    /// # Errors
    /// Returns a [`HostError`] when the host cannot apply the write.
    fn apply_output(&self, location: &Location, level: bool) -> Result<(), HostError>;
}

/// Authorization collaborator consulted by access checks.
#[cfg_attr(test, mockall::automock)]
pub trait Authority {
    /// Returns `true` when `requester` may manage every channel.
    fn is_admin(&self, requester: &str) -> bool;
}
