#![cfg_attr(docsrs, feature(doc_cfg))]
//! Channel-based wireless signal routing.
//!
//! Endpoints placed in a host world join named channels. When a transmitter
//! changes level, every receiver on its channel is driven through its own
//! state machine, and the resulting outputs are written back through the
//! host's [`WorldAdapter`]. Topology is persisted through a single ordered
//! write queue in front of a pluggable storage backend.
pub mod channel;
pub mod config;
pub mod constants;
pub mod context;
pub mod endpoint;
pub mod host;
pub mod logging;
#[cfg(feature = "bevy")]
#[cfg_attr(docsrs, doc(cfg(feature = "bevy")))]
pub mod plugin;
pub mod registry;
pub mod router;
pub mod storage;
pub use constants::*;

// Re-export commonly used items
pub use channel::{Channel, ChannelKey};
pub use config::{Config, ConfigError, StorageKind};
pub use context::{Wireless, WirelessError};
pub use endpoint::{Direction, Endpoint, InvalidDelay, Location, Role, RoleKind, Tick, UnknownRole};
pub use host::{Authority, HostError, WorldAdapter};
pub use logging::init as init_logging;
#[cfg(feature = "bevy")]
#[cfg_attr(docsrs, doc(cfg(feature = "bevy")))]
pub use plugin::{SignalClock, WirelessPlugin, WirelessResource};
pub use registry::{ChannelRegistry, Registered, Registration, RegistryError};
pub use router::SignalRouter;
pub use storage::{StorageError, StorageGateway};
