//! Named groups of endpoints and the key used to look them up.

use std::fmt;

use crate::endpoint::{Endpoint, Location, RoleKind};

/// Case-folded channel name used for every lookup.
///
/// Channel names compare without regard to case while the channel itself
/// keeps the spelling it was created with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Folds `name` into its lookup key.
    ///
    /// # Examples
    ///
    /// ```
    /// use wireless::ChannelKey;
    /// assert_eq!(ChannelKey::new(" Red "), ChannelKey::new("red"));
    /// ```
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// Borrows the folded key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for names that fold to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named channel: its owners and the endpoints sharing its signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Name as first registered.
    pub name: String,
    /// Players allowed to manage the channel, in the order they were added.
    pub owners: Vec<String>,
    /// Endpoints in registration order.
    pub endpoints: Vec<Endpoint>,
}

impl Channel {
    /// Creates a channel with a single owner and no endpoints yet.
    #[must_use]
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_owned(),
            owners: vec![owner.into()],
            endpoints: Vec::new(),
        }
    }

    /// Lookup key for this channel's name.
    #[must_use]
    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(&self.name)
    }

    /// Returns `true` when `owner` is listed.
    #[must_use]
    pub fn is_owner(&self, owner: &str) -> bool {
        self.owners.iter().any(|o| o == owner)
    }

    /// Finds the endpoint registered at `location`.
    #[must_use]
    pub fn endpoint_at(&self, location: &Location) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.is_at(location))
    }

    /// Returns `true` when an endpoint is registered at `location`.
    #[must_use]
    pub fn contains(&self, location: &Location) -> bool {
        self.endpoint_at(location).is_some()
    }

    /// Removes and returns the endpoint at `location`.
    pub fn take_endpoint(&mut self, location: &Location) -> Option<Endpoint> {
        let index = self.endpoints.iter().position(|e| e.is_at(location))?;
        Some(self.endpoints.remove(index))
    }

    /// Endpoints whose role consumes channel signals.
    pub fn receivers(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(|e| e.role.is_receiver())
    }

    /// Number of endpoints with the given role kind.
    #[must_use]
    pub fn count_of(&self, kind: RoleKind) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.role.kind() == kind)
            .count()
    }
}
