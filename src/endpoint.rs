//! Value types describing a registered point: where it is, which way it
//! faces, who placed it, and what role it plays on its channel.
//!
//! Nothing here performs I/O. The only behaviour is structural validation of
//! role parameters such as the delayer's delay.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MIN_CLOCK_PERIOD_TICKS, MIN_DELAY_TICKS};

/// Discrete host time unit.
pub type Tick = u64;

/// Block position inside a named world.
///
/// World names compare without regard to ASCII case, so `World` and `world`
/// name the same place. The original spelling is preserved for display and
/// persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Name of the world the block lives in.
    pub world: String,
    /// Block x coordinate.
    pub x: i32,
    /// Block y coordinate.
    pub y: i32,
    /// Block z coordinate.
    pub z: i32,
}

impl Location {
    /// Creates a location from a world name and block coordinates.
    #[must_use]
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Returns `true` when `world` names this location's world.
    #[must_use]
    pub fn is_in_world(&self, world: &str) -> bool {
        self.world.eq_ignore_ascii_case(world)
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.z == other.z
            && self.is_in_world(&other.world)
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.world.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
        self.x.hash(state);
        self.y.hash(state);
        self.z.hash(state);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

/// Direction a sign faces.
///
/// Floor signs may point at any of the sixteen compass rotations; wall signs
/// only ever use the four cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Facing north.
    #[default]
    North,
    /// Facing north-north-east.
    NorthNorthEast,
    /// Facing north-east.
    NorthEast,
    /// Facing east-north-east.
    EastNorthEast,
    /// Facing east.
    East,
    /// Facing east-south-east.
    EastSouthEast,
    /// Facing south-east.
    SouthEast,
    /// Facing south-south-east.
    SouthSouthEast,
    /// Facing south.
    South,
    /// Facing south-south-west.
    SouthSouthWest,
    /// Facing south-west.
    SouthWest,
    /// Facing west-south-west.
    WestSouthWest,
    /// Facing west.
    West,
    /// Facing west-north-west.
    WestNorthWest,
    /// Facing north-west.
    NorthWest,
    /// Facing north-north-west.
    NorthNorthWest,
    /// Facing upwards.
    Up,
    /// Facing downwards.
    Down,
}

/// Horizontal faces indexed by quarter turns of yaw.
const YAW_FACES: [Direction; 4] = [
    Direction::South,
    Direction::West,
    Direction::North,
    Direction::East,
];

/// Floor sign rotations, clockwise from south.
const FLOOR_ROTATIONS: [Direction; 16] = [
    Direction::South,
    Direction::SouthSouthWest,
    Direction::SouthWest,
    Direction::WestSouthWest,
    Direction::West,
    Direction::WestNorthWest,
    Direction::NorthWest,
    Direction::NorthNorthWest,
    Direction::North,
    Direction::NorthNorthEast,
    Direction::NorthEast,
    Direction::EastNorthEast,
    Direction::East,
    Direction::EastSouthEast,
    Direction::SouthEast,
    Direction::SouthSouthEast,
];

impl Direction {
    /// Converts a legacy numeric sign direction into a [`Direction`].
    ///
    /// Wall signs use ids 2 to 5 and default to north; floor signs use the
    /// sixteen rotation ids and default to south.
    ///
    /// # Examples
    ///
    /// ```
    /// use wireless::Direction;
    /// assert_eq!(Direction::from_legacy(true, 4), Direction::West);
    /// assert_eq!(Direction::from_legacy(false, 8), Direction::North);
    /// assert_eq!(Direction::from_legacy(true, 9), Direction::North);
    /// ```
    #[must_use]
    pub fn from_legacy(wall_mounted: bool, id: u8) -> Self {
        if wall_mounted {
            return match id {
                3 => Self::South,
                4 => Self::West,
                5 => Self::East,
                _ => Self::North,
            };
        }
        FLOOR_ROTATIONS
            .get(usize::from(id))
            .copied()
            .unwrap_or(Self::South)
    }

    /// Snaps a yaw angle in degrees to the nearest horizontal face.
    #[must_use]
    pub fn from_yaw(yaw: f32) -> Self {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "Quarter turns of any finite yaw fit comfortably in i64."
        )]
        let quarter = (yaw / 90.0).round() as i64;
        let index = usize::try_from(quarter & 0x3).unwrap_or_default();
        YAW_FACES.get(index).copied().unwrap_or(Self::South)
    }
}

/// Parameterless role discriminator, used for parsing and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleKind {
    /// Originates signal changes.
    Transmitter,
    /// Displays the channel state; never receives outputs.
    Screen,
    /// Mirrors the input level.
    Receiver,
    /// Outputs the negated input level.
    ReceiverInverter,
    /// Toggles on every rising edge.
    ReceiverSwitch,
    /// Repeats the input after a delay.
    ReceiverDelayer,
    /// Pulses while the input is high.
    ReceiverClock,
}

impl RoleKind {
    /// Returns `true` for the kinds that need a delay or period parameter.
    #[must_use]
    pub const fn needs_delay(self) -> bool {
        matches!(self, Self::ReceiverDelayer | Self::ReceiverClock)
    }

    /// Returns `true` for every receiver variant.
    #[must_use]
    pub const fn is_receiver(self) -> bool {
        !matches!(self, Self::Transmitter | Self::Screen)
    }
}

/// Sign text did not name a known role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown endpoint role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for RoleKind {
    type Err = UnknownRole;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_uppercase().as_str() {
            "TRANSMITTER" | "T" => Ok(Self::Transmitter),
            "RECEIVER" | "R" => Ok(Self::Receiver),
            "SCREEN" | "S" => Ok(Self::Screen),
            "INVERTER" | "I" => Ok(Self::ReceiverInverter),
            "SWITCHER" => Ok(Self::ReceiverSwitch),
            "CLOCK" | "C" => Ok(Self::ReceiverClock),
            "DELAYER" | "D" => Ok(Self::ReceiverDelayer),
            _ => Err(UnknownRole(text.to_owned())),
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transmitter => "transmitter",
            Self::Screen => "screen",
            Self::Receiver => "receiver",
            Self::ReceiverInverter => "inverter",
            Self::ReceiverSwitch => "switch",
            Self::ReceiverDelayer => "delayer",
            Self::ReceiverClock => "clock",
        };
        f.write_str(label)
    }
}

/// A delayer or clock was configured below its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} delay must be at least {minimum} ticks, got {delay}")]
pub struct InvalidDelay {
    /// Role that rejected the value.
    pub kind: RoleKind,
    /// Requested delay or period.
    pub delay: u32,
    /// Smallest accepted value for `kind`.
    pub minimum: u32,
}

/// Role of an endpoint together with its role-specific parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Originates signal changes.
    Transmitter,
    /// Displays the channel state.
    Screen,
    /// Mirrors the input level.
    Receiver,
    /// Outputs the negated input level.
    ReceiverInverter,
    /// Toggles on every rising edge.
    ReceiverSwitch,
    /// Repeats the input after `delay` ticks.
    ReceiverDelayer {
        /// Ticks between an input change and its output.
        delay: u32,
    },
    /// Toggles every `period` ticks while the input is high.
    ReceiverClock {
        /// Ticks between output toggles.
        period: u32,
    },
}

impl Role {
    /// Builds a role from its kind and the raw delay supplied at placement.
    ///
    /// The delay is ignored for kinds without a parameter.
    ///
    /// # Errors
    /// Returns [`InvalidDelay`] when a delayer or clock is given less than its
    /// minimum.
    ///
    /// # Examples
    ///
    /// ```
    /// use wireless::{Role, RoleKind};
    /// assert!(Role::with_delay(RoleKind::ReceiverDelayer, 49).is_err());
    /// assert_eq!(
    ///     Role::with_delay(RoleKind::ReceiverClock, 100),
    ///     Ok(Role::ReceiverClock { period: 100 })
    /// );
    /// assert_eq!(Role::with_delay(RoleKind::Receiver, 0), Ok(Role::Receiver));
    /// ```
    pub const fn with_delay(kind: RoleKind, delay: u32) -> Result<Self, InvalidDelay> {
        match kind {
            RoleKind::Transmitter => Ok(Self::Transmitter),
            RoleKind::Screen => Ok(Self::Screen),
            RoleKind::Receiver => Ok(Self::Receiver),
            RoleKind::ReceiverInverter => Ok(Self::ReceiverInverter),
            RoleKind::ReceiverSwitch => Ok(Self::ReceiverSwitch),
            RoleKind::ReceiverDelayer => {
                if delay < MIN_DELAY_TICKS {
                    return Err(InvalidDelay {
                        kind,
                        delay,
                        minimum: MIN_DELAY_TICKS,
                    });
                }
                Ok(Self::ReceiverDelayer { delay })
            }
            RoleKind::ReceiverClock => {
                if delay < MIN_CLOCK_PERIOD_TICKS {
                    return Err(InvalidDelay {
                        kind,
                        delay,
                        minimum: MIN_CLOCK_PERIOD_TICKS,
                    });
                }
                Ok(Self::ReceiverClock { period: delay })
            }
        }
    }

    /// Discriminator without parameters.
    #[must_use]
    pub const fn kind(self) -> RoleKind {
        match self {
            Self::Transmitter => RoleKind::Transmitter,
            Self::Screen => RoleKind::Screen,
            Self::Receiver => RoleKind::Receiver,
            Self::ReceiverInverter => RoleKind::ReceiverInverter,
            Self::ReceiverSwitch => RoleKind::ReceiverSwitch,
            Self::ReceiverDelayer { .. } => RoleKind::ReceiverDelayer,
            Self::ReceiverClock { .. } => RoleKind::ReceiverClock,
        }
    }

    /// Delay or period carried by the role, if any.
    #[must_use]
    pub const fn delay(self) -> Option<u32> {
        match self {
            Self::ReceiverDelayer { delay } => Some(delay),
            Self::ReceiverClock { period } => Some(period),
            _ => None,
        }
    }

    /// Returns `true` for every receiver variant.
    #[must_use]
    pub const fn is_receiver(self) -> bool {
        self.kind().is_receiver()
    }
}

/// A registered point on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Where the endpoint sits.
    pub location: Location,
    /// Whether the sign hangs on a wall rather than standing on the floor.
    pub wall_mounted: bool,
    /// Direction the sign faces.
    pub facing: Direction,
    /// Player that placed the endpoint.
    pub owner: String,
    /// Role and its parameter.
    pub role: Role,
}

impl Endpoint {
    /// Creates an endpoint facing north on the floor.
    #[must_use]
    pub fn new(location: Location, owner: impl Into<String>, role: Role) -> Self {
        Self {
            location,
            wall_mounted: false,
            facing: Direction::default(),
            owner: owner.into(),
            role,
        }
    }

    /// Sets how the endpoint is mounted.
    #[must_use]
    pub fn mounted(mut self, wall_mounted: bool, facing: Direction) -> Self {
        self.wall_mounted = wall_mounted;
        self.facing = facing;
        self
    }

    /// Returns `true` when the endpoint sits at `location`.
    #[must_use]
    pub fn is_at(&self, location: &Location) -> bool {
        &self.location == location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(location: &Location) -> u64 {
        let mut hasher = DefaultHasher::new();
        location.hash(&mut hasher);
        hasher.finish()
    }

    #[rstest]
    fn world_names_compare_case_insensitively() {
        let lower = Location::new("world", 1, 2, 3);
        let upper = Location::new("WORLD", 1, 2, 3);
        assert_eq!(lower, upper);
        assert_eq!(hash_of(&lower), hash_of(&upper));
        assert_ne!(lower, Location::new("world", 1, 2, 4));
        assert_ne!(lower, Location::new("nether", 1, 2, 3));
    }

    #[rstest]
    #[case("T", RoleKind::Transmitter)]
    #[case("transmitter", RoleKind::Transmitter)]
    #[case("r", RoleKind::Receiver)]
    #[case("Screen", RoleKind::Screen)]
    #[case("i", RoleKind::ReceiverInverter)]
    #[case("switcher", RoleKind::ReceiverSwitch)]
    #[case("C", RoleKind::ReceiverClock)]
    #[case("delayer", RoleKind::ReceiverDelayer)]
    fn parses_sign_text(#[case] text: &str, #[case] expected: RoleKind) {
        assert_eq!(text.parse::<RoleKind>(), Ok(expected));
    }

    #[rstest]
    fn rejects_unknown_sign_text() {
        assert_eq!(
            "lamp".parse::<RoleKind>(),
            Err(UnknownRole("lamp".to_owned()))
        );
    }

    #[rstest]
    #[case(RoleKind::ReceiverDelayer, 49, true)]
    #[case(RoleKind::ReceiverDelayer, 50, false)]
    #[case(RoleKind::ReceiverClock, 0, true)]
    #[case(RoleKind::ReceiverClock, 50, false)]
    #[case(RoleKind::ReceiverSwitch, 0, false)]
    fn delay_minimum_applies_to_timed_roles(
        #[case] kind: RoleKind,
        #[case] delay: u32,
        #[case] rejected: bool,
    ) {
        assert_eq!(Role::with_delay(kind, delay).is_err(), rejected);
    }

    #[rstest]
    fn role_round_trips_through_kind_and_delay() {
        let role = Role::ReceiverDelayer { delay: 75 };
        assert_eq!(Role::with_delay(role.kind(), role.delay().unwrap_or(0)), Ok(role));
        assert!(role.is_receiver());
        assert!(!Role::Screen.is_receiver());
    }

    #[rstest]
    #[case(0.0, Direction::South)]
    #[case(90.0, Direction::West)]
    #[case(180.0, Direction::North)]
    #[case(-90.0, Direction::East)]
    #[case(359.0, Direction::South)]
    fn yaw_snaps_to_cardinal_faces(#[case] yaw: f32, #[case] expected: Direction) {
        assert_eq!(Direction::from_yaw(yaw), expected);
    }

    #[rstest]
    fn legacy_floor_ids_fall_back_to_south() {
        assert_eq!(Direction::from_legacy(false, 12), Direction::East);
        assert_eq!(Direction::from_legacy(false, 40), Direction::South);
    }
}
