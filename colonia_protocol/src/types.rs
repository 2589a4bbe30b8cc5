// Core ID and enum types for the game protocol.
//
// These are shared by `rearrange.rs` (request envelopes), `delta.rs` (state
// broadcasts) and the authoritative world model in `colonia_sim`. Game object
// ids are opaque strings assigned by the server (`"unit:12"`, `"colony:3"`);
// player and connection ids are compact integers assigned at handshake.
//
// `Role` is a closed enumeration. Its wire form is the upper-case name
// (`"SOLDIER"`), and decoding an unknown name is an error rather than a
// fallback to `DEFAULT`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque, session-unique identifier of an addressable game object (unit,
/// work location, goods type, colony). Ids are never reused in a session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameObjectId(pub String);

impl GameObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameObjectId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Server-assigned id of an authenticated player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player:{}", self.0)
    }
}

/// Server-assigned id of a single client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

/// The role a unit plays. Declaration order is "simplest first": sorting a
/// batch by role releases equipment (soldiers becoming colonists) before it
/// is claimed by later changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Default,
    Expert,
    Pioneer,
    Missionary,
    Scout,
    Soldier,
    Dragoon,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Default,
        Role::Expert,
        Role::Pioneer,
        Role::Missionary,
        Role::Scout,
        Role::Soldier,
        Role::Dragoon,
    ];

    /// Wire name of the role.
    pub fn name(self) -> &'static str {
        match self {
            Role::Default => "DEFAULT",
            Role::Expert => "EXPERT",
            Role::Pioneer => "PIONEER",
            Role::Missionary => "MISSIONARY",
            Role::Scout => "SCOUT",
            Role::Soldier => "SOLDIER",
            Role::Dragoon => "DRAGOON",
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.name() == name)
    }

    /// Whether a unit in this role may occupy a building or work tile.
    /// Every other role is held outside the colony, on its tile.
    pub fn works_inside(self) -> bool {
        matches!(self, Role::Default | Role::Expert)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned by `Role::from_str` for a name outside the enumeration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_name(s).ok_or_else(|| UnknownRole(s.to_owned()))
    }
}
