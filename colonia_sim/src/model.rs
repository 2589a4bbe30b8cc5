// Authoritative world-model types: players, units, work locations, colonies.
//
// A `Colony` is the aggregate that rearrangement requests target and the unit
// of locking in `world.rs`. It owns everything a rearrangement can touch: the
// work locations in and around the colony, the units currently present, and
// the warehouse. Units that leave the colony (not modelled here) leave its
// `units` map; a unit is never referenced by two colonies.
//
// Every colony has exactly one `Outside` location: the colony tile, where
// units stand when they are not working (soldiers, pioneers, idle colonists).
// It has no capacity limit and produces nothing.
//
// Maps are `BTreeMap` so iteration order, and with it delta order and
// log output, is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use colonia_protocol::delta::{ColonySnapshot, ColonyState, StateDelta, UnitState};
use colonia_protocol::types::{GameObjectId, PlayerId, Role};
use serde::{Deserialize, Serialize};

/// A player registered in the game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// What kind of place a work location is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// The colony tile itself.
    Outside,
    /// A building inside the colony.
    Building,
    /// A surrounding tile worked by one colonist.
    Tile,
}

/// A place inside or around a colony that can hold units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkLocation {
    pub id: GameObjectId,
    pub name: String,
    pub kind: LocationKind,
    /// Maximum number of units; `None` is unlimited.
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Goods types a unit here may be assigned to produce.
    #[serde(default)]
    pub produces: BTreeSet<GameObjectId>,
}

impl WorkLocation {
    pub fn is_outside(&self) -> bool {
        self.kind == LocationKind::Outside
    }
}

/// A unit present in a colony.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: GameObjectId,
    pub owner: PlayerId,
    pub location: GameObjectId,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub work: Option<GameObjectId>,
}

fn default_role() -> Role {
    Role::Default
}

impl Unit {
    pub fn state(&self) -> UnitState {
        UnitState {
            id: self.id.clone(),
            owner: self.owner,
            location: self.location.clone(),
            role: self.role,
            work: self.work.clone(),
        }
    }
}

/// What `Colony::apply_delta` did with a delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    /// The delta is for a different colony.
    OtherColony,
    /// The copy already holds this revision or a later one.
    Stale,
    /// Revisions between the copy and the delta are missing; the copy needs
    /// a snapshot before it can take more deltas.
    Gap { expected: u64, received: u64 },
}

impl DeltaOutcome {
    pub fn needs_resync(self) -> bool {
        matches!(self, DeltaOutcome::Gap { .. })
    }
}

/// The colony aggregate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Colony {
    pub id: GameObjectId,
    pub name: String,
    pub owner: PlayerId,
    /// Other players that can observe this colony.
    pub visible_to: BTreeSet<PlayerId>,
    pub revision: u64,
    /// Id of the `Outside` location.
    pub outside: GameObjectId,
    pub locations: BTreeMap<GameObjectId, WorkLocation>,
    pub units: BTreeMap<GameObjectId, Unit>,
    pub goods: BTreeMap<GameObjectId, u32>,
}

impl Colony {
    pub fn unit(&self, id: &GameObjectId) -> Option<&Unit> {
        self.units.get(id)
    }

    pub fn location(&self, id: &GameObjectId) -> Option<&WorkLocation> {
        self.locations.get(id)
    }

    /// Number of units currently at `location`.
    pub fn occupants(&self, location: &GameObjectId) -> usize {
        self.units
            .values()
            .filter(|u| &u.location == location)
            .count()
    }

    pub fn goods_amount(&self, goods: &GameObjectId) -> u32 {
        self.goods.get(goods).copied().unwrap_or(0)
    }

    pub fn is_owned_by_or_visible_to(&self, player: PlayerId) -> bool {
        self.owner == player || self.visible_to.contains(&player)
    }

    /// Every player that should see changes to this colony, owner first.
    pub fn observers(&self) -> Vec<PlayerId> {
        std::iter::once(self.owner)
            .chain(self.visible_to.iter().copied().filter(|p| *p != self.owner))
            .collect()
    }

    /// Bring a client-side copy forward by one revision. Only a delta for
    /// exactly the next revision is applied.
    pub fn apply_delta(&mut self, delta: &StateDelta) -> DeltaOutcome {
        if delta.colony.id != self.id {
            return DeltaOutcome::OtherColony;
        }
        let expected = self.revision + 1;
        if delta.colony.revision < expected {
            return DeltaOutcome::Stale;
        }
        if delta.colony.revision > expected {
            return DeltaOutcome::Gap {
                expected,
                received: delta.colony.revision,
            };
        }
        self.set_header(&delta.colony);
        for state in &delta.units {
            self.set_unit(state);
        }
        DeltaOutcome::Applied
    }

    /// Replace a client-side copy's units and warehouse with `snapshot`.
    /// Snapshots older than the copy are ignored; returns whether it was
    /// taken.
    pub fn apply_snapshot(&mut self, snapshot: &ColonySnapshot) -> bool {
        if snapshot.colony.id != self.id || snapshot.colony.revision < self.revision {
            return false;
        }
        self.set_header(&snapshot.colony);
        self.units
            .retain(|id, _| snapshot.units.iter().any(|u| &u.id == id));
        for state in &snapshot.units {
            self.set_unit(state);
        }
        true
    }

    fn set_header(&mut self, state: &ColonyState) {
        self.name = state.name.clone();
        self.revision = state.revision;
        self.owner = state.owner;
        self.goods = state.goods.clone();
    }

    fn set_unit(&mut self, state: &UnitState) {
        let unit = self.units.entry(state.id.clone()).or_insert_with(|| Unit {
            id: state.id.clone(),
            owner: state.owner,
            location: state.location.clone(),
            role: state.role,
            work: None,
        });
        unit.owner = state.owner;
        unit.location = state.location.clone();
        unit.role = state.role;
        unit.work = state.work.clone();
    }

    pub fn snapshot(&self) -> ColonySnapshot {
        ColonySnapshot {
            colony: self.state(),
            units: self.units.values().map(Unit::state).collect(),
        }
    }

    pub fn state(&self) -> ColonyState {
        ColonyState {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner,
            revision: self.revision,
            goods: self.goods.clone(),
        }
    }
}
