// Id resolution against authoritative state.
//
// Clients only ever send `GameObjectId`s. Before the server acts on a request
// every id is looked up here, with the kind of entity the caller expects.
// Lookups return `Option`; there is no way to get a reference to server
// state other than through a successful resolution.
//
// `ColonyScope` is the registry a rearrangement is checked against: the
// locked colony aggregate plus the game-wide ruleset. A unit or location in
// some other colony does not resolve in this scope.

use colonia_protocol::types::{GameObjectId, Role};

use crate::model::{Colony, Unit, WorkLocation};
use crate::ruleset::Ruleset;

/// The kind of entity a caller expects an id to name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Colony,
    Unit,
    Location,
    GoodsType,
}

/// A resolved entity.
#[derive(Clone, Copy, Debug)]
pub enum Entity<'a> {
    Colony(&'a Colony),
    Unit(&'a Unit),
    Location(&'a WorkLocation),
    GoodsType(&'a GameObjectId),
}

pub trait Registry {
    /// Look up `id`, succeeding only if it names an entity of `kind`.
    fn resolve(&self, id: &GameObjectId, kind: EntityKind) -> Option<Entity<'_>>;

    /// Whether `role` is part of this game.
    fn role_available(&self, role: Role) -> bool;

    fn unit(&self, id: &GameObjectId) -> Option<&Unit> {
        match self.resolve(id, EntityKind::Unit)? {
            Entity::Unit(unit) => Some(unit),
            _ => None,
        }
    }

    fn location(&self, id: &GameObjectId) -> Option<&WorkLocation> {
        match self.resolve(id, EntityKind::Location)? {
            Entity::Location(location) => Some(location),
            _ => None,
        }
    }
}

/// One colony plus the ruleset.
#[derive(Clone, Copy)]
pub struct ColonyScope<'a> {
    pub colony: &'a Colony,
    pub ruleset: &'a Ruleset,
}

impl<'a> ColonyScope<'a> {
    pub fn new(colony: &'a Colony, ruleset: &'a Ruleset) -> Self {
        Self { colony, ruleset }
    }
}

impl Registry for ColonyScope<'_> {
    fn resolve(&self, id: &GameObjectId, kind: EntityKind) -> Option<Entity<'_>> {
        match kind {
            EntityKind::Colony => (self.colony.id == *id).then_some(Entity::Colony(self.colony)),
            EntityKind::Unit => self.colony.unit(id).map(Entity::Unit),
            EntityKind::Location => self.colony.location(id).map(Entity::Location),
            EntityKind::GoodsType => self.ruleset.goods_types.get(id).map(Entity::GoodsType),
        }
    }

    fn role_available(&self, role: Role) -> bool {
        self.ruleset.role_enabled(role)
    }
}
