// Scenario loading: the initial world a server starts from.
//
// A `Scenario` is plain serde data (JSON on disk) listing the ruleset, the
// players, and each colony with its work locations, units and warehouse.
// `Scenario::into_parts` checks it for internal consistency before any
// `Colony` is built, so the rest of the crate can rely on the invariants the
// world model documents (one outside location per colony, unique ids, every
// unit standing in a known location, no location over capacity).
//
// `Scenario::sample()` is a small two-colony world used by the server when no
// scenario file is given, and by tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use colonia_protocol::types::{GameObjectId, PlayerId, Role};
use serde::{Deserialize, Serialize};

use crate::model::{Colony, LocationKind, Player, Unit, WorkLocation};
use crate::ruleset::{self, Ruleset};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("cannot read scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate player {0}")]
    DuplicatePlayer(String),
    #[error("duplicate id {0}")]
    DuplicateId(GameObjectId),
    #[error("{context} refers to unknown player {player}")]
    UnknownPlayer { context: GameObjectId, player: PlayerId },
    #[error("colony {colony} has {found} outside locations, expected 1")]
    OutsideLocation { colony: GameObjectId, found: usize },
    #[error("unit {unit} stands in unknown location {location}")]
    UnknownLocation {
        unit: GameObjectId,
        location: GameObjectId,
    },
    #[error("location {0} holds more units than its capacity")]
    OverCapacity(GameObjectId),
    #[error("{context} refers to unknown goods type {goods}")]
    UnknownGoodsType {
        context: GameObjectId,
        goods: GameObjectId,
    },
}

/// Serialized form of one colony.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonySetup {
    pub id: GameObjectId,
    pub name: String,
    pub owner: PlayerId,
    #[serde(default)]
    pub visible_to: Vec<PlayerId>,
    pub locations: Vec<WorkLocation>,
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub goods: BTreeMap<GameObjectId, u32>,
}

/// Initial world description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub ruleset: Ruleset,
    pub players: Vec<Player>,
    pub colonies: Vec<ColonySetup>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check the scenario and split it into the pieces `World` is built from.
    pub fn into_parts(
        self,
    ) -> Result<(String, Ruleset, BTreeMap<PlayerId, Player>, Vec<Colony>), ScenarioError> {
        let mut players = BTreeMap::new();
        let mut names = BTreeSet::new();
        for player in self.players {
            if !names.insert(player.name.clone()) || players.contains_key(&player.id) {
                return Err(ScenarioError::DuplicatePlayer(player.name));
            }
            players.insert(player.id, player);
        }

        let mut seen = BTreeSet::new();
        let colonies = self
            .colonies
            .into_iter()
            .map(|setup| build_colony(setup, &players, &self.ruleset, &mut seen))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.name, self.ruleset, players, colonies))
    }

    /// A small two-colony world: the Dutch colony Nieuw Amsterdam (visible to
    /// the English) and the English colony Boston.
    pub fn sample() -> Self {
        let id = oid;
        let goods = |pairs: &[(&str, u32)]| -> BTreeMap<GameObjectId, u32> {
            pairs.iter().map(|(g, n)| (id(g), *n)).collect()
        };
        let location = |lid: &str, name: &str, kind, capacity, produces: &[&str]| WorkLocation {
            id: id(lid),
            name: name.into(),
            kind,
            capacity,
            produces: produces.iter().map(|g| id(g)).collect(),
        };
        let unit = |uid: &str, owner, loc: &str, role, work: Option<&str>| Unit {
            id: id(uid),
            owner: PlayerId(owner),
            location: id(loc),
            role,
            work: work.map(id),
        };

        let amsterdam = ColonySetup {
            id: id("colony:amsterdam"),
            name: "Nieuw Amsterdam".into(),
            owner: PlayerId(0),
            visible_to: vec![PlayerId(1)],
            locations: vec![
                location("loc:amsterdam:outside", "Colony tile", LocationKind::Outside, None, &[]),
                location(
                    "loc:amsterdam:farm",
                    "Plains",
                    LocationKind::Tile,
                    Some(1),
                    &[ruleset::FOOD, ruleset::LUMBER],
                ),
                location(
                    "loc:amsterdam:hills",
                    "Hills",
                    LocationKind::Tile,
                    Some(1),
                    &[ruleset::ORE, ruleset::FOOD],
                ),
                location(
                    "loc:amsterdam:smithy",
                    "Blacksmith's house",
                    LocationKind::Building,
                    Some(3),
                    &[ruleset::TOOLS],
                ),
                location(
                    "loc:amsterdam:carpenter",
                    "Carpenter's house",
                    LocationKind::Building,
                    Some(3),
                    &[ruleset::HAMMERS],
                ),
            ],
            units: vec![
                unit("unit:farmer", 0, "loc:amsterdam:farm", Role::Default, Some(ruleset::FOOD)),
                unit("unit:miner", 0, "loc:amsterdam:hills", Role::Expert, Some(ruleset::ORE)),
                unit("unit:soldier", 0, "loc:amsterdam:outside", Role::Soldier, None),
                unit(
                    "unit:colonist",
                    0,
                    "loc:amsterdam:carpenter",
                    Role::Default,
                    Some(ruleset::HAMMERS),
                ),
            ],
            goods: goods(&[
                (ruleset::MUSKETS, 50),
                (ruleset::HORSES, 50),
                (ruleset::TOOLS, 20),
                (ruleset::FOOD, 100),
                (ruleset::ORE, 30),
            ]),
        };

        let boston = ColonySetup {
            id: id("colony:boston"),
            name: "Boston".into(),
            owner: PlayerId(1),
            visible_to: vec![],
            locations: vec![
                location("loc:boston:outside", "Colony tile", LocationKind::Outside, None, &[]),
                location(
                    "loc:boston:field",
                    "Grassland",
                    LocationKind::Tile,
                    Some(1),
                    &[ruleset::FOOD, ruleset::TOBACCO],
                ),
                location(
                    "loc:boston:lumbermill",
                    "Lumber mill",
                    LocationKind::Building,
                    Some(3),
                    &[ruleset::HAMMERS],
                ),
            ],
            units: vec![
                unit("unit:boston-farmer", 1, "loc:boston:field", Role::Default, Some(ruleset::FOOD)),
                unit(
                    "unit:boston-carpenter",
                    1,
                    "loc:boston:lumbermill",
                    Role::Default,
                    Some(ruleset::HAMMERS),
                ),
            ],
            goods: goods(&[(ruleset::TOOLS, 50), (ruleset::FOOD, 40)]),
        };

        Scenario {
            name: "new-world".into(),
            ruleset: Ruleset::default(),
            players: vec![
                Player {
                    id: PlayerId(0),
                    name: "Dutch".into(),
                    password: None,
                },
                Player {
                    id: PlayerId(1),
                    name: "English".into(),
                    password: None,
                },
                Player {
                    id: PlayerId(2),
                    name: "French".into(),
                    password: None,
                },
            ],
            colonies: vec![amsterdam, boston],
        }
    }
}

fn oid(id: &str) -> GameObjectId {
    GameObjectId::from(id)
}

fn build_colony(
    setup: ColonySetup,
    players: &BTreeMap<PlayerId, Player>,
    ruleset: &Ruleset,
    seen: &mut BTreeSet<GameObjectId>,
) -> Result<Colony, ScenarioError> {
    let known_player = |context: &GameObjectId, player: PlayerId| {
        if players.contains_key(&player) {
            Ok(())
        } else {
            Err(ScenarioError::UnknownPlayer {
                context: context.clone(),
                player,
            })
        }
    };
    let known_goods = |context: &GameObjectId, goods: &GameObjectId| {
        if ruleset.has_goods_type(goods) {
            Ok(())
        } else {
            Err(ScenarioError::UnknownGoodsType {
                context: context.clone(),
                goods: goods.clone(),
            })
        }
    };
    let mut claim = |id: &GameObjectId| {
        if seen.insert(id.clone()) {
            Ok(())
        } else {
            Err(ScenarioError::DuplicateId(id.clone()))
        }
    };

    claim(&setup.id)?;
    known_player(&setup.id, setup.owner)?;
    for player in &setup.visible_to {
        known_player(&setup.id, *player)?;
    }
    for goods in setup.goods.keys() {
        known_goods(&setup.id, goods)?;
    }

    let mut locations = BTreeMap::new();
    for location in setup.locations {
        claim(&location.id)?;
        for goods in &location.produces {
            known_goods(&location.id, goods)?;
        }
        locations.insert(location.id.clone(), location);
    }
    let outsides: Vec<&GameObjectId> = locations
        .values()
        .filter(|l| l.is_outside())
        .map(|l| &l.id)
        .collect();
    let outside = match outsides.as_slice() {
        [only] => (*only).clone(),
        other => {
            return Err(ScenarioError::OutsideLocation {
                colony: setup.id,
                found: other.len(),
            });
        }
    };

    let mut units = BTreeMap::new();
    for unit in setup.units {
        claim(&unit.id)?;
        known_player(&unit.id, unit.owner)?;
        if !locations.contains_key(&unit.location) {
            return Err(ScenarioError::UnknownLocation {
                unit: unit.id,
                location: unit.location,
            });
        }
        if let Some(work) = &unit.work {
            known_goods(&unit.id, work)?;
        }
        units.insert(unit.id.clone(), unit);
    }

    let colony = Colony {
        id: setup.id,
        name: setup.name,
        owner: setup.owner,
        visible_to: setup.visible_to.into_iter().collect(),
        revision: 0,
        outside,
        locations,
        units,
        goods: setup.goods,
    };
    for location in colony.locations.values() {
        let occupants = colony.occupants(&location.id);
        if location.capacity.is_some_and(|c| occupants > c as usize) {
            return Err(ScenarioError::OverCapacity(location.id.clone()));
        }
    }
    Ok(colony)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_consistent() {
        let (name, _, players, colonies) = Scenario::sample().into_parts().unwrap();
        assert_eq!(name, "new-world");
        assert_eq!(players.len(), 3);
        assert_eq!(colonies.len(), 2);
        assert_eq!(
            colonies[0].outside,
            GameObjectId::from("loc:amsterdam:outside")
        );
    }

    #[test]
    fn sample_survives_json() {
        let json = serde_json::to_string_pretty(&Scenario::sample()).unwrap();
        assert_eq!(Scenario::from_json(&json).unwrap(), Scenario::sample());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut scenario = Scenario::sample();
        let copy = scenario.colonies[0].units[0].clone();
        scenario.colonies[1].units.push(copy);
        assert!(matches!(
            scenario.into_parts(),
            Err(ScenarioError::DuplicateId(id)) if id.as_str() == "unit:farmer"
        ));
    }

    #[test]
    fn colony_needs_exactly_one_outside() {
        let mut scenario = Scenario::sample();
        scenario.colonies[1].locations.retain(|l| !l.is_outside());
        assert!(matches!(
            scenario.into_parts(),
            Err(ScenarioError::OutsideLocation { found: 0, .. })
        ));
    }

    #[test]
    fn unit_in_unknown_location_is_rejected() {
        let mut scenario = Scenario::sample();
        scenario.colonies[0].units[0].location = GameObjectId::from("loc:nowhere");
        assert!(matches!(
            scenario.into_parts(),
            Err(ScenarioError::UnknownLocation { .. })
        ));
    }

    #[test]
    fn over_capacity_is_rejected() {
        let mut scenario = Scenario::sample();
        scenario.colonies[0].units[1].location = GameObjectId::from("loc:amsterdam:farm");
        assert!(matches!(
            scenario.into_parts(),
            Err(ScenarioError::OverCapacity(id)) if id.as_str() == "loc:amsterdam:farm"
        ));
    }

    #[test]
    fn unknown_owner_is_rejected() {
        let mut scenario = Scenario::sample();
        scenario.colonies[1].owner = PlayerId(9);
        assert!(matches!(
            scenario.into_parts(),
            Err(ScenarioError::UnknownPlayer { player: PlayerId(9), .. })
        ));
    }
}
