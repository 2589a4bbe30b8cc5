// Data-driven game rules: goods types and role equipment.
//
// All game-wide static data the rearrange path consults lives in `Ruleset`,
// loaded from JSON as part of a scenario (see `scenario.rs`). Nothing in the
// validator or rules engine hard-codes goods ids; they read them from here.
//
// A role may require equipment: a soldier carries 50 muskets, a dragoon 50
// muskets and 50 horses. Equipment is drawn from the colony warehouse when a
// unit takes the role and returned when it leaves it. Roles missing from
// `roles` are disabled for the game; requests naming them fail validation.

use std::collections::{BTreeMap, BTreeSet};

use colonia_protocol::types::{GameObjectId, Role};
use serde::{Deserialize, Serialize};

pub const FOOD: &str = "model.goods.food";
pub const SUGAR: &str = "model.goods.sugar";
pub const TOBACCO: &str = "model.goods.tobacco";
pub const COTTON: &str = "model.goods.cotton";
pub const FURS: &str = "model.goods.furs";
pub const LUMBER: &str = "model.goods.lumber";
pub const ORE: &str = "model.goods.ore";
pub const SILVER: &str = "model.goods.silver";
pub const HORSES: &str = "model.goods.horses";
pub const TOOLS: &str = "model.goods.tools";
pub const MUSKETS: &str = "model.goods.muskets";
pub const HAMMERS: &str = "model.goods.hammers";
pub const BELLS: &str = "model.goods.bells";
pub const CROSSES: &str = "model.goods.crosses";

/// Equipment one role takes from the warehouse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRule {
    pub role: Role,
    #[serde(default)]
    pub equipment: BTreeMap<GameObjectId, u32>,
}

/// Game-wide rules data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ruleset {
    pub goods_types: BTreeSet<GameObjectId>,
    pub roles: Vec<RoleRule>,
}

fn rule(role: Role, equipment: &[(&str, u32)]) -> RoleRule {
    RoleRule {
        role,
        equipment: equipment
            .iter()
            .map(|(goods, amount)| (GameObjectId::from(*goods), *amount))
            .collect(),
    }
}

impl Default for Ruleset {
    fn default() -> Self {
        let goods_types = [
            FOOD, SUGAR, TOBACCO, COTTON, FURS, LUMBER, ORE, SILVER, HORSES, TOOLS, MUSKETS,
            HAMMERS, BELLS, CROSSES,
        ]
        .into_iter()
        .map(GameObjectId::from)
        .collect();
        Self {
            goods_types,
            roles: vec![
                rule(Role::Default, &[]),
                rule(Role::Expert, &[]),
                rule(Role::Pioneer, &[(TOOLS, 20)]),
                rule(Role::Missionary, &[]),
                rule(Role::Scout, &[(HORSES, 50)]),
                rule(Role::Soldier, &[(MUSKETS, 50)]),
                rule(Role::Dragoon, &[(MUSKETS, 50), (HORSES, 50)]),
            ],
        }
    }
}

impl Ruleset {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn has_goods_type(&self, id: &GameObjectId) -> bool {
        self.goods_types.contains(id)
    }

    pub fn role(&self, role: Role) -> Option<&RoleRule> {
        self.roles.iter().find(|r| r.role == role)
    }

    pub fn role_enabled(&self, role: Role) -> bool {
        self.role(role).is_some()
    }

    /// Amount of `goods` a unit in `role` carries.
    pub fn equipment_amount(&self, role: Role, goods: &GameObjectId) -> u32 {
        self.role(role)
            .and_then(|r| r.equipment.get(goods))
            .copied()
            .unwrap_or(0)
    }
}
