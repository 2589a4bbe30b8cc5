// State deltas broadcast after a successful rearrangement.
//
// A delta carries the post-change state of every unit the batch actually
// changed, plus the colony itself (its warehouse changes when roles swap
// equipment). Clients overwrite their copies of these entities wholesale;
// nothing in a delta is relative to the previous state.
//
// `revision` increases by one per applied batch on that colony. A delta only
// makes sense on top of the revision right before it, so a client applies it
// when it is exactly one ahead of its copy, drops it when it is older, and
// asks for a `ColonySnapshot` when revisions are missing. Snapshots are also
// how a client seeds its copies when it logs in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{GameObjectId, PlayerId, Role};

/// Full public state of one unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitState {
    pub id: GameObjectId,
    pub owner: PlayerId,
    pub location: GameObjectId,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work: Option<GameObjectId>,
}

/// Public state of a colony aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonyState {
    pub id: GameObjectId,
    pub name: String,
    pub owner: PlayerId,
    pub revision: u64,
    pub goods: BTreeMap<GameObjectId, u32>,
}

/// Everything that changed in one applied batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub colony: ColonyState,
    pub units: Vec<UnitState>,
}

impl StateDelta {
    pub fn unit(&self, id: &GameObjectId) -> Option<&UnitState> {
        self.units.iter().find(|u| &u.id == id)
    }
}

/// Complete public state of a colony at one revision: every unit, not only
/// the changed ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonySnapshot {
    pub colony: ColonyState,
    pub units: Vec<UnitState>,
}
