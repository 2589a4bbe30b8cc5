// Semantic checks run while a batch is applied.
//
// The applier calls `RulesEngine::validate_apply` once per change, in batch
// order, against the staging copy of the colony as it stands after every
// earlier change. A violation aborts the batch. Existence of ids is already
// settled by validation; the engine only reports a missing unit or location
// if the staging copy somehow lacks one.
//
// `StandardRules` checks:
// - the unit belongs to the colony's owner;
// - a capacity-limited destination has a free slot;
// - only working roles (`DEFAULT`, `EXPERT`) enter buildings and work tiles;
// - a production assignment is made inside the colony, at a location that
//   produces that goods type;
// - the warehouse plus whatever the unit already carries covers the new
//   role's equipment.

use colonia_protocol::types::{GameObjectId, PlayerId, Role};

use crate::model::Colony;
use crate::ruleset::Ruleset;
use crate::validate::ResolvedChange;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintViolation {
    #[error("unit {0} is not in the colony")]
    UnitNotPresent(GameObjectId),
    #[error("location {0} is not in the colony")]
    LocationNotPresent(GameObjectId),
    #[error("unit {unit} belongs to {owner}")]
    ForeignUnit { unit: GameObjectId, owner: PlayerId },
    #[error("location {location} is full ({capacity} units)")]
    LocationFull {
        location: GameObjectId,
        capacity: u32,
    },
    #[error("role {role} cannot work at {location}")]
    RoleMustStayOutside { role: Role, location: GameObjectId },
    #[error("{goods} cannot be produced outside the colony")]
    WorkOutside { goods: GameObjectId },
    #[error("{location} does not produce {goods}")]
    CannotProduce {
        location: GameObjectId,
        goods: GameObjectId,
    },
    #[error("role {role} needs {needed} {goods}, only {available} available")]
    MissingEquipment {
        role: Role,
        goods: GameObjectId,
        needed: u32,
        available: u32,
    },
}

/// Apply-time rule checks, swappable so tests and alternative rulesets can
/// plug in their own.
pub trait RulesEngine: Send + Sync {
    /// Check `change` against the staging colony before it is applied.
    fn validate_apply(
        &self,
        change: &ResolvedChange,
        staging: &Colony,
        ruleset: &Ruleset,
    ) -> Result<(), ConstraintViolation>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StandardRules;

impl RulesEngine for StandardRules {
    fn validate_apply(
        &self,
        change: &ResolvedChange,
        staging: &Colony,
        ruleset: &Ruleset,
    ) -> Result<(), ConstraintViolation> {
        let unit = staging
            .unit(&change.unit)
            .ok_or_else(|| ConstraintViolation::UnitNotPresent(change.unit.clone()))?;
        let destination_id = change
            .destination_in(staging)
            .ok_or_else(|| ConstraintViolation::UnitNotPresent(change.unit.clone()))?;
        let destination = staging
            .location(destination_id)
            .ok_or_else(|| ConstraintViolation::LocationNotPresent(destination_id.clone()))?;

        if unit.owner != staging.owner {
            return Err(ConstraintViolation::ForeignUnit {
                unit: unit.id.clone(),
                owner: unit.owner,
            });
        }

        if !destination.is_outside() {
            if !change.role.works_inside() {
                return Err(ConstraintViolation::RoleMustStayOutside {
                    role: change.role,
                    location: destination.id.clone(),
                });
            }
            let already_there = usize::from(unit.location == destination.id);
            let others = staging.occupants(&destination.id) - already_there;
            if let Some(capacity) = destination.capacity.filter(|&c| others >= c as usize) {
                return Err(ConstraintViolation::LocationFull {
                    location: destination.id.clone(),
                    capacity,
                });
            }
        }

        if let Some(goods) = &change.work {
            if destination.is_outside() {
                return Err(ConstraintViolation::WorkOutside {
                    goods: goods.clone(),
                });
            }
            if !destination.produces.contains(goods) {
                return Err(ConstraintViolation::CannotProduce {
                    location: destination.id.clone(),
                    goods: goods.clone(),
                });
            }
        }

        if let Some(rule) = ruleset.role(change.role) {
            for (goods, &needed) in &rule.equipment {
                let carried = ruleset.equipment_amount(unit.role, goods);
                let available = staging.goods_amount(goods).saturating_add(carried);
                if available < needed {
                    return Err(ConstraintViolation::MissingEquipment {
                        role: change.role,
                        goods: goods.clone(),
                        needed,
                        available,
                    });
                }
            }
        }

        Ok(())
    }
}
