// Transactional application of a validated batch to a colony.
//
// All work happens on a staging clone of the colony; the live colony is only
// replaced once every change has passed the rules engine. On a violation the
// clone is dropped and the live colony is exactly as it was.
//
// Before any change is applied, every unit whose first change in the batch
// names a location is stood on the colony tile. This frees their slots, so
// two units can swap tiles within one batch without either tripping the
// capacity check. A unit whose first change has no location keeps its slot.
// Changes are then applied in batch order:
//   1. `rules.validate_apply` against the current staging state;
//   2. equipment of the old role goes back to the warehouse, equipment of the
//      new role is taken from it;
//   3. the unit moves to its destination (without one, it stays where the
//      earlier changes left it), takes the new role, and its work is set
//      (`None` clears it).
//
// The resulting delta lists every unit whose state differs from before the
// batch, plus the colony state with its bumped revision.

use std::collections::BTreeSet;

use colonia_protocol::delta::StateDelta;
use colonia_protocol::types::Role;

use crate::model::Colony;
use crate::rules::{ConstraintViolation, RulesEngine};
use crate::ruleset::Ruleset;
use crate::validate::ValidatedBatch;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("change {index}: {violation}")]
    Constraint {
        index: usize,
        violation: ConstraintViolation,
    },
}

impl ApplyError {
    pub fn index(&self) -> usize {
        match self {
            ApplyError::Constraint { index, .. } => *index,
        }
    }
}

pub fn apply_batch(
    colony: &mut Colony,
    batch: &ValidatedBatch,
    rules: &dyn RulesEngine,
    ruleset: &Ruleset,
) -> Result<StateDelta, ApplyError> {
    let mut staging = colony.clone();

    let mut seen = BTreeSet::new();
    let detached: Vec<_> = batch
        .changes()
        .iter()
        .filter(|change| seen.insert(&change.unit) && change.destination.is_some())
        .map(|change| change.unit.clone())
        .collect();
    for id in detached {
        if let Some(unit) = staging.units.get_mut(&id) {
            unit.location = staging.outside.clone();
        }
    }

    for change in batch.changes() {
        let fail = |violation| ApplyError::Constraint {
            index: change.index,
            violation,
        };
        rules
            .validate_apply(change, &staging, ruleset)
            .map_err(fail)?;

        let missing = || fail(ConstraintViolation::UnitNotPresent(change.unit.clone()));
        let old_role = staging.unit(&change.unit).map(|u| u.role).ok_or_else(missing)?;
        let destination = change
            .destination_in(&staging)
            .cloned()
            .ok_or_else(missing)?;
        exchange_equipment(&mut staging, ruleset, old_role, change.role);

        let unit = staging
            .units
            .get_mut(&change.unit)
            .ok_or_else(missing)?;
        unit.location = destination;
        unit.role = change.role;
        unit.work = change.work.clone();
    }

    staging.revision += 1;
    let units = staging
        .units
        .values()
        .filter(|u| colony.unit(&u.id) != Some(*u))
        .map(|u| u.state())
        .collect();
    let delta = StateDelta {
        colony: staging.state(),
        units,
    };
    *colony = staging;
    Ok(delta)
}

/// Return `from`'s equipment to the warehouse and take `to`'s.
fn exchange_equipment(colony: &mut Colony, ruleset: &Ruleset, from: Role, to: Role) {
    if from == to {
        return;
    }
    let goods: Vec<_> = [from, to]
        .into_iter()
        .filter_map(|role| ruleset.role(role))
        .flat_map(|rule| rule.equipment.keys().cloned())
        .collect();
    for g in goods {
        let returned = ruleset.equipment_amount(from, &g);
        let taken = ruleset.equipment_amount(to, &g);
        let stock = colony.goods.entry(g).or_insert(0);
        *stock = stock.saturating_add(returned).saturating_sub(taken);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::StandardRules;
    use crate::ruleset::{FOOD, HORSES, MUSKETS, ORE, TOOLS};
    use crate::scenario::Scenario;
    use crate::validate::validate_batch;
    use colonia_protocol::rearrange::{BatchEnvelope, ChangeDescriptor};
    use colonia_protocol::types::{GameObjectId, PlayerId};

    fn id(s: &str) -> GameObjectId {
        GameObjectId::from(s)
    }

    fn setup() -> (Ruleset, Colony) {
        let (_, ruleset, _, mut colonies) = Scenario::sample().into_parts().unwrap();
        (ruleset, colonies.remove(0))
    }

    fn validated(
        colony: &Colony,
        ruleset: &Ruleset,
        changes: &[(&str, Option<&str>, Option<&str>, Role)],
    ) -> ValidatedBatch {
        let changes = changes
            .iter()
            .map(|(unit, loc, work, role)| {
                ChangeDescriptor::new(id(unit), loc.map(id), work.map(id), *role)
            })
            .collect();
        let envelope = BatchEnvelope::with_changes(colony.id.clone(), changes);
        validate_batch(&envelope, PlayerId(0), Some(colony), ruleset).unwrap()
    }

    #[test]
    fn swap_within_one_batch() {
        let (ruleset, mut colony) = setup();
        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:farmer", Some("loc:amsterdam:hills"), Some(ORE), Role::Default),
                ("unit:miner", Some("loc:amsterdam:farm"), Some(FOOD), Role::Expert),
            ],
        );
        let delta = apply_batch(&mut colony, &batch, &StandardRules, &ruleset).unwrap();

        let farmer = colony.unit(&id("unit:farmer")).unwrap();
        assert_eq!(farmer.location, id("loc:amsterdam:hills"));
        assert_eq!(farmer.work, Some(id(ORE)));
        let miner = colony.unit(&id("unit:miner")).unwrap();
        assert_eq!(miner.location, id("loc:amsterdam:farm"));

        assert_eq!(delta.units.len(), 2);
        assert_eq!(delta.colony.revision, 1);
        assert_eq!(colony.revision, 1);
    }

    #[test]
    fn later_change_fills_slot_freed_by_earlier_one() {
        let (ruleset, mut colony) = setup();
        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:farmer", Some("loc:amsterdam:outside"), None, Role::Default),
                ("unit:colonist", Some("loc:amsterdam:farm"), Some(FOOD), Role::Default),
            ],
        );
        assert!(apply_batch(&mut colony, &batch, &StandardRules, &ruleset).is_ok());
        assert_eq!(
            colony.unit(&id("unit:colonist")).unwrap().location,
            id("loc:amsterdam:farm")
        );
        assert_eq!(colony.unit(&id("unit:farmer")).unwrap().work, None);
    }

    #[test]
    fn violation_rolls_back_everything() {
        let (ruleset, mut colony) = setup();
        let before = colony.clone();
        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:soldier", None, None, Role::Default),
                ("unit:farmer", Some("loc:amsterdam:smithy"), None, Role::Default),
                ("unit:miner", None, Some(ORE), Role::Expert),
                // The miner kept its slot on the hills.
                ("unit:colonist", Some("loc:amsterdam:hills"), None, Role::Default),
            ],
        );
        let err = apply_batch(&mut colony, &batch, &StandardRules, &ruleset).unwrap_err();
        assert_eq!(err.index(), 3);
        assert!(matches!(
            err,
            ApplyError::Constraint {
                violation: ConstraintViolation::LocationFull { .. },
                ..
            }
        ));
        assert_eq!(colony, before);
    }

    #[test]
    fn change_without_location_follows_earlier_changes() {
        let (ruleset, mut colony) = setup();
        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:colonist", Some("loc:amsterdam:smithy"), Some(TOOLS), Role::Default),
                ("unit:colonist", None, Some(TOOLS), Role::Default),
            ],
        );
        apply_batch(&mut colony, &batch, &StandardRules, &ruleset).unwrap();
        let colonist = colony.unit(&id("unit:colonist")).unwrap();
        assert_eq!(colonist.location, id("loc:amsterdam:smithy"));
        assert_eq!(colonist.work, Some(id(TOOLS)));
    }

    #[test]
    fn unit_without_location_keeps_its_slot() {
        let (ruleset, mut colony) = setup();
        let before = colony.clone();
        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:farmer", None, Some(FOOD), Role::Default),
                ("unit:colonist", Some("loc:amsterdam:farm"), None, Role::Default),
            ],
        );
        let err = apply_batch(&mut colony, &batch, &StandardRules, &ruleset).unwrap_err();
        assert_eq!(err.index(), 1);
        assert_eq!(colony, before);
    }

    #[test]
    fn role_change_moves_equipment_through_warehouse() {
        let (ruleset, mut colony) = setup();
        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:soldier", None, None, Role::Default),
                ("unit:colonist", Some("loc:amsterdam:outside"), None, Role::Dragoon),
            ],
        );
        let delta = apply_batch(&mut colony, &batch, &StandardRules, &ruleset).unwrap();
        // 50 muskets returned by the soldier, 50 taken by the dragoon.
        assert_eq!(colony.goods_amount(&id(MUSKETS)), 50);
        assert_eq!(colony.goods_amount(&id(HORSES)), 0);
        assert_eq!(delta.colony.goods.get(&id(HORSES)), Some(&0));
    }

    #[test]
    fn missing_equipment_leaves_warehouse_untouched() {
        let (ruleset, mut colony) = setup();
        let before = colony.clone();
        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:colonist", Some("loc:amsterdam:outside"), None, Role::Soldier),
                ("unit:farmer", Some("loc:amsterdam:outside"), None, Role::Soldier),
            ],
        );
        let err = apply_batch(&mut colony, &batch, &StandardRules, &ruleset).unwrap_err();
        assert_eq!(err.index(), 1);
        assert_eq!(colony, before);
    }

    #[test]
    fn delta_only_lists_changed_units() {
        let (ruleset, mut colony) = setup();
        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:miner", None, Some(ORE), Role::Expert),
                ("unit:farmer", None, Some(ORE), Role::Default),
            ],
        );
        let err = apply_batch(&mut colony, &batch, &StandardRules, &ruleset);
        // The plains do not produce ore.
        assert!(err.is_err());

        let batch = validated(
            &colony,
            &ruleset,
            &[
                ("unit:miner", None, Some(ORE), Role::Expert),
                ("unit:farmer", None, Some(FOOD), Role::Default),
                ("unit:colonist", Some("loc:amsterdam:smithy"), None, Role::Default),
            ],
        );
        let delta = apply_batch(&mut colony, &batch, &StandardRules, &ruleset).unwrap();
        assert_eq!(delta.units.len(), 1);
        assert!(delta.unit(&id("unit:colonist")).is_some());
    }
}
