// Client-side construction of rearrange requests.
//
// The client works with its own copy of the colony (kept current from
// `StateDelta`s) and turns live references into id-only descriptors here.
// Two ways in:
// - `RearrangeBuilder::add` for explicit, hand-ordered changes;
// - `RearrangeBuilder::plan` from a desired end state per unit. Only units
//   whose assignment differs from their current one get a descriptor, and
//   descriptors are sorted simplest role first so that units giving up
//   equipment come before units claiming it.
//
// `build` refuses an empty batch. The server checks again.

use std::collections::BTreeMap;

use colonia_protocol::rearrange::{BatchEnvelope, ChangeDescriptor};
use colonia_protocol::types::{GameObjectId, Role};

use crate::model::{Colony, Unit, WorkLocation};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("no changes to send for colony {0}")]
    EmptyBatch(GameObjectId),
}

/// Descriptor for `unit` from live references. A `None` location leaves the
/// unit where it is.
pub fn change_for(
    unit: &Unit,
    loc: Option<&WorkLocation>,
    work: Option<&GameObjectId>,
    role: Role,
) -> ChangeDescriptor {
    ChangeDescriptor::new(
        unit.id.clone(),
        loc.map(|l| l.id.clone()),
        work.cloned(),
        role,
    )
}

/// Where a unit should end up, and doing what.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub location: GameObjectId,
    pub work: Option<GameObjectId>,
    pub role: Role,
}

impl Assignment {
    pub fn of(unit: &Unit) -> Self {
        Self {
            location: unit.location.clone(),
            work: unit.work.clone(),
            role: unit.role,
        }
    }
}

pub struct RearrangeBuilder {
    envelope: BatchEnvelope,
}

impl RearrangeBuilder {
    pub fn new(colony: &Colony) -> Self {
        Self {
            envelope: BatchEnvelope::new(colony.id.clone()),
        }
    }

    pub fn add(
        &mut self,
        unit: &Unit,
        loc: Option<&WorkLocation>,
        work: Option<&GameObjectId>,
        role: Role,
    ) -> &mut Self {
        self.envelope.add_change(change_for(unit, loc, work, role));
        self
    }

    /// Build a batch that moves `colony` to the `target` assignments. Units
    /// not in `target`, or already matching it, are left out. Ids that do not
    /// name a unit of the colony are skipped.
    pub fn plan(colony: &Colony, target: &BTreeMap<GameObjectId, Assignment>) -> Self {
        let mut changes: Vec<(&Unit, &Assignment)> = target
            .iter()
            .filter_map(|(id, wanted)| match colony.unit(id) {
                Some(unit) => Some((unit, wanted)),
                None => {
                    tracing::debug!(unit = %id, colony = %colony.id, "planned unit not in colony");
                    None
                }
            })
            .filter(|(unit, wanted)| Assignment::of(unit) != **wanted)
            .collect();
        changes.sort_by_key(|(_, wanted)| wanted.role);

        let mut builder = Self::new(colony);
        for (unit, wanted) in changes {
            builder.envelope.add_change(ChangeDescriptor::new(
                unit.id.clone(),
                Some(wanted.location.clone()),
                wanted.work.clone(),
                wanted.role,
            ));
        }
        builder
    }

    pub fn len(&self) -> usize {
        self.envelope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty()
    }

    pub fn build(self) -> Result<BatchEnvelope, RequestError> {
        if self.envelope.is_empty() {
            return Err(RequestError::EmptyBatch(self.envelope.colony));
        }
        Ok(self.envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::{FOOD, ORE};
    use crate::scenario::Scenario;

    fn id(s: &str) -> GameObjectId {
        GameObjectId::from(s)
    }

    fn colony() -> Colony {
        let (_, _, _, mut colonies) = Scenario::sample().into_parts().unwrap();
        colonies.remove(0)
    }

    #[test]
    fn empty_builder_refuses_to_build() {
        let colony = colony();
        assert_eq!(
            RearrangeBuilder::new(&colony).build(),
            Err(RequestError::EmptyBatch(id("colony:amsterdam")))
        );
    }

    #[test]
    fn add_uses_ids_from_live_references() {
        let colony = colony();
        let farmer = colony.unit(&id("unit:farmer")).unwrap();
        let hills = colony.location(&id("loc:amsterdam:hills")).unwrap();
        let ore = id(ORE);

        let mut builder = RearrangeBuilder::new(&colony);
        builder
            .add(farmer, Some(hills), Some(&ore), Role::Default)
            .add(farmer, None, None, Role::Default);
        let envelope = builder.build().unwrap();

        assert_eq!(envelope.len(), 2);
        let first = &envelope.changes()[0];
        assert_eq!(first.unit, id("unit:farmer"));
        assert_eq!(first.loc, Some(id("loc:amsterdam:hills")));
        assert_eq!(first.work, Some(ore));
        assert_eq!(envelope.changes()[1].loc, None);
    }

    #[test]
    fn plan_skips_unchanged_units() {
        let colony = colony();
        let mut target: BTreeMap<_, _> = colony
            .units
            .values()
            .map(|u| (u.id.clone(), Assignment::of(u)))
            .collect();
        assert!(RearrangeBuilder::plan(&colony, &target).is_empty());

        target.insert(
            id("unit:miner"),
            Assignment {
                location: id("loc:amsterdam:hills"),
                work: Some(id(FOOD)),
                role: Role::Expert,
            },
        );
        let envelope = RearrangeBuilder::plan(&colony, &target).build().unwrap();
        assert_eq!(envelope.len(), 1);
        assert_eq!(envelope.changes()[0].unit, id("unit:miner"));
    }

    #[test]
    fn plan_orders_simplest_role_first() {
        let colony = colony();
        let outside = id("loc:amsterdam:outside");
        let target = BTreeMap::from([
            (
                id("unit:colonist"),
                Assignment {
                    location: outside.clone(),
                    work: None,
                    role: Role::Soldier,
                },
            ),
            (
                id("unit:soldier"),
                Assignment {
                    location: outside.clone(),
                    work: None,
                    role: Role::Default,
                },
            ),
            (
                id("unit:ghost"),
                Assignment {
                    location: outside,
                    work: None,
                    role: Role::Default,
                },
            ),
        ]);
        let envelope = RearrangeBuilder::plan(&colony, &target).build().unwrap();
        let roles: Vec<_> = envelope.changes().iter().map(|c| c.role).collect();
        assert_eq!(roles, vec![Role::Default, Role::Soldier]);
        assert_eq!(envelope.changes()[0].unit, id("unit:soldier"));
    }
}
