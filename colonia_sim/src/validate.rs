// Structural validation of a rearrange request.
//
// Runs on the server with the target colony already locked, before anything
// is mutated. Checks, in order:
//   1. the colony exists and the requester owns it (`UnknownAggregate`,
//      `NotOwner`); a colony the requester cannot see is reported as unknown
//      rather than foreign, so its existence does not leak;
//   2. the batch is not empty (`EmptyBatch`); well-behaved clients never
//      send one;
//   3. each descriptor's ids resolve in the colony scope (`UnknownSubject`,
//      `UnknownDestination`, `UnknownGoodsType`) and its role is enabled in
//      this game (`InvalidRole`).
// The first failure rejects the whole batch with the failing index.
//
// Validation is existence and format only. Capacity, occupancy, equipment and
// production checks belong to the rules engine (`rules.rs`), which runs
// while the batch is applied. A later descriptor may free the slot an
// earlier one needs, so those checks only make sense in sequence.

use colonia_protocol::rearrange::{BatchEnvelope, ChangeDescriptor, MalformedDescriptor};
use colonia_protocol::report::{ErrorKind, ErrorReport};
use colonia_protocol::types::{GameObjectId, PlayerId, Role};

use crate::model::Colony;
use crate::registry::{ColonyScope, EntityKind, Registry};
use crate::ruleset::Ruleset;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("colony {0} not found")]
    UnknownAggregate(GameObjectId),
    #[error("colony {0} belongs to another player")]
    NotOwner(GameObjectId),
    #[error("empty rearrangement list")]
    EmptyBatch,
    #[error("change {index}: unit {id} not found in colony")]
    UnknownSubject { index: usize, id: GameObjectId },
    #[error("change {index}: location {id} not found in colony")]
    UnknownDestination { index: usize, id: GameObjectId },
    #[error("change {index}: goods type {id} not found")]
    UnknownGoodsType { index: usize, id: GameObjectId },
    #[error("change {index}: role {role} is not available")]
    InvalidRole { index: usize, role: Role },
    #[error("change {index}: {source}")]
    Malformed {
        index: usize,
        source: MalformedDescriptor,
    },
}

impl ValidationError {
    fn from_malformed(index: usize, err: MalformedDescriptor) -> Self {
        match err {
            MalformedDescriptor::UnknownSubject(id) => Self::UnknownSubject { index, id },
            MalformedDescriptor::UnknownDestination(id) => Self::UnknownDestination { index, id },
            MalformedDescriptor::UnknownGoodsType(id) => Self::UnknownGoodsType { index, id },
            MalformedDescriptor::RoleNotAvailable(role) => Self::InvalidRole { index, role },
            source @ (MalformedDescriptor::MissingField(_)
            | MalformedDescriptor::UnknownRole(_)) => Self::Malformed { index, source },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownAggregate(_) => ErrorKind::UnknownAggregate,
            Self::NotOwner(_) => ErrorKind::NotOwner,
            Self::EmptyBatch => ErrorKind::EmptyBatch,
            Self::UnknownSubject { .. } => ErrorKind::UnknownSubject,
            Self::UnknownDestination { .. } => ErrorKind::UnknownDestination,
            Self::UnknownGoodsType { .. } => ErrorKind::UnknownGoodsType,
            Self::InvalidRole { .. } => ErrorKind::InvalidRole,
            Self::Malformed { .. } => ErrorKind::Decode,
        }
    }

    /// Index of the failing descriptor, if a descriptor is to blame.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::UnknownSubject { index, .. }
            | Self::UnknownDestination { index, .. }
            | Self::UnknownGoodsType { index, .. }
            | Self::InvalidRole { index, .. }
            | Self::Malformed { index, .. } => Some(*index),
            Self::UnknownAggregate(_) | Self::NotOwner(_) | Self::EmptyBatch => None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        let report = ErrorReport::new(self.kind(), self.to_string());
        match self.index() {
            Some(index) => report.at(index),
            None => report,
        }
    }
}

/// A descriptor whose ids all resolved in the colony scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedChange {
    /// Position in the original batch.
    pub index: usize,
    pub unit: GameObjectId,
    /// Requested location. `None` leaves the unit wherever earlier changes
    /// in the batch put it.
    pub destination: Option<GameObjectId>,
    pub work: Option<GameObjectId>,
    pub role: Role,
}

impl ResolvedChange {
    /// Where the unit ends up when this change is applied to `staging`.
    pub fn destination_in<'a>(&'a self, staging: &'a Colony) -> Option<&'a GameObjectId> {
        self.destination
            .as_ref()
            .or_else(|| staging.unit(&self.unit).map(|u| &u.location))
    }
}

/// Resolve one descriptor's ids against `registry`.
pub fn resolve_change(
    index: usize,
    change: &ChangeDescriptor,
    registry: &impl Registry,
) -> Result<ResolvedChange, MalformedDescriptor> {
    let unit = registry
        .unit(&change.unit)
        .ok_or_else(|| MalformedDescriptor::UnknownSubject(change.unit.clone()))?;
    let destination = change
        .loc
        .as_ref()
        .map(|loc| {
            registry
                .location(loc)
                .map(|l| l.id.clone())
                .ok_or_else(|| MalformedDescriptor::UnknownDestination(loc.clone()))
        })
        .transpose()?;
    if let Some(work) = change
        .work
        .as_ref()
        .filter(|w| registry.resolve(w, EntityKind::GoodsType).is_none())
    {
        return Err(MalformedDescriptor::UnknownGoodsType(work.clone()));
    }
    if !registry.role_available(change.role) {
        return Err(MalformedDescriptor::RoleNotAvailable(change.role));
    }
    Ok(ResolvedChange {
        index,
        unit: unit.id.clone(),
        destination,
        work: change.work.clone(),
        role: change.role,
    })
}

/// A batch that passed validation. Only `validate_batch` constructs one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedBatch {
    colony: GameObjectId,
    player: PlayerId,
    changes: Vec<ResolvedChange>,
}

impl ValidatedBatch {
    pub fn colony(&self) -> &GameObjectId {
        &self.colony
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn changes(&self) -> &[ResolvedChange] {
        &self.changes
    }
}

/// Validate `envelope` from `player` against the (locked) target colony.
/// `colony` is `None` when the id did not name any colony.
pub fn validate_batch(
    envelope: &BatchEnvelope,
    player: PlayerId,
    colony: Option<&Colony>,
    ruleset: &Ruleset,
) -> Result<ValidatedBatch, ValidationError> {
    let unknown = || ValidationError::UnknownAggregate(envelope.colony.clone());
    let colony = colony
        .filter(|c| c.id == envelope.colony)
        .ok_or_else(unknown)?;
    if colony.owner != player {
        return Err(if colony.is_owned_by_or_visible_to(player) {
            ValidationError::NotOwner(colony.id.clone())
        } else {
            unknown()
        });
    }

    if envelope.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    let scope = ColonyScope::new(colony, ruleset);
    let changes = envelope
        .changes()
        .iter()
        .enumerate()
        .map(|(index, change)| {
            resolve_change(index, change, &scope)
                .map_err(|err| ValidationError::from_malformed(index, err))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidatedBatch {
        colony: colony.id.clone(),
        player,
        changes,
    })
}
