// The "rearrange colony" request: change descriptors and the batch envelope.
//
// A client that wants to reassign the workers of one of its colonies sends a
// single `BatchEnvelope`: the colony id plus an ordered list of
// `ChangeDescriptor`s. Order matters: the server applies descriptors in
// sequence, so a later descriptor may fill a slot vacated by an earlier one.
//
// Wire form (JSON, framed by `framing.rs`):
//
//   { "colony": "colony:1", "size": 2,
//     "changes": [ { "unit": "unit:4", "loc": "loc:9", "role": "DEFAULT",
//                    "work": "goods:ore" },
//                  { "unit": "unit:5", "role": "SOLDIER" } ] }
//
// `size` is mandatory and must match the list length. `work` and `loc` are
// omitted when unset: a missing `work` means "no production assignment",
// which is distinct from any goods id. The positional attribute form (`x0unit`, ...)
// used by older clients lives in `attributes.rs` and shares the per-field
// conversion in `ChangeDescriptor::from_fields`.
//
// Decoding here is purely syntactic. Ids are carried as-is and resolved later
// against the authoritative registry (`colonia_sim::validate`), so an id that
// does not resolve never fails the decode; it fails validation, with the
// descriptor's index attached.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{GameObjectId, Role};

/// One proposed change to one unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeDescriptor {
    /// The unit being changed.
    pub unit: GameObjectId,
    /// Target work location; `None` leaves the unit where it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<GameObjectId>,
    /// Goods type to produce; `None` means no production assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work: Option<GameObjectId>,
    pub role: Role,
}

/// A descriptor that could not be decoded or resolved.
///
/// The first two variants come from wire decoding in this crate; the rest are
/// produced when the ids are resolved against the server's registry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MalformedDescriptor {
    #[error("missing required field {0:?}")]
    MissingField(&'static str),
    #[error("unknown role {0:?}")]
    UnknownRole(String),
    #[error("unit {0} does not exist")]
    UnknownSubject(GameObjectId),
    #[error("location {0} does not exist")]
    UnknownDestination(GameObjectId),
    #[error("goods type {0} does not exist")]
    UnknownGoodsType(GameObjectId),
    #[error("role {0} is not available in this game")]
    RoleNotAvailable(Role),
}

/// Hard failure decoding a whole envelope. No partial envelope is produced.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected <{expected}> message, got <{found}>")]
    WrongTag { expected: &'static str, found: String },
    #[error("missing colony id")]
    MissingColony,
    #[error("missing change count")]
    MissingSize,
    #[error("change count {0:?} is not a number")]
    InvalidSize(String),
    #[error("declared {declared} changes but found {found}")]
    SizeMismatch { declared: usize, found: usize },
    #[error("unexpected attribute {0:?}")]
    UnexpectedAttribute(String),
    #[error("change {index}: {source}")]
    Descriptor {
        index: usize,
        source: MalformedDescriptor,
    },
}

impl ChangeDescriptor {
    pub fn new(
        unit: GameObjectId,
        loc: Option<GameObjectId>,
        work: Option<GameObjectId>,
        role: Role,
    ) -> Self {
        Self {
            unit,
            loc,
            work,
            role,
        }
    }

    /// Build a descriptor from raw wire fields. Empty strings count as absent,
    /// matching how older clients wrote unset attributes.
    pub fn from_fields(
        index: usize,
        unit: Option<&str>,
        loc: Option<&str>,
        work: Option<&str>,
        role: Option<&str>,
    ) -> Result<Self, DecodeError> {
        let malformed = |source| DecodeError::Descriptor { index, source };
        let unit =
            non_empty(unit).ok_or_else(|| malformed(MalformedDescriptor::MissingField("unit")))?;
        let role_name =
            non_empty(role).ok_or_else(|| malformed(MalformedDescriptor::MissingField("role")))?;
        let role = Role::from_name(role_name)
            .ok_or_else(|| malformed(MalformedDescriptor::UnknownRole(role_name.to_owned())))?;
        Ok(Self {
            unit: GameObjectId::from(unit),
            loc: non_empty(loc).map(GameObjectId::from),
            work: non_empty(work).map(GameObjectId::from),
            role,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// An ordered batch of changes targeting one colony.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchEnvelope {
    pub colony: GameObjectId,
    changes: Vec<ChangeDescriptor>,
}

impl BatchEnvelope {
    pub fn new(colony: GameObjectId) -> Self {
        Self {
            colony,
            changes: Vec::new(),
        }
    }

    pub fn with_changes(colony: GameObjectId, changes: Vec<ChangeDescriptor>) -> Self {
        Self { colony, changes }
    }

    pub fn add_change(&mut self, change: ChangeDescriptor) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[ChangeDescriptor] {
        &self.changes
    }

    /// Serialize to the JSON wire form.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse the JSON wire form. Fails as a whole on a missing or
    /// non-numeric `size`, a count mismatch, or any undecodable descriptor.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let wire: EnvelopeIn = serde_json::from_slice(bytes)?;
        BatchEnvelope::try_from(wire)
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    colony: &'a GameObjectId,
    size: usize,
    changes: &'a [ChangeDescriptor],
}

#[derive(Deserialize)]
struct EnvelopeIn {
    colony: Option<String>,
    #[serde(default)]
    size: Option<serde_json::Value>,
    #[serde(default)]
    changes: Vec<DescriptorIn>,
}

#[derive(Deserialize)]
struct DescriptorIn {
    unit: Option<String>,
    #[serde(default)]
    loc: Option<String>,
    #[serde(default)]
    work: Option<String>,
    role: Option<String>,
}

fn parse_size(value: &serde_json::Value) -> Result<usize, DecodeError> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| DecodeError::InvalidSize(n.to_string())),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidSize(s.clone())),
        other => Err(DecodeError::InvalidSize(other.to_string())),
    }
}

impl TryFrom<EnvelopeIn> for BatchEnvelope {
    type Error = DecodeError;

    fn try_from(wire: EnvelopeIn) -> Result<Self, Self::Error> {
        let colony = wire
            .colony
            .filter(|c| !c.is_empty())
            .ok_or(DecodeError::MissingColony)?;
        let declared = parse_size(wire.size.as_ref().ok_or(DecodeError::MissingSize)?)?;
        if declared != wire.changes.len() {
            return Err(DecodeError::SizeMismatch {
                declared,
                found: wire.changes.len(),
            });
        }
        let changes = wire
            .changes
            .iter()
            .enumerate()
            .map(|(index, d)| {
                ChangeDescriptor::from_fields(
                    index,
                    d.unit.as_deref(),
                    d.loc.as_deref(),
                    d.work.as_deref(),
                    d.role.as_deref(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchEnvelope {
            colony: GameObjectId(colony),
            changes,
        })
    }
}

impl Serialize for BatchEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EnvelopeOut {
            colony: &self.colony,
            size: self.changes.len(),
            changes: &self.changes,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BatchEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = EnvelopeIn::deserialize(deserializer)?;
        BatchEnvelope::try_from(wire).map_err(D::Error::custom)
    }
}
