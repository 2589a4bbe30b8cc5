// Positional attribute form of the rearrange request.
//
// Older clients send the request as a flat, tagged attribute set rather than
// a JSON list:
//
//   <rearrangeColony colony="colony:1" size="2"
//       x0unit="unit:1" x0loc="loc:2" x0role="SOLDIER"
//       x1unit="unit:2" x1loc="loc:1" x1work="goods:ore" x1role="EXPERT" />
//
// Every field of descriptor `i` carries the `x{i}` prefix. Attribute order is
// not significant: the decoder groups attributes by index and rebuilds the
// descriptors in index order. `size` must equal the number of index groups
// present, so a message claiming three changes but carrying two is rejected
// instead of silently shrinking the batch. A key may appear only once.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rearrange::{BatchEnvelope, ChangeDescriptor, DecodeError};
use crate::types::GameObjectId;

/// Element tag of the rearrange request.
pub const REARRANGE_TAG: &str = "rearrangeColony";

const COLONY_KEY: &str = "colony";
const SIZE_KEY: &str = "size";

/// An ordered, tagged set of string attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMessage {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

impl AttributeMessage {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
        }
    }

    /// Set an attribute, replacing any previous value for the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl fmt::Display for AttributeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (key, value) in &self.attributes {
            write!(f, " {key}=\"{}\"", value.replace('"', "&quot;"))?;
        }
        f.write_str(" />")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Unit,
    Loc,
    Work,
    Role,
}

impl Field {
    fn suffix(self) -> &'static str {
        match self {
            Field::Unit => "unit",
            Field::Loc => "loc",
            Field::Work => "work",
            Field::Role => "role",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Field> {
        [Field::Unit, Field::Loc, Field::Work, Field::Role]
            .into_iter()
            .find(|f| f.suffix() == suffix)
    }
}

fn key(index: usize, field: Field) -> String {
    format!("x{index}{}", field.suffix())
}

/// Split `x12loc` into `(12, Field::Loc)`. Non-canonical indices such as
/// `x01loc` are not accepted.
fn parse_key(key: &str) -> Option<(usize, Field)> {
    let rest = key.strip_prefix('x')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || (digits > 1 && rest.starts_with('0')) {
        return None;
    }
    let index = rest[..digits].parse().ok()?;
    let field = Field::from_suffix(&rest[digits..])?;
    Some((index, field))
}

#[derive(Default)]
struct Group<'a> {
    unit: Option<&'a str>,
    loc: Option<&'a str>,
    work: Option<&'a str>,
    role: Option<&'a str>,
}

impl BatchEnvelope {
    /// Write the envelope as positional attributes. `work` is left out of a
    /// group entirely when unset.
    pub fn to_attributes(&self) -> AttributeMessage {
        let mut msg = AttributeMessage::new(REARRANGE_TAG);
        msg.set(COLONY_KEY, self.colony.as_str());
        msg.set(SIZE_KEY, self.len().to_string());
        for (i, change) in self.changes().iter().enumerate() {
            msg.set(key(i, Field::Unit), change.unit.as_str());
            if let Some(loc) = &change.loc {
                msg.set(key(i, Field::Loc), loc.as_str());
            }
            if let Some(work) = &change.work {
                msg.set(key(i, Field::Work), work.as_str());
            }
            msg.set(key(i, Field::Role), change.role.name());
        }
        msg
    }

    /// Rebuild an envelope from positional attributes.
    pub fn from_attributes(msg: &AttributeMessage) -> Result<Self, DecodeError> {
        if msg.tag != REARRANGE_TAG {
            return Err(DecodeError::WrongTag {
                expected: REARRANGE_TAG,
                found: msg.tag.clone(),
            });
        }
        let mut seen = BTreeSet::new();
        if let Some((k, _)) = msg.attributes.iter().find(|(k, _)| !seen.insert(k.as_str())) {
            return Err(DecodeError::UnexpectedAttribute(k.clone()));
        }
        let colony = msg
            .get(COLONY_KEY)
            .filter(|c| !c.is_empty())
            .ok_or(DecodeError::MissingColony)?;
        let size_text = msg.get(SIZE_KEY).ok_or(DecodeError::MissingSize)?;
        let declared: usize = size_text
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidSize(size_text.to_owned()))?;

        let mut groups: BTreeMap<usize, Group<'_>> = BTreeMap::new();
        for (k, value) in &msg.attributes {
            if k == COLONY_KEY || k == SIZE_KEY {
                continue;
            }
            let (index, field) =
                parse_key(k).ok_or_else(|| DecodeError::UnexpectedAttribute(k.clone()))?;
            let group = groups.entry(index).or_default();
            let slot = match field {
                Field::Unit => &mut group.unit,
                Field::Loc => &mut group.loc,
                Field::Work => &mut group.work,
                Field::Role => &mut group.role,
            };
            *slot = Some(value.as_str());
        }

        let out_of_range = groups.keys().next_back().is_some_and(|&i| i >= declared);
        if groups.len() != declared || out_of_range {
            return Err(DecodeError::SizeMismatch {
                declared,
                found: groups.len(),
            });
        }

        let changes = groups
            .into_iter()
            .map(|(index, g)| ChangeDescriptor::from_fields(index, g.unit, g.loc, g.work, g.role))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchEnvelope::with_changes(GameObjectId::from(colony), changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rearrange::MalformedDescriptor;
    use crate::types::Role;

    fn id(s: &str) -> GameObjectId {
        GameObjectId::new(s)
    }

    fn attrs(pairs: &[(&str, &str)]) -> AttributeMessage {
        let mut msg = AttributeMessage::new(REARRANGE_TAG);
        for (k, v) in pairs {
            msg.set(*k, *v);
        }
        msg
    }

    #[test]
    fn writes_positional_keys() {
        let mut envelope = BatchEnvelope::new(id("colony:1"));
        envelope.add_change(ChangeDescriptor::new(
            id("unit:1"),
            Some(id("loc:2")),
            None,
            Role::Soldier,
        ));
        envelope.add_change(ChangeDescriptor::new(
            id("unit:2"),
            Some(id("loc:1")),
            Some(id("goods:ore")),
            Role::Expert,
        ));
        let msg = envelope.to_attributes();
        assert_eq!(msg.get("size"), Some("2"));
        assert_eq!(msg.get("x0unit"), Some("unit:1"));
        assert_eq!(msg.get("x0work"), None);
        assert_eq!(msg.get("x1work"), Some("goods:ore"));
        assert_eq!(msg.get("x1role"), Some("EXPERT"));
        assert_eq!(BatchEnvelope::from_attributes(&msg).unwrap(), envelope);
    }

    #[test]
    fn groups_by_index_not_attribute_order() {
        let msg = attrs(&[
            ("x1role", "DEFAULT"),
            ("x0role", "SCOUT"),
            ("size", "2"),
            ("x1unit", "unit:b"),
            ("colony", "colony:1"),
            ("x0unit", "unit:a"),
        ]);
        let envelope = BatchEnvelope::from_attributes(&msg).unwrap();
        assert_eq!(envelope.changes()[0].unit, id("unit:a"));
        assert_eq!(envelope.changes()[0].role, Role::Scout);
        assert_eq!(envelope.changes()[1].unit, id("unit:b"));
    }

    #[test]
    fn declared_three_with_two_groups_fails() {
        let msg = attrs(&[
            ("colony", "colony:1"),
            ("size", "3"),
            ("x0unit", "unit:a"),
            ("x0role", "DEFAULT"),
            ("x1unit", "unit:b"),
            ("x1role", "DEFAULT"),
        ]);
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::SizeMismatch {
                declared: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn index_beyond_size_fails() {
        let msg = attrs(&[
            ("colony", "colony:1"),
            ("size", "1"),
            ("x1unit", "unit:a"),
            ("x1role", "DEFAULT"),
        ]);
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::SizeMismatch { declared: 1, .. })
        ));
    }

    #[test]
    fn missing_or_garbled_size_fails() {
        let msg = attrs(&[("colony", "colony:1"), ("x0unit", "u"), ("x0role", "DEFAULT")]);
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::MissingSize)
        ));
        let msg = attrs(&[("colony", "colony:1"), ("size", "1x")]);
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::InvalidSize(_))
        ));
    }

    #[test]
    fn unknown_attribute_fails() {
        let msg = attrs(&[
            ("colony", "colony:1"),
            ("size", "1"),
            ("x0unit", "unit:a"),
            ("x0role", "DEFAULT"),
            ("x0speed", "fast"),
        ]);
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::UnexpectedAttribute(k)) if k == "x0speed"
        ));
    }

    #[test]
    fn repeated_attribute_fails() {
        let mut msg = attrs(&[
            ("colony", "colony:1"),
            ("size", "1"),
            ("x0unit", "unit:a"),
            ("x0role", "DEFAULT"),
        ]);
        msg.attributes.push(("x0unit".into(), "unit:b".into()));
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::UnexpectedAttribute(k)) if k == "x0unit"
        ));

        // Deserialized from JSON, where `set` cannot merge the two.
        let json = r#"{"tag":"rearrangeColony","attributes":[
            ["colony","colony:1"],["size","1"],["size","2"],
            ["x0unit","unit:a"],["x0role","DEFAULT"]]}"#;
        let msg: AttributeMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::UnexpectedAttribute(k)) if k == "size"
        ));
    }

    #[test]
    fn unknown_role_names_the_group() {
        let msg = attrs(&[
            ("colony", "colony:1"),
            ("size", "1"),
            ("x0unit", "unit:a"),
            ("x0role", "Soldier"),
        ]);
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::Descriptor {
                index: 0,
                source: MalformedDescriptor::UnknownRole(_)
            })
        ));
    }

    #[test]
    fn wrong_tag_fails() {
        let mut msg = attrs(&[("colony", "colony:1"), ("size", "0")]);
        msg.tag = "equipUnit".into();
        assert!(matches!(
            BatchEnvelope::from_attributes(&msg),
            Err(DecodeError::WrongTag { .. })
        ));
    }

    #[test]
    fn parse_key_rejects_non_canonical_indices() {
        assert_eq!(parse_key("x12loc"), Some((12, Field::Loc)));
        assert_eq!(parse_key("x0role"), Some((0, Field::Role)));
        assert_eq!(parse_key("x01loc"), None);
        assert_eq!(parse_key("xloc"), None);
        assert_eq!(parse_key("y0loc"), None);
    }

    #[test]
    fn display_renders_element() {
        let msg = attrs(&[("colony", "colony:1"), ("size", "0")]);
        assert_eq!(
            msg.to_string(),
            "<rearrangeColony colony=\"colony:1\" size=\"0\" />"
        );
    }
}
