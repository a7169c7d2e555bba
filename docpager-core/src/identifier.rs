//! Document identifiers.
//!
//! An [`Identifier`] names exactly one document within a collection. Two encodings are
//! supported: the 12-byte BSON ObjectId and the 16-byte UUID. Both have a canonical string
//! form (24 lowercase hex characters, or the hyphenated UUID form) that never contains the
//! `_` separator used by boundary tokens.

use bson::{Binary, Bson, Uuid, oid::ObjectId, spec::BinarySubtype};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{cmp::Ordering, fmt, str::FromStr};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A globally unique document identifier.
///
/// Identifiers are totally ordered: every UUID sorts before every ObjectId (binary data
/// precedes ObjectId in BSON type order), and values of the same kind compare by their raw
/// bytes. This is the order the stores use when the identifier field is the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// A 12-byte BSON ObjectId.
    ObjectId(ObjectId),
    /// A 16-byte UUID, stored as BSON binary subtype 4.
    Uuid(Uuid),
}

impl Identifier {
    /// Generates a fresh ObjectId identifier.
    pub fn new() -> Self {
        Identifier::ObjectId(ObjectId::new())
    }

    /// Generates a fresh random UUID identifier.
    pub fn new_uuid() -> Self {
        Identifier::Uuid(Uuid::new())
    }

    /// Parses the canonical string form of an identifier.
    ///
    /// Returns `None` for anything that is not exactly a 24-hex-character ObjectId or a
    /// hyphenated UUID.
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() == 24 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return ObjectId::parse_str(value)
                .ok()
                .map(Identifier::ObjectId);
        }

        if value.len() == 36 && value.matches('-').count() == 4 {
            return Uuid::parse_str(value)
                .ok()
                .map(Identifier::Uuid);
        }

        None
    }

    /// Extracts an identifier from a BSON value, if the value holds one.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::ObjectId(oid) => Some(Identifier::ObjectId(*oid)),
            Bson::Binary(Binary { subtype: BinarySubtype::Uuid, bytes }) => {
                let bytes: [u8; 16] = bytes.as_slice().try_into().ok()?;
                Some(Identifier::Uuid(Uuid::from_bytes(bytes)))
            }
            Bson::String(s) => Self::parse(s),
            _ => None,
        }
    }

    /// Converts the identifier into its native BSON representation.
    pub fn to_bson(&self) -> Bson {
        match self {
            Identifier::ObjectId(oid) => Bson::ObjectId(*oid),
            Identifier::Uuid(uuid) => Bson::from(*uuid),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Identifier::Uuid(_) => 0,
            Identifier::ObjectId(_) => 1,
        }
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::ObjectId(a), Identifier::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Identifier::Uuid(a), Identifier::Uuid(b)) => a.bytes().cmp(&b.bytes()),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::ObjectId(oid) => write!(f, "{}", oid.to_hex()),
            Identifier::Uuid(uuid) => write!(f, "{uuid}"),
        }
    }
}

impl FromStr for Identifier {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> DocumentStoreResult<Self> {
        Self::parse(s).ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("'{s}' is not a valid identifier"))
        })
    }
}

impl From<ObjectId> for Identifier {
    fn from(oid: ObjectId) -> Self {
        Identifier::ObjectId(oid)
    }
}

impl From<Uuid> for Identifier {
    fn from(uuid: Uuid) -> Self {
        Identifier::Uuid(uuid)
    }
}

impl From<uuid::Uuid> for Identifier {
    fn from(uuid: uuid::Uuid) -> Self {
        Identifier::Uuid(Uuid::from(uuid))
    }
}

impl From<Identifier> for Bson {
    fn from(id: Identifier) -> Self {
        id.to_bson()
    }
}

// `From<&Identifier> for Bson` is provided by bson's blanket
// `impl<T: Clone + Into<Bson>> From<&T> for Bson`.

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Identifier::ObjectId(oid) => oid.serialize(serializer),
            Identifier::Uuid(uuid) => uuid.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Bson::deserialize(deserializer)?;

        Identifier::from_bson(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("expected an ObjectId or UUID, found {value}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("507f1f77bcf86cd799439011", true)]
    #[case("67e55044-10b1-426f-9247-bb680e5fe0c8", true)]
    #[case("507f1f77bcf86cd79943901", false)]
    #[case("507f1f77bcf86cd79943901z", false)]
    #[case("not-an-id", false)]
    #[case("", false)]
    fn test_parse_canonical_forms(#[case] input: &str, #[case] valid: bool) {
        // Act
        let parsed = Identifier::parse(input);

        // Assert
        assert_eq!(parsed.is_some(), valid);
        if let Some(id) = parsed {
            assert_eq!(id.to_string(), input);
            assert!(!id.to_string().contains('_'));
        }
    }

    #[rstest]
    fn test_object_ids_order_by_bytes() {
        // Arrange
        let low = Identifier::from(ObjectId::from_bytes([0; 12]));
        let mut high_bytes = [0; 12];
        high_bytes[11] = 1;
        let high = Identifier::from(ObjectId::from_bytes(high_bytes));

        // Assert
        assert!(low < high);
        assert!(high > Identifier::from(ObjectId::from_bytes([0; 12])));
    }

    #[rstest]
    fn test_uuids_sort_before_object_ids() {
        assert!(Identifier::new_uuid() < Identifier::new());
    }

    #[rstest]
    fn test_bson_conversion_preserves_identity() {
        // Arrange
        let oid = Identifier::new();
        let uuid = Identifier::new_uuid();

        // Act & Assert
        assert_eq!(Identifier::from_bson(&oid.to_bson()), Some(oid));
        assert_eq!(Identifier::from_bson(&uuid.to_bson()), Some(uuid));
        assert_eq!(Identifier::from_bson(&Bson::Int32(4)), None);
    }
}
