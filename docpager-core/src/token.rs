//! Boundary tokens for resumable pages.
//!
//! A token pins a page edge to one document. It has two shapes:
//!
//! - `"_<id>"` when the sort key is the identifier field (cursor mode);
//! - `"<rfc3339 time>_<id>"` for any other sort key (time mode).
//!
//! Tokens are split on the last `_`. Identifier strings never contain that character, so
//! the split is unambiguous even though the time prefix could. When the identifier field
//! stores the identifier as a string rather than a native value, the id part is written as
//! `s<id>` so the boundary is compared in the same form it is stored in.

use bson::{Bson, DateTime, Document};
use chrono::{NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    value::lookup_path,
};

const SEPARATOR: char = '_';
const TEXT_MARKER: &str = "s";

/// An opaque, caller-held page boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryToken(String);

impl BoundaryToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BoundaryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BoundaryToken {
    fn from(value: String) -> Self {
        BoundaryToken(value)
    }
}

impl From<&str> for BoundaryToken {
    fn from(value: &str) -> Self {
        BoundaryToken(value.to_string())
    }
}

impl AsRef<str> for BoundaryToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How the identifier field holds an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdForm {
    /// A native ObjectId or UUID value.
    #[default]
    Native,
    /// The canonical string form of the identifier.
    Text,
}

impl IdForm {
    fn marker(self) -> &'static str {
        match self {
            IdForm::Native => "",
            IdForm::Text => TEXT_MARKER,
        }
    }
}

/// A decoded boundary: the sort value (time mode only) and the tie-breaking identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub sort_value: Option<DateTime>,
    pub id: Identifier,
    pub form: IdForm,
}

impl Boundary {
    /// The identifier as the identifier field stores it.
    pub fn id_value(&self) -> Bson {
        match self.form {
            IdForm::Native => self.id.to_bson(),
            IdForm::Text => Bson::String(self.id.to_string()),
        }
    }
}

/// Encodes and decodes [`BoundaryToken`]s for one identifier field.
#[derive(Debug, Clone)]
pub struct RangeCursorCodec {
    id_field: String,
}

impl RangeCursorCodec {
    pub fn new(id_field: impl Into<String>) -> Self {
        Self { id_field: id_field.into() }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Whether `sort_key` selects cursor mode.
    pub fn is_id_mode(&self, sort_key: &str) -> bool {
        sort_key == self.id_field
    }

    /// Encodes a boundary.
    ///
    /// In time mode the sort value must be a date/time; anything else (including an absent
    /// value) yields `None`, so no token is advertised for such a document.
    pub fn encode(&self, sort_key: &str, sort_value: Option<&Bson>, id: &Identifier) -> Option<BoundaryToken> {
        self.encode_as(sort_key, sort_value, id, IdForm::Native)
    }

    fn encode_as(&self, sort_key: &str, sort_value: Option<&Bson>, id: &Identifier, form: IdForm) -> Option<BoundaryToken> {
        let marker = form.marker();
        if self.is_id_mode(sort_key) {
            return Some(BoundaryToken(format!("{SEPARATOR}{marker}{id}")));
        }

        match sort_value {
            Some(Bson::DateTime(value)) => {
                let time = value.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true);
                Some(BoundaryToken(format!("{time}{SEPARATOR}{marker}{id}")))
            }
            _ => None,
        }
    }

    /// Encodes the boundary for `doc`, reading the identifier and the sort value from it.
    ///
    /// A string identifier only yields a token when it is already in canonical form, since
    /// the boundary compares against the canonical string.
    pub fn encode_document(&self, sort_key: &str, doc: &Document) -> Option<BoundaryToken> {
        let value = doc.get(&self.id_field)?;
        let id = Identifier::from_bson(value)?;
        let form = match value {
            Bson::String(text) if *text == id.to_string() => IdForm::Text,
            Bson::String(_) => return None,
            _ => IdForm::Native,
        };
        self.encode_as(sort_key, lookup_path(doc, sort_key), &id, form)
    }

    /// Decodes a token produced for `sort_key`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCursor`] when the token has no separator, the
    /// identifier part is not a canonical identifier, a cursor-mode token carries a prefix,
    /// or a time-mode prefix is not a date/time.
    pub fn decode(&self, token: &str, sort_key: &str) -> DocumentStoreResult<Boundary> {
        let invalid = |reason: &str| DocumentStoreError::InvalidCursor(format!("'{token}': {reason}"));

        let (prefix, id) = token
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| invalid("missing separator"))?;
        let (form, id) = match id.strip_prefix(TEXT_MARKER) {
            Some(text) => (IdForm::Text, text),
            None => (IdForm::Native, id),
        };
        let id = Identifier::parse(id).ok_or_else(|| invalid("malformed identifier"))?;

        if self.is_id_mode(sort_key) {
            if !prefix.is_empty() {
                return Err(invalid("unexpected sort value for identifier sort"));
            }
            return Ok(Boundary { sort_value: None, id, form });
        }

        let sort_value = parse_time(prefix).ok_or_else(|| invalid("malformed date/time"))?;
        Ok(Boundary { sort_value: Some(sort_value), id, form })
    }
}

fn parse_time(value: &str) -> Option<DateTime> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(DateTime::from_chrono(parsed.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| DateTime::from_chrono(naive.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use rstest::{fixture, rstest};

    #[fixture]
    fn codec() -> RangeCursorCodec {
        RangeCursorCodec::new("_id")
    }

    fn oid(hex: &str) -> Identifier {
        Identifier::parse(hex).unwrap()
    }

    #[rstest]
    fn test_id_mode_round_trip(codec: RangeCursorCodec) {
        // Arrange
        let id = oid("507f1f77bcf86cd799439011");

        // Act
        let token = codec.encode("_id", None, &id).unwrap();
        let boundary = codec.decode(token.as_str(), "_id").unwrap();

        // Assert
        assert_eq!(token.as_str(), "_507f1f77bcf86cd799439011");
        assert_eq!(boundary, Boundary { sort_value: None, id, form: IdForm::Native });
    }

    #[rstest]
    fn test_time_mode_round_trip(codec: RangeCursorCodec) {
        // Arrange
        let id = Identifier::new_uuid();
        let when = DateTime::from_millis(1_700_000_000_123);

        // Act
        let token = codec.encode("created_datetime", Some(&Bson::DateTime(when)), &id).unwrap();
        let boundary = codec.decode(token.as_str(), "created_datetime").unwrap();

        // Assert
        assert!(token.as_str().starts_with("2023-11-14T22:13:20.123Z_"));
        assert_eq!(boundary, Boundary { sort_value: Some(when), id, form: IdForm::Native });
    }

    #[rstest]
    fn test_naive_time_prefix_is_read_as_utc(codec: RangeCursorCodec) {
        // Act
        let boundary = codec
            .decode("2023-11-14T22:13:20.123_507f1f77bcf86cd799439011", "created_datetime")
            .unwrap();

        // Assert
        assert_eq!(boundary.sort_value, Some(DateTime::from_millis(1_700_000_000_123)));
    }

    #[rstest]
    fn test_time_mode_without_datetime_yields_no_token(codec: RangeCursorCodec) {
        // Arrange
        let id = Identifier::new();

        // Act & Assert
        assert_eq!(codec.encode("created_datetime", None, &id), None);
        assert_eq!(codec.encode("created_datetime", Some(&Bson::from("yesterday")), &id), None);
    }

    #[rstest]
    fn test_encode_document_reads_nested_sort_key(codec: RangeCursorCodec) {
        // Arrange
        let id = ObjectId::from_bytes([1; 12]);
        let doc = doc! { "_id": id, "meta": { "at": DateTime::from_millis(0) } };

        // Act
        let token = codec.encode_document("meta.at", &doc).unwrap();

        // Assert
        assert_eq!(token.as_str(), format!("1970-01-01T00:00:00.000Z_{}", id.to_hex()));
    }

    #[rstest]
    fn test_string_identifier_keeps_its_form() {
        // Arrange
        let codec = RangeCursorCodec::new("uid");
        let doc = doc! { "uid": "507f1f77bcf86cd799439011" };

        // Act
        let token = codec.encode_document("uid", &doc).unwrap();
        let boundary = codec.decode(token.as_str(), "uid").unwrap();

        // Assert
        assert_eq!(token.as_str(), "_s507f1f77bcf86cd799439011");
        assert_eq!(boundary.form, IdForm::Text);
        assert_eq!(boundary.id_value(), Bson::from("507f1f77bcf86cd799439011"));
    }

    #[rstest]
    fn test_non_canonical_string_identifier_yields_no_token() {
        // Arrange
        let codec = RangeCursorCodec::new("uid");
        let doc = doc! { "uid": "507F1F77BCF86CD799439011" };

        // Act & Assert
        assert_eq!(codec.encode_document("uid", &doc), None);
    }

    #[rstest]
    #[case("_s", "_id")]
    #[case("", "_id")]
    #[case("507f1f77bcf86cd799439011", "_id")]
    #[case("_nothex", "_id")]
    #[case("2023-01-01T00:00:00Z_507f1f77bcf86cd799439011", "_id")]
    #[case("_507f1f77bcf86cd799439011", "created_datetime")]
    #[case("tuesday_507f1f77bcf86cd799439011", "created_datetime")]
    fn test_malformed_tokens_are_rejected(
        codec: RangeCursorCodec,
        #[case] token: &str,
        #[case] sort_key: &str,
    ) {
        assert!(matches!(
            codec.decode(token, sort_key),
            Err(DocumentStoreError::InvalidCursor(_))
        ));
    }
}
