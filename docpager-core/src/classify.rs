//! Classification of caller-supplied selectors.
//!
//! Lookups accept anything from a typed identifier to a full filter document. The
//! [`IdentifierClassifier`] decides, without ever failing, whether such a value names a
//! single document or should be treated as a filter fragment. Rules are tried in order
//! and the first match wins:
//!
//! 1. an [`Identifier`] is a single entity;
//! 2. a string in canonical identifier form is a single entity;
//! 3. a string holding an extended-JSON `$oid` or `$regex` literal is parsed into one;
//! 4. a mapping carrying a `$oid` or `$regex` marker is parsed the same way;
//! 5. anything else is a filter fragment.

use bson::{Bson, Document, doc};
use serde_json::Value;
use tracing::trace;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    query::{Expr, FieldOp},
};

/// A value supplied by a caller to select documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// A typed identifier.
    Identifier(Identifier),
    /// Free text, possibly an identifier in string form.
    String(String),
    /// A mapping, possibly a filter document or an identifier literal.
    Mapping(Document),
    /// Anything else.
    Other(Bson),
}

impl From<Identifier> for Selector {
    fn from(id: Identifier) -> Self {
        Selector::Identifier(id)
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Selector::String(value.to_string())
    }
}

impl From<String> for Selector {
    fn from(value: String) -> Self {
        Selector::String(value)
    }
}

impl From<Document> for Selector {
    fn from(doc: Document) -> Self {
        Selector::Mapping(doc)
    }
}

impl From<Bson> for Selector {
    fn from(value: Bson) -> Self {
        if let Some(id) = native_identifier(&value) {
            return Selector::Identifier(id);
        }

        match value {
            Bson::String(s) => Selector::String(s),
            Bson::Document(doc) => Selector::Mapping(doc),
            other => Selector::Other(other),
        }
    }
}

fn native_identifier(value: &Bson) -> Option<Identifier> {
    match value {
        Bson::String(_) => None,
        other => Identifier::from_bson(other),
    }
}

/// What a single-entity selector matches on the identifier field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityMatch {
    /// One identifier. `raw` keeps the string the identifier was decoded from, so
    /// documents keyed by the plain string are found as well.
    Id { id: Identifier, raw: Option<String> },
    /// A regular expression over the identifier field.
    Pattern { pattern: String, options: String },
}

impl EntityMatch {
    /// Builds the filter expression matching this entity on `id_field`.
    pub fn to_expr(&self, id_field: &str) -> Expr {
        match self {
            EntityMatch::Id { id, raw: Some(raw) } => Expr::field(
                id_field.to_string(),
                FieldOp::AnyOf,
                Bson::Array(vec![id.to_bson(), Bson::String(raw.clone())]),
            ),
            EntityMatch::Id { id, raw: None } => {
                Expr::field(id_field.to_string(), FieldOp::Eq, id.to_bson())
            }
            EntityMatch::Pattern { pattern, options } => Expr::field(
                id_field.to_string(),
                FieldOp::Regex,
                Bson::Document(doc! { "$regex": pattern.as_str(), "$options": options.as_str() }),
            ),
        }
    }
}

/// The outcome of classifying a [`Selector`].
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// The selector names a single document.
    SingleEntity(EntityMatch),
    /// The selector is an opaque filter fragment, passed through unchanged.
    FilterFragment(Bson),
}

impl Classified {
    pub fn is_single_entity(&self) -> bool {
        matches!(self, Classified::SingleEntity(_))
    }

    /// Turns the classification into a query filter over `id_field`.
    ///
    /// Returns `None` for a fragment that matches everything (an empty mapping or null).
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidFilter`] when a fragment is neither a filter
    /// document nor null, or when the filter document itself is malformed.
    pub fn into_filter(self, id_field: &str) -> DocumentStoreResult<Option<Expr>> {
        match self {
            Classified::SingleEntity(entity) => Ok(Some(entity.to_expr(id_field))),
            Classified::FilterFragment(Bson::Document(doc)) => Expr::from_document(&doc),
            Classified::FilterFragment(Bson::Null) => Ok(None),
            Classified::FilterFragment(other) => Err(DocumentStoreError::InvalidFilter(format!(
                "cannot use {other} as a filter"
            ))),
        }
    }
}

/// Decides whether a selector names one document or describes a filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierClassifier;

impl IdentifierClassifier {
    /// Classifies `value`. Never fails: anything ambiguous is a filter fragment.
    pub fn classify(value: impl Into<Selector>) -> Classified {
        match value.into() {
            Selector::Identifier(id) => Classified::SingleEntity(EntityMatch::Id { id, raw: None }),
            Selector::String(s) => {
                if let Some(id) = Identifier::parse(&s) {
                    return Classified::SingleEntity(EntityMatch::Id { id, raw: Some(s) });
                }

                if s.contains("$oid") || s.contains("$regex") {
                    if let Some(entity) = parse_literal_string(&s) {
                        return Classified::SingleEntity(entity);
                    }
                }

                trace!(selector = %s, "string selector is not an identifier, treating as filter");
                Classified::FilterFragment(Bson::String(s))
            }
            Selector::Mapping(doc) => match parse_literal_mapping(&doc) {
                Some(entity) => Classified::SingleEntity(entity),
                None => Classified::FilterFragment(Bson::Document(doc)),
            },
            Selector::Other(value) => Classified::FilterFragment(value),
        }
    }
}

fn parse_literal_string(s: &str) -> Option<EntityMatch> {
    let Value::Object(map) = serde_json::from_str::<Value>(s).ok()? else {
        return None;
    };

    if let Some(Value::String(hex)) = map.get("$oid") {
        let id = Identifier::parse(hex)?;
        return Some(EntityMatch::Id { id, raw: None });
    }

    if let Some(Value::String(pattern)) = map.get("$regex") {
        let options = match map.get("$options") {
            Some(Value::String(options)) => options.clone(),
            _ => String::new(),
        };
        return Some(EntityMatch::Pattern { pattern: pattern.clone(), options });
    }

    None
}

fn parse_literal_mapping(doc: &Document) -> Option<EntityMatch> {
    if let Ok(hex) = doc.get_str("$oid") {
        let id = Identifier::parse(hex)?;
        return Some(EntityMatch::Id { id, raw: None });
    }

    if let Ok(pattern) = doc.get_str("$regex") {
        let options = doc.get_str("$options").unwrap_or("").to_string();
        return Some(EntityMatch::Pattern { pattern: pattern.to_string(), options });
    }

    None
}
