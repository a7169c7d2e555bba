//! Typed document models and conversions to and from raw documents.
//!
//! The store operates on raw `bson::Document` values. A [`Model`] is a typed view of one of
//! those documents: it knows its identifier and the collection it lives in, and
//! [`ModelExt`] converts it to and from the raw form.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
};

/// A typed document stored in a collection.
///
/// Implementations normally come from `#[derive(Model)]`, which takes the collection name
/// from `#[model(collection = "...")]` and the identifier from the field marked
/// `#[model(id)]` (or a field named `id`).
///
/// # Example
///
/// ```ignore
/// use docpager::{Identifier, Model};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Post {
///     #[serde(rename = "_id")]
///     pub id: Identifier,
///     pub title: String,
/// }
///
/// impl Model for Post {
///     fn id(&self) -> &Identifier {
///         &self.id
///     }
///
///     fn collection_name() -> &'static str {
///         "posts"
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns a reference to this document's unique identifier.
    fn id(&self) -> &Identifier;

    /// Returns the name of the collection this document belongs to.
    fn collection_name() -> &'static str;
}

/// Conversion helpers implemented for every [`Model`].
pub trait ModelExt: Model {
    /// Converts this model into a raw document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the model does not serialize to a mapping.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Builds a model from a raw document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the model's shape.
    fn from_document(doc: Document) -> DocumentStoreResult<Self>;

    /// Converts this model to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a model from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "{} serialized to {:?}, expected a document",
                Self::collection_name(),
                other.element_type()
            ))),
        }
    }

    fn from_document(doc: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(doc))?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}
