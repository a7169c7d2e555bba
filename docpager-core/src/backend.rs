//! The contract between the pagination engine and a document store.
//!
//! A [`StoreBackend`] stores BSON documents keyed by [`PRIMARY_KEY`] in named collections
//! and answers [`Query`] values: streamed or collected finds, counts bounded by offset and
//! limit, distinct values, keyed replacement, and filter-based updates and deletes. Everything above this
//! layer (classification, tokens, result sets, pages) is written against the trait only.
//!
//! ```ignore
//! use docpager::{backend::StoreBackend, memory::InMemoryStore, query::{Filter, Query}};
//! use bson::doc;
//!
//! let backend = InMemoryStore::new();
//! backend.insert_documents(vec![doc! { "name": "Alice", "age": 30 }], "users").await?;
//!
//! let adults = Query::builder().filter(Filter::gte("age", 18)).limit(10).build();
//! let at_most_ten = backend.count_documents(&adults, "users").await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::{TryStreamExt, stream::BoxStream};
use std::{collections::BTreeSet, fmt::Debug};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    query::{Expr, Query},
};

/// The primary key field every backend stores documents under.
pub const PRIMARY_KEY: &str = "_id";

/// An open, forward-only stream of query results.
///
/// Dropping the stream releases whatever the backend holds for it (a server-side cursor,
/// a snapshot of matching documents).
pub type DocumentStream = BoxStream<'static, DocumentStoreResult<Document>>;

/// Reads the [`PRIMARY_KEY`] of a document about to be inserted, assigning a fresh
/// ObjectId when it has none.
///
/// The key is rewritten in its canonical form, so a hex string becomes an ObjectId.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] when the key is neither an ObjectId
/// nor a UUID.
pub fn assign_primary_key(doc: &mut Document) -> DocumentStoreResult<Identifier> {
    let id = match doc.get(PRIMARY_KEY) {
        None => Identifier::ObjectId(ObjectId::new()),
        Some(value) => Identifier::from_bson(value).ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!(
                "'{PRIMARY_KEY}' must be an ObjectId or UUID, got {value}"
            ))
        })?,
    };

    doc.insert(PRIMARY_KEY, id.to_bson());
    Ok(id)
}

/// Rejects a batch that repeats a key.
///
/// # Errors
///
/// Returns [`DocumentStoreError::DocumentAlreadyExists`] naming the first repeated key.
pub fn ensure_distinct_keys(ids: &[Identifier], collection: &str) -> DocumentStoreResult<()> {
    let mut seen = BTreeSet::new();
    match ids.iter().find(|id| !seen.insert(**id)) {
        Some(id) => Err(DocumentStoreError::DocumentAlreadyExists(
            id.to_string(),
            collection.to_string(),
        )),
        None => Ok(()),
    }
}

/// What a [`StoreBackend::replace_document`] call did.
#[derive(Debug, Clone, PartialEq)]
pub enum Replaced {
    /// A document had the key; this is its previous version.
    Existing(Document),
    /// No document had the key and the replacement was inserted.
    Inserted,
    /// No document had the key and nothing was written.
    Missing,
}

/// What a [`StoreBackend::update_documents`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Documents that matched the filter.
    pub matched: u64,
    /// The key of the document inserted because nothing matched.
    pub upserted: Option<Identifier>,
}

/// Writes `id` as the [`PRIMARY_KEY`] of a replacement document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] when the document already carries a
/// different key.
pub fn bind_primary_key(doc: &mut Document, id: &Identifier) -> DocumentStoreResult<()> {
    if let Some(value) = doc.get(PRIMARY_KEY) {
        if Identifier::from_bson(value).as_ref() != Some(id) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "replacement carries '{PRIMARY_KEY}' {value}, expected {id}"
            )));
        }
    }

    doc.insert(PRIMARY_KEY, id.to_bson());
    Ok(())
}

/// A document store.
///
/// Implementations are shared by concurrent pagination calls, so every method takes
/// `&self`. Reading a collection that does not exist behaves like reading an empty one.
/// Driver and I/O failures surface as [`DocumentStoreError::Backend`] and are not retried.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts `documents`, creating the collection on first use, and returns their
    /// identifiers in input order.
    ///
    /// Keys are assigned and canonicalized with [`assign_primary_key`]. A batch rejected
    /// for its keys writes nothing. A [`DocumentStoreError::Backend`] failure part way
    /// through may leave some documents written.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::DocumentAlreadyExists`] when a key is taken, in the
    ///   collection or earlier in the batch
    /// - [`DocumentStoreError::InvalidDocument`] for an unsupported key type
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<Vec<Identifier>>;

    /// Applies `$set` semantics: each (possibly dotted) path in `set` is written on every
    /// document matching `filter`.
    ///
    /// With `upsert` and no match, one document is inserted, built from the equality
    /// clauses of `filter` and then `set`.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidDocument`] when `set` touches [`PRIMARY_KEY`].
    async fn update_documents(
        &self,
        filter: Option<Expr>,
        set: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Replaces the whole document stored under `id`, keyed with [`bind_primary_key`].
    /// With `upsert` the replacement is inserted when `id` is free.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidDocument`] when the replacement carries another key.
    async fn replace_document(
        &self,
        id: Identifier,
        document: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Replaced>;

    /// Deletes every document matching `filter` and returns how many were removed.
    async fn delete_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64>;

    /// Opens a stream over `query`. Sort keys apply first, then `offset`, then `limit`.
    async fn stream_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream>;

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        self.stream_documents(query, collection)
            .await?
            .try_collect()
            .await
    }

    /// How many documents `query` would yield, after its `offset` and `limit`. Sort keys
    /// are ignored.
    ///
    /// # Errors
    ///
    /// A backend that can only count whole result sets returns
    /// [`DocumentStoreError::Unsupported`] when `offset` or `limit` is set.
    async fn count_documents(&self, query: &Query, collection: &str) -> DocumentStoreResult<u64>;

    /// Distinct values at a dotted `field` among documents matching `filter`, in no
    /// particular order. Arrays contribute their elements.
    async fn distinct_values(&self, field: &str, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<Vec<Bson>>;

    /// Creates an empty collection. Creating one that already exists is not an error.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Removes a collection with all of its documents.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::CollectionNotFound`] when there is no such collection.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Collection names, sorted.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Releases connections and other resources. Does nothing by default.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B: StoreBackend> StoreBackend for &B {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<Vec<Identifier>> {
        B::insert_documents(self, documents, collection).await
    }

    async fn update_documents(
        &self,
        filter: Option<Expr>,
        set: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        B::update_documents(self, filter, set, upsert, collection).await
    }

    async fn replace_document(
        &self,
        id: Identifier,
        document: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Replaced> {
        B::replace_document(self, id, document, upsert, collection).await
    }

    async fn delete_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        B::delete_documents(self, filter, collection).await
    }

    async fn stream_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        B::stream_documents(self, query, collection).await
    }

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        B::find_documents(self, query, collection).await
    }

    async fn count_documents(&self, query: &Query, collection: &str) -> DocumentStoreResult<u64> {
        B::count_documents(self, query, collection).await
    }

    async fn distinct_values(&self, field: &str, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        B::distinct_values(self, field, filter, collection).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        B::create_collection(self, name).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        B::drop_collection(self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        B::list_collections(self).await
    }
}

/// Factory for backends that need asynchronous setup (connections, handshakes).
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
