//! A collection-bound view of a document store.
//!
//! [`Collection`] closes over one collection name, the backend and the pagination
//! configuration, and exposes lookup, CRUD and pagination with that name pre-filled.
//! Soft deletes archive into a sibling collection named `deleted.<name>`, where each
//! archived document keeps its old key in [`ARCHIVED_KEY`].
//!
//! # Example
//!
//! ```ignore
//! use docpager::{DocumentStore, PageRequest};
//! use bson::doc;
//!
//! # async fn example(store: &docpager::DocumentStore<impl docpager::backend::StoreBackend>) -> docpager::DocumentStoreResult<()> {
//! let posts = store.collection("posts");
//! posts.insert(vec![doc! { "title": "hello" }]).await?;
//!
//! let page = posts.paginate(PageRequest::new().limit(10)).await?;
//! # Ok(()) }
//! ```

use bson::{Bson, Document};
use tracing::trace;

use crate::{
    backend::{PRIMARY_KEY, Replaced, StoreBackend, UpdateOutcome},
    classify::{Classified, IdentifierClassifier, Selector},
    config::PaginationConfig,
    document::{Model, ModelExt},
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    page::PageResponse,
    paginate::{PageRequest, Paginator},
    query::{Expr, Filter, Query},
    results::LazyResultSet,
};

/// Field holding the original key of a soft-deleted document.
pub const ARCHIVED_KEY: &str = "oid";

/// What a [`Collection::get`] call found.
pub enum Lookup<B> {
    /// The selector named a single document; `None` when it does not exist.
    One(Option<Document>),
    /// The selector was a filter.
    Many(LazyResultSet<B>),
}

impl<B: StoreBackend> Lookup<B> {
    /// Collects the lookup into a list of documents.
    pub async fn into_documents(self) -> DocumentStoreResult<Vec<Document>> {
        match self {
            Lookup::One(doc) => Ok(doc.into_iter().collect()),
            Lookup::Many(results) => results.into_documents().await,
        }
    }
}

/// A collection with a reference to a storage backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend and configuration references
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
    config: &'a PaginationConfig,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B, config: &'a PaginationConfig) -> Self {
        Self { name, backend, config }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn filter_for(&self, selector: impl Into<Selector>) -> DocumentStoreResult<Option<Expr>> {
        IdentifierClassifier::classify(selector).into_filter(&self.config.id_field)
    }

    /// Looks up one document or many, depending on what `selector` is.
    ///
    /// An identifier (typed, canonical string or `$oid`/`$regex` literal) yields
    /// [`Lookup::One`]; for a `$regex` literal that is the first match. Anything else is
    /// a filter and yields a lazy [`Lookup::Many`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidFilter`](crate::error::DocumentStoreError::InvalidFilter)
    /// when the selector is neither an identifier nor a filter document.
    pub async fn get(&self, selector: impl Into<Selector>) -> DocumentStoreResult<Lookup<&'a B>> {
        match IdentifierClassifier::classify(selector) {
            Classified::SingleEntity(entity) => {
                trace!(collection = %self.name, ?entity, "single document lookup");
                let query = Query::builder()
                    .filter(entity.to_expr(&self.config.id_field))
                    .limit(1)
                    .build();
                let mut found = self.backend.find_documents(query, &self.name).await?;
                Ok(Lookup::One(found.pop()))
            }
            fragment => {
                let filter = fragment.into_filter(&self.config.id_field)?;
                Ok(Lookup::Many(self.query(Query {
                    filter,
                    ..Query::default()
                })))
            }
        }
    }

    /// Lazily selects every document matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector cannot be turned into a filter.
    pub async fn find(&self, selector: impl Into<Selector>) -> DocumentStoreResult<LazyResultSet<&'a B>> {
        let filter = self.filter_for(selector)?;
        Ok(self.query(Query {
            filter,
            ..Query::default()
        }))
    }

    /// Lazily runs a prepared query.
    pub fn query(&self, query: Query) -> LazyResultSet<&'a B> {
        LazyResultSet::streaming(self.backend, self.name.clone(), query)
    }

    /// Counts documents matching `selector`.
    pub async fn count(&self, selector: impl Into<Selector>) -> DocumentStoreResult<u64> {
        let query = Query {
            filter: self.filter_for(selector)?,
            ..Query::default()
        };
        self.backend.count_documents(&query, &self.name).await
    }

    /// Distinct values of a dotted `field` among documents matching `selector`, ascending.
    pub async fn distinct(&self, field: &str, selector: impl Into<Selector>) -> DocumentStoreResult<Vec<Bson>> {
        self.find(selector).await?.distinct(field).await
    }

    /// Inserts raw documents, returning their identifiers.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the operation fails.
    pub async fn insert(&self, documents: Vec<Document>) -> DocumentStoreResult<Vec<Identifier>> {
        self.backend.insert_documents(documents, &self.name).await
    }

    /// Inserts typed models.
    pub async fn insert_models<M: Model>(&self, models: &[M]) -> DocumentStoreResult<Vec<Identifier>> {
        let documents = models
            .iter()
            .map(ModelExt::to_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;
        self.insert(documents).await
    }

    /// Sets fields on every document matching `selector`, returning how many matched.
    pub async fn update(&self, selector: impl Into<Selector>, set: Document) -> DocumentStoreResult<u64> {
        let filter = self.filter_for(selector)?;
        let outcome = self.backend.update_documents(filter, set, false, &self.name).await?;
        Ok(outcome.matched)
    }

    /// Like [`update`](Self::update), but inserts one document when nothing matches.
    ///
    /// The inserted document takes the equality clauses of `selector`, so upserting by a
    /// typed [`Identifier`] creates the document under that identifier.
    pub async fn upsert(&self, selector: impl Into<Selector>, set: Document) -> DocumentStoreResult<UpdateOutcome> {
        let filter = self.filter_for(selector)?;
        self.backend.update_documents(filter, set, true, &self.name).await
    }

    /// Replaces the document stored under `id`, optionally inserting it when absent.
    pub async fn replace(&self, id: Identifier, document: Document, upsert: bool) -> DocumentStoreResult<Replaced> {
        self.backend.replace_document(id, document, upsert, &self.name).await
    }

    /// Creates or replaces a document under the key it carries, returning the previous
    /// version when there was one.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] when the document has no key or an
    /// unsupported one.
    pub async fn put(&self, document: Document) -> DocumentStoreResult<Option<Document>> {
        let id = document
            .get(PRIMARY_KEY)
            .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("'{PRIMARY_KEY}' is required")))
            .and_then(|value| {
                Identifier::from_bson(value).ok_or_else(|| {
                    DocumentStoreError::InvalidDocument(format!(
                        "'{PRIMARY_KEY}' must be an ObjectId or UUID, got {value}"
                    ))
                })
            })?;

        match self.replace(id, document, true).await? {
            Replaced::Existing(previous) => Ok(Some(previous)),
            Replaced::Inserted | Replaced::Missing => Ok(None),
        }
    }

    /// Deletes every document matching `selector`, returning how many were removed.
    pub async fn delete(&self, selector: impl Into<Selector>) -> DocumentStoreResult<u64> {
        let filter = self.filter_for(selector)?;
        self.backend.delete_documents(filter, &self.name).await
    }

    /// Moves every document matching `selector` into `deleted.<name>` and returns how many
    /// were moved.
    ///
    /// Archived copies get fresh keys; the old key is kept under [`ARCHIVED_KEY`]. Only
    /// the documents that were archived are deleted, so matches written in between stay.
    pub async fn soft_delete(&self, selector: impl Into<Selector>) -> DocumentStoreResult<u64> {
        let filter = self.filter_for(selector)?;
        let doomed = self
            .query(Query {
                filter,
                ..Query::default()
            })
            .into_documents()
            .await?;
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut keys = Vec::with_capacity(doomed.len());
        let mut archived = Vec::with_capacity(doomed.len());
        for mut doc in doomed {
            if let Some(key) = doc.remove(PRIMARY_KEY) {
                keys.push(key.clone());
                doc.insert(ARCHIVED_KEY, key);
            }
            archived.push(doc);
        }

        let archive = format!("deleted.{}", self.name);
        self.backend.insert_documents(archived, &archive).await?;
        trace!(collection = %self.name, %archive, moved = keys.len(), "archived documents");

        self.backend
            .delete_documents(Some(Filter::any_of(PRIMARY_KEY, keys)), &self.name)
            .await
    }

    /// Produces one page of this collection.
    ///
    /// # Errors
    ///
    /// See [`Paginator::paginate`].
    pub async fn paginate(&self, request: PageRequest) -> DocumentStoreResult<PageResponse> {
        Paginator::new(self.backend, self.config)
            .paginate(&self.name, request)
            .await
    }

    /// Produces one page of this collection as models.
    pub async fn paginate_models<M: Model>(&self, request: PageRequest) -> DocumentStoreResult<PageResponse<M>> {
        self.paginate(request).await?.into_models()
    }
}
