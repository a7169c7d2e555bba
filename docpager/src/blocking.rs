//! A synchronous wrapper around [`DocumentStore`].
//!
//! [`BlockingStore`] owns a current-thread tokio runtime and drives every call to
//! completion on it, so pages, counts and lookups behave exactly like their async
//! counterparts. It must not be used from inside another async runtime.
//!
//! # Example
//!
//! ```ignore
//! use docpager::{DocumentStore, PageRequest, blocking::BlockingStore, memory::InMemoryStore};
//!
//! let store = BlockingStore::new(DocumentStore::new(InMemoryStore::new()))?;
//! let page = store.paginate(Some("posts"), PageRequest::new().limit(10))?;
//! ```

use bson::{Bson, Document};
use std::future::Future;
use tokio::runtime::{Builder, Runtime};

use docpager_core::{
    backend::StoreBackend,
    classify::Selector,
    collection::Collection,
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    page::PageResponse,
    paginate::PageRequest,
    store::DocumentStore,
};

/// A document store driven by its own single-threaded runtime.
#[derive(Debug)]
pub struct BlockingStore<B: StoreBackend> {
    store: DocumentStore<B>,
    runtime: Runtime,
}

impl<B: StoreBackend> BlockingStore<B> {
    /// Wraps `store` with a fresh current-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] if the runtime cannot be built.
    pub fn new(store: DocumentStore<B>) -> DocumentStoreResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        Ok(Self { store, runtime })
    }

    pub fn store(&self) -> &DocumentStore<B> {
        &self.store
    }

    /// Runs any future against the wrapped store to completion.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn collection(&self, name: Option<&str>) -> DocumentStoreResult<Collection<'_, B>> {
        match name {
            Some(name) => Ok(self.store.collection(name)),
            None => self.store.default_collection(),
        }
    }

    /// Produces one page; see [`DocumentStore::paginate`].
    pub fn paginate(&self, collection: Option<&str>, request: PageRequest) -> DocumentStoreResult<PageResponse> {
        self.block_on(self.store.paginate(collection, request))
    }

    /// Looks up one document or many, collected into a list.
    pub fn get(&self, collection: Option<&str>, selector: impl Into<Selector>) -> DocumentStoreResult<Vec<Document>> {
        let collection = self.collection(collection)?;
        self.block_on(async {
            collection
                .get(selector)
                .await?
                .into_documents()
                .await
        })
    }

    /// Every document matching `selector`.
    pub fn list(&self, collection: Option<&str>, selector: impl Into<Selector>) -> DocumentStoreResult<Vec<Document>> {
        let collection = self.collection(collection)?;
        self.block_on(async { collection.find(selector).await?.into_documents().await })
    }

    pub fn count(&self, collection: Option<&str>, selector: impl Into<Selector>) -> DocumentStoreResult<u64> {
        let collection = self.collection(collection)?;
        self.block_on(collection.count(selector))
    }

    pub fn distinct(
        &self,
        collection: Option<&str>,
        field: &str,
        selector: impl Into<Selector>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let collection = self.collection(collection)?;
        self.block_on(collection.distinct(field, selector))
    }

    pub fn insert(&self, collection: Option<&str>, documents: Vec<Document>) -> DocumentStoreResult<Vec<Identifier>> {
        let collection = self.collection(collection)?;
        self.block_on(collection.insert(documents))
    }

    pub fn update(&self, collection: Option<&str>, selector: impl Into<Selector>, set: Document) -> DocumentStoreResult<u64> {
        let collection = self.collection(collection)?;
        self.block_on(collection.update(selector, set))
    }

    /// Creates or replaces a document under its own key; see [`Collection::put`].
    pub fn put(&self, collection: Option<&str>, document: Document) -> DocumentStoreResult<Option<Document>> {
        let collection = self.collection(collection)?;
        self.block_on(collection.put(document))
    }

    pub fn delete(&self, collection: Option<&str>, selector: impl Into<Selector>) -> DocumentStoreResult<u64> {
        let collection = self.collection(collection)?;
        self.block_on(collection.delete(selector))
    }

    /// Archives matches into `deleted.<collection>`; see [`Collection::soft_delete`].
    pub fn soft_delete(&self, collection: Option<&str>, selector: impl Into<Selector>) -> DocumentStoreResult<u64> {
        let collection = self.collection(collection)?;
        self.block_on(collection.soft_delete(selector))
    }
}
