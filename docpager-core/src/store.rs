//! Main document store interface.
//!
//! [`DocumentStore`] owns a backend and the pagination configuration, and hands out
//! [`Collection`] views bound to one collection name.
//!
//! # Example
//!
//! ```ignore
//! use docpager::{DocumentStore, PageRequest, PaginationConfig};
//!
//! let store = DocumentStore::new(backend)
//!     .with_config(PaginationConfig::builder().max_limit(100).build())
//!     .with_default_collection("posts");
//!
//! let first = store.paginate(None, PageRequest::new().limit(10)).await?;
//! ```

use crate::{
    backend::StoreBackend,
    collection::Collection,
    config::PaginationConfig,
    document::Model,
    error::{DocumentStoreError, DocumentStoreResult},
    page::PageResponse,
    paginate::{PageRequest, Paginator},
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    config: PaginationConfig,
    default_collection: Option<String>,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend and default configuration.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: PaginationConfig::default(),
            default_collection: None,
        }
    }

    /// Replaces the pagination configuration.
    pub fn with_config(mut self, config: PaginationConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the collection used when a call does not name one.
    pub fn with_default_collection(mut self, name: impl Into<String>) -> Self {
        self.default_collection = Some(name.into());
        self
    }

    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a view of the collection with the given name.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the collection
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend, &self.config)
    }

    /// Gets a view of the collection a model type lives in.
    pub fn model_collection<'a, M: Model>(&'a self) -> Collection<'a, B> {
        self.collection(M::collection_name())
    }

    /// Gets a view of the default collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] when no default collection is set.
    pub fn default_collection<'a>(&'a self) -> DocumentStoreResult<Collection<'a, B>> {
        let name = self.resolve_collection(None)?;
        Ok(self.collection(name))
    }

    fn resolve_collection<'a>(&'a self, collection: Option<&'a str>) -> DocumentStoreResult<&'a str> {
        collection
            .or(self.default_collection.as_deref())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                DocumentStoreError::Configuration(
                    "no collection given and no default collection configured".to_string(),
                )
            })
    }

    /// Returns a paginator sharing this store's backend and configuration.
    pub fn paginator(&self) -> Paginator<'_, B> {
        Paginator::new(&self.backend, &self.config)
    }

    /// Produces one page of `collection`, or of the default collection when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] when no collection can be resolved;
    /// see [`Paginator::paginate`] for the rest.
    pub async fn paginate(&self, collection: Option<&str>, request: PageRequest) -> DocumentStoreResult<PageResponse> {
        let collection = self.resolve_collection(collection)?;
        self.paginator().paginate(collection, request).await
    }

    /// Produces one page of a model's collection, converted to models.
    pub async fn paginate_models<M: Model>(&self, request: PageRequest) -> DocumentStoreResult<PageResponse<M>> {
        self.model_collection::<M>()
            .paginate_models(request)
            .await
    }

    /// Creates a new collection with the given name.
    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend
            .create_collection(name)
            .await
    }

    /// Drops (deletes) a collection with the given name.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts the backend down.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}
