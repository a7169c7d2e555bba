//! Cursor, time and offset pagination over document stores.
//!
//! This crate is the primary entry point of the docpager project. It re-exports the core
//! types from `docpager-core`, the `#[derive(Model)]` macro, and the storage backends.
//!
//! # Features
//!
//! - **Keyset pagination** - Stable `after`/`before` tokens on the identifier or a timestamp field
//! - **Offset pagination** - Classic page numbers when a page is requested explicitly
//! - **Lookahead** - Advertised tokens are checked so they never lead to an empty page
//! - **Flexible selectors** - Identifiers, canonical strings, `$oid`/`$regex` literals or filter documents
//! - **Multiple backends** - In-memory and MongoDB (`mongodb` feature)
//! - **Blocking client** - A synchronous wrapper (`blocking` feature)
//!
//! # Quick Start
//!
//! ```ignore
//! use docpager::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "posts")]
//! pub struct Post {
//!     #[serde(rename = "_id")]
//!     pub id: Identifier,
//!     pub title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::new());
//!     let posts = store.model_collection::<Post>();
//!
//!     posts.insert_models(&[Post { id: Identifier::new(), title: "hello".into() }]).await?;
//!
//!     let first = store.paginate_models::<Post>(PageRequest::new().limit(10)).await?;
//!     if let Some(after) = first.after() {
//!         let second = posts.paginate(PageRequest::new().limit(10).after(after)).await?;
//!         println!("{}", serde_json::to_string(&second)?);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docpager;

#[cfg(feature = "blocking")]
pub mod blocking;
pub mod prelude;

pub use docpager_core::{
    backend, classify, collection, config, document, error, filter, identifier, page, paginate, predicate, query,
    results, store, token, value,
};

pub use docpager_core::{
    collection::{Collection, Lookup},
    config::PaginationConfig,
    document::{Model, ModelExt},
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    page::{PageResponse, PaginationMethod},
    paginate::PageRequest,
    query::{Filter, Query, SortDirection},
    results::LazyResultSet,
    store::DocumentStore,
    token::BoundaryToken,
};
pub use docpager_macros::Model;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docpager_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docpager_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
