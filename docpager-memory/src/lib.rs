//! In-memory document storage backend for docpager.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It evaluates filters, multi-key sorts, offsets and limits the way a document database
//! would, which makes it the backend of choice for tests and small deployments.
//!
//! # Quick Start
//!
//! ```ignore
//! use docpager::{DocumentStore, PageRequest, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::new());
//!     let posts = store.collection("posts");
//!
//!     posts.insert(vec![doc! { "title": "hello" }]).await?;
//!     let page = posts.paginate(PageRequest::new().limit(10)).await?;
//!     assert_eq!(page.data.len(), 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docpager_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
