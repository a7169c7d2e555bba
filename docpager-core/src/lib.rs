//! Cursor, time and offset pagination over document stores.
//!
//! This crate is the core of the docpager project and provides:
//!
//! - **Identifiers and models** ([`identifier`], [`document`]) - Document identifiers and typed models
//! - **Query API** ([`query`], [`filter`]) - Backend-neutral filter expressions and Mongo-style filter parsing
//! - **Store backend abstraction** ([`backend`]) - The contract every storage backend implements
//! - **Selector classification** ([`classify`]) - Deciding whether a value names one document or filters many
//! - **Boundary tokens** ([`token`]) - Encoding and decoding page boundaries
//! - **Range predicates** ([`predicate`]) - Resuming a page from a boundary
//! - **Lazy results** ([`results`]) - Streaming or materialized result sets
//! - **Pagination** ([`paginate`], [`page`], [`config`]) - The pagination engine, its envelope and settings
//! - **Collections and stores** ([`collection`], [`store`]) - High-level API bound to a backend
//! - **Error handling** ([`error`]) - The shared error type
//!
//! # Example
//!
//! ```ignore
//! use docpager::{DocumentStore, PageRequest};
//! use docpager_memory::InMemoryStore;
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let posts = store.collection("posts");
//!
//! let first = posts.paginate(PageRequest::new().limit(10)).await?;
//! if let Some(after) = first.after() {
//!     let second = posts.paginate(PageRequest::new().limit(10).after(after)).await?;
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docpager_core;

pub mod backend;
pub mod classify;
pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod identifier;
pub mod page;
pub mod paginate;
pub mod predicate;
pub mod query;
pub mod results;
pub mod store;
pub mod token;
pub mod value;
