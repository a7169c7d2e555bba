//! MongoDB backend implementation for docpager.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Filters,
//! compound sorts, skips, limits and bounded counts are all pushed down to the server, and
//! query results are streamed from a server-side cursor.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docpager = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! Pass a connection string and database name to [`MongoDbStore::builder`], or read them
//! from `MONGO_URI` / `MONGO_HOST` / `MONGO_PORT` / `MONGO_DB` / `MONGO_REPLICA_SET` with
//! [`MongoDbStoreBuilder::from_env`].
//!
//! # Example
//!
//! ```ignore
//! use docpager::{backend::StoreBackendBuilder, mongodb::MongoDbStoreBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStoreBuilder::from_env()?.build().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docpager_mongodb;

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
