//! Convenient re-exports of commonly used types from docpager.
//!
//! ```ignore
//! use docpager::prelude::*;
//! ```

pub use docpager_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    classify::{Classified, IdentifierClassifier, Selector},
    collection::{Collection, Lookup},
    config::PaginationConfig,
    document::{Model, ModelExt},
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    page::{Cursors, PageDetails, PageResponse, PaginationMethod},
    paginate::{PageRequest, Paginator},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    results::LazyResultSet,
    store::DocumentStore,
    token::BoundaryToken,
};
pub use docpager_macros::Model;
