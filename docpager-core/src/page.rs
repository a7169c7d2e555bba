//! Page envelopes returned by the pagination engine.
//!
//! A [`PageResponse`] carries the documents of one page and a [`PageDetails`] block that
//! describes how the page was produced and how to reach its neighbours. Serialized, it has
//! the shape API layers hand to clients:
//!
//! ```json
//! {
//!   "data": [ ... ],
//!   "details": {
//!     "pagination_method": "cursor",
//!     "sort": "_id",
//!     "unique_id": "_id",
//!     "query": { "author": { "$eq": "ada" } },
//!     "total": 25,
//!     "count": 10,
//!     "limit": 10,
//!     "cursors": { "after": "_000000000000000000000010", "before": null },
//!     "previous": null,
//!     "next": "/posts?sort=_id&limit=10&after=_000000000000000000000010"
//!   }
//! }
//! ```

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::{
    backend::PRIMARY_KEY,
    document::{Model, ModelExt},
    error::DocumentStoreResult,
    token::BoundaryToken,
};

/// The strategy that produced a page.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMethod {
    /// Keyset pagination on the identifier field.
    Cursor,
    /// Keyset pagination on a date/time field with identifier tie-break.
    Time,
    /// Skip/limit pagination by page number.
    Offset,
}

/// Navigation state of a page. Range pages carry boundary tokens, offset pages carry
/// page numbers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged, deny_unknown_fields)]
pub enum Cursors {
    Range {
        after: Option<BoundaryToken>,
        before: Option<BoundaryToken>,
    },
    Offset {
        prev_page: Option<usize>,
        next_page: Option<usize>,
    },
}

/// Metadata describing one page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PageDetails {
    pub pagination_method: PaginationMethod,
    /// The sort key the page was ordered by.
    pub sort: String,
    /// The identifier field used as cursor and tie-break.
    pub unique_id: String,
    /// The caller's filter as a Mongo-style document, empty when unfiltered.
    #[serde(default)]
    pub query: Document,
    /// Matches for the caller's filter, ignoring limit and boundaries.
    pub total: u64,
    /// Documents in this page.
    pub count: usize,
    pub limit: usize,
    pub cursors: Cursors,
    /// Link to the preceding page, if any.
    pub previous: Option<String>,
    /// Link to the following page, if any.
    pub next: Option<String>,
}

/// A single page of results.
///
/// # Type Parameters
///
/// * `T` - The type of items in `data`; raw documents unless converted with
///   [`try_map`](Self::try_map) or [`into_models`](PageResponse::into_models)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PageResponse<T = Document> {
    pub data: Vec<T>,
    pub details: PageDetails,
}

impl<T> PageResponse<T> {
    /// Creates a new builder for a page holding `data`.
    pub fn builder(data: Vec<T>, pagination_method: PaginationMethod) -> PageBuilder<T> {
        PageBuilder::new(data, pagination_method)
    }

    /// The `after` token of a range page.
    pub fn after(&self) -> Option<&BoundaryToken> {
        match &self.details.cursors {
            Cursors::Range { after, .. } => after.as_ref(),
            Cursors::Offset { .. } => None,
        }
    }

    /// The `before` token of a range page.
    pub fn before(&self) -> Option<&BoundaryToken> {
        match &self.details.cursors {
            Cursors::Range { before, .. } => before.as_ref(),
            Cursors::Offset { .. } => None,
        }
    }

    /// The next page number of an offset page.
    pub fn next_page(&self) -> Option<usize> {
        match &self.details.cursors {
            Cursors::Offset { next_page, .. } => *next_page,
            Cursors::Range { .. } => None,
        }
    }

    /// The previous page number of an offset page.
    pub fn prev_page(&self) -> Option<usize> {
        match &self.details.cursors {
            Cursors::Offset { prev_page, .. } => *prev_page,
            Cursors::Range { .. } => None,
        }
    }

    /// Converts every item, keeping the page metadata.
    ///
    /// # Errors
    ///
    /// Returns the first conversion error.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PageResponse<U>, E> {
        Ok(PageResponse {
            data: self.data.into_iter().map(f).collect::<Result<Vec<_>, _>>()?,
            details: self.details,
        })
    }
}

impl PageResponse<Document> {
    /// Deserializes the page's documents into models.
    ///
    /// # Errors
    ///
    /// Returns an error if any document does not match the model's shape.
    pub fn into_models<M: Model>(self) -> DocumentStoreResult<PageResponse<M>> {
        self.try_map(M::from_document)
    }
}

/// Builder for constructing [`PageResponse`] instances with a fluent API.
pub struct PageBuilder<T> {
    data: Vec<T>,
    pagination_method: PaginationMethod,
    sort: String,
    unique_id: String,
    query: Document,
    total: u64,
    limit: usize,
    cursors: Option<Cursors>,
    previous: Option<String>,
    next: Option<String>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(data: Vec<T>, pagination_method: PaginationMethod) -> Self {
        Self {
            data,
            pagination_method,
            sort: String::new(),
            unique_id: PRIMARY_KEY.to_string(),
            query: Document::new(),
            total: 0,
            limit: 0,
            cursors: None,
            previous: None,
            next: None,
        }
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = unique_id.into();
        self
    }

    pub fn with_query(mut self, query: Document) -> Self {
        self.query = query;
        self
    }

    /// Sets the total count of matches across all pages.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_cursors(mut self, cursors: Cursors) -> Self {
        self.cursors = Some(cursors);
        self
    }

    pub fn with_previous(mut self, previous: Option<String>) -> Self {
        self.previous = previous;
        self
    }

    pub fn with_next(mut self, next: Option<String>) -> Self {
        self.next = next;
        self
    }

    /// Builds and returns the final [`PageResponse`].
    ///
    /// Without explicit cursors, range pages get empty tokens and offset pages get no
    /// page numbers.
    pub fn build(self) -> PageResponse<T> {
        let cursors = self.cursors.unwrap_or(match self.pagination_method {
            PaginationMethod::Offset => Cursors::Offset {
                prev_page: None,
                next_page: None,
            },
            _ => Cursors::Range {
                after: None,
                before: None,
            },
        });

        PageResponse {
            details: PageDetails {
                pagination_method: self.pagination_method,
                sort: self.sort,
                unique_id: self.unique_id,
                query: self.query,
                total: self.total,
                count: self.data.len(),
                limit: self.limit,
                cursors,
                previous: self.previous,
                next: self.next,
            },
            data: self.data,
        }
    }
}

/// Page-number arithmetic for offset pagination.
///
/// Pages are 1-indexed (page 1 is the first page).
///
/// # Example
///
/// ```ignore
/// use docpager::page::PageNumber;
///
/// let page = PageNumber::new(3, 20);
/// assert_eq!(page.offset(), Some(40));
/// assert_eq!(page.next_page(41), Some(4));
/// assert_eq!(page.next_page(60), None);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
}

impl PageNumber {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    /// Calculates the number of items to skip for this page, or `None` when it does not
    /// fit in a `usize`.
    pub fn offset(&self) -> Option<usize> {
        self.page.saturating_sub(1).checked_mul(self.per_page)
    }

    /// The following page number, present while `page * per_page < total`.
    pub fn next_page(&self, total: u64) -> Option<usize> {
        let seen = (self.page as u128) * (self.per_page as u128);
        if seen < u128::from(total) {
            self.page.checked_add(1)
        } else {
            None
        }
    }

    /// The preceding page number, present for every page after the first.
    pub fn prev_page(&self) -> Option<usize> {
        if self.page > 1 { Some(self.page - 1) } else { None }
    }

    pub fn cursors(&self, total: u64) -> Cursors {
        Cursors::Offset {
            prev_page: self.prev_page(),
            next_page: self.next_page(total),
        }
    }
}
