//! The pagination engine.
//!
//! [`Paginator::paginate`] produces one page of a filtered, sorted collection using one of
//! three strategies, chosen in this order:
//!
//! 1. **offset**, when a page number is given: skip `(page - 1) * limit` documents;
//! 2. **cursor**, when the sort key is the identifier field;
//! 3. **time**, for any other sort key, with the identifier as tie-break.
//!
//! Cursor and time pages are keyset pages: they resume from a [`BoundaryToken`] rather
//! than an offset, so inserts and deletes elsewhere in the collection do not shift them.
//! Every token a page advertises has been checked with a bounded count first, so a `next`
//! link never points at an empty page at the moment it is issued.

use bson::Document;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::{
    backend::StoreBackend,
    classify::{IdentifierClassifier, Selector},
    config::PaginationConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    page::{Cursors, PageBuilder, PageNumber, PageResponse, PaginationMethod},
    predicate::{Edge, PredicateComposer},
    query::{Expr, Query, SortDirection},
    results::LazyResultSet,
    token::{BoundaryToken, RangeCursorCodec},
};

/// The parameters of one pagination call. Every field is optional.
///
/// Requests can be read straight from a URL query string with
/// [`from_query_string`](Self::from_query_string); the filter is never part of it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    /// Documents to page over. Classified first, so an identifier selects one document.
    #[serde(skip)]
    pub filter: Option<Selector>,
    /// Sort key; defaults to the identifier field.
    pub sort: Option<String>,
    /// Sort direction; defaults to descending.
    pub direction: Option<SortDirection>,
    /// Page size; defaults to the configured limit.
    pub limit: Option<usize>,
    /// Resume after this token.
    pub after: Option<String>,
    /// Resume before this token.
    pub before: Option<String>,
    /// Page number for offset pagination (1-indexed).
    pub page: Option<usize>,
    /// Base of the `next`/`previous` links.
    pub endpoint: Option<String>,
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `sort`, `direction`, `limit`, `after`, `before` and `page` from a URL query
    /// string. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidPaginationArgs`] when a value has the wrong type.
    pub fn from_query_string(query: &str) -> DocumentStoreResult<Self> {
        serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|err| DocumentStoreError::InvalidPaginationArgs(err.to_string()))
    }

    pub fn filter(mut self, filter: impl Into<Selector>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn direction(mut self, direction: SortDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, token: impl AsRef<str>) -> Self {
        self.after = Some(token.as_ref().to_string());
        self
    }

    pub fn before(mut self, token: impl AsRef<str>) -> Self {
        self.before = Some(token.as_ref().to_string());
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Request values resolved against the configuration.
struct Resolved<'r> {
    base: Option<Expr>,
    sort: &'r str,
    direction: SortDirection,
    limit: usize,
    endpoint: &'r str,
}

impl Resolved<'_> {
    /// Builds a navigation link carrying the sort, limit and one position parameter.
    fn link(&self, key: &str, value: &str) -> DocumentStoreResult<String> {
        let limit = self.limit.to_string();
        let mut params = vec![("sort", self.sort), ("limit", limit.as_str())];
        if self.direction == SortDirection::Asc {
            params.push(("direction", "asc"));
        }
        params.push((key, value));

        let query = serde_urlencoded::to_string(&params)
            .map_err(|err| DocumentStoreError::Serialization(err.to_string()))?;
        Ok(format!("{}?{query}", self.endpoint))
    }

    /// Starts the envelope of a page produced from this request.
    fn page(&self, data: Vec<Document>, method: PaginationMethod, id_field: &str) -> DocumentStoreResult<PageBuilder<Document>> {
        let query = match &self.base {
            Some(base) => base.to_document()?,
            None => Document::new(),
        };

        Ok(PageResponse::builder(data, method)
            .with_sort(self.sort)
            .with_unique_id(id_field)
            .with_query(query)
            .with_limit(self.limit))
    }
}

/// Produces pages over one backend with one configuration.
#[derive(Debug)]
pub struct Paginator<'a, B> {
    backend: &'a B,
    config: &'a PaginationConfig,
    composer: PredicateComposer,
}

impl<'a, B: StoreBackend> Paginator<'a, B> {
    pub fn new(backend: &'a B, config: &'a PaginationConfig) -> Self {
        Self {
            backend,
            config,
            composer: PredicateComposer::new(RangeCursorCodec::new(config.id_field.clone())),
        }
    }

    fn codec(&self) -> &RangeCursorCodec {
        self.composer.codec()
    }

    /// Produces one page of `collection`.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::Configuration`] when `collection` is empty
    /// - [`DocumentStoreError::InvalidPaginationArgs`] for a zero limit, a page number
    ///   below 1 or too large to skip to, a sort key outside the allow-list, or both `after` and `before`
    /// - [`DocumentStoreError::InvalidCursor`] for a token that does not decode
    /// - [`DocumentStoreError::InvalidFilter`] for a filter that cannot be queried
    /// - any backend error
    pub async fn paginate(&self, collection: &str, request: PageRequest) -> DocumentStoreResult<PageResponse> {
        if collection.is_empty() {
            return Err(DocumentStoreError::Configuration(
                "no collection to paginate".to_string(),
            ));
        }

        let base = match request.filter {
            Some(selector) => IdentifierClassifier::classify(selector).into_filter(&self.config.id_field)?,
            None => None,
        };
        let resolved = Resolved {
            base,
            sort: self.config.resolve_sort(request.sort.as_deref())?,
            direction: request.direction.unwrap_or(SortDirection::Desc),
            limit: self.config.resolve_limit(request.limit)?,
            endpoint: request
                .endpoint
                .as_deref()
                .unwrap_or(&self.config.default_endpoint),
        };

        if let Some(page) = request.page {
            return self.offset_page(collection, &resolved, page).await;
        }

        self.range_page(
            collection,
            &resolved,
            request.after.as_deref(),
            request.before.as_deref(),
        )
        .await
    }

    fn sorted_query(&self, filter: Option<Expr>, sort: &str, direction: SortDirection) -> Query {
        let mut builder = Query::builder()
            .maybe_filter(filter)
            .sort(sort, direction);
        if sort != self.config.id_field {
            builder = builder.sort(self.config.id_field.as_str(), direction);
        }
        builder.build()
    }

    async fn fetch(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        LazyResultSet::streaming(self.backend, collection, query)
            .into_documents()
            .await
    }

    async fn count(&self, collection: &str, filter: Option<Expr>, limit: Option<usize>) -> DocumentStoreResult<u64> {
        let query = Query {
            filter,
            limit,
            ..Query::default()
        };
        LazyResultSet::streaming(self.backend, collection, query)
            .count()
            .await
    }

    async fn offset_page(&self, collection: &str, resolved: &Resolved<'_>, page: usize) -> DocumentStoreResult<PageResponse> {
        if page < 1 {
            return Err(DocumentStoreError::InvalidPaginationArgs(
                "page must be at least 1".to_string(),
            ));
        }

        debug!(collection, sort = resolved.sort, limit = resolved.limit, page, "paginating by offset");

        let number = PageNumber::new(page, resolved.limit);
        let offset = number.offset().ok_or_else(|| {
            DocumentStoreError::InvalidPaginationArgs(format!("page {page} is out of range"))
        })?;
        let total = self.count(collection, resolved.base.clone(), None).await?;

        let mut query = self.sorted_query(resolved.base.clone(), resolved.sort, resolved.direction);
        query.offset = Some(offset);
        query.limit = Some(resolved.limit);
        let data = self.fetch(collection, query).await?;

        let next = number
            .next_page(total)
            .map(|next| resolved.link("page", &next.to_string()))
            .transpose()?;
        let previous = number
            .prev_page()
            .map(|prev| resolved.link("page", &prev.to_string()))
            .transpose()?;

        Ok(resolved
            .page(data, PaginationMethod::Offset, &self.config.id_field)?
            .with_total(total)
            .with_cursors(number.cursors(total))
            .with_next(next)
            .with_previous(previous)
            .build())
    }

    async fn range_page(
        &self,
        collection: &str,
        resolved: &Resolved<'_>,
        after: Option<&str>,
        before: Option<&str>,
    ) -> DocumentStoreResult<PageResponse> {
        let method = if self.codec().is_id_mode(resolved.sort) {
            PaginationMethod::Cursor
        } else {
            PaginationMethod::Time
        };
        debug!(collection, ?method, sort = resolved.sort, limit = resolved.limit, after, before, "paginating by range");

        let composed = self.composer.compose(
            resolved.base.clone(),
            resolved.sort,
            resolved.direction,
            after,
            before,
        )?;
        let total = self.count(collection, resolved.base.clone(), None).await?;

        // A before page reads away from the boundary in reverse, then restores page order.
        let read_direction = if before.is_some() {
            resolved.direction.reverse()
        } else {
            resolved.direction
        };
        let mut query = self.sorted_query(composed, resolved.sort, read_direction);
        query.limit = Some(resolved.limit);
        let mut data = self.fetch(collection, query).await?;
        if before.is_some() {
            data.reverse();
        }

        let resumed = after.is_some() || before.is_some();
        let after_candidate = if data.len() == resolved.limit || before.is_some() {
            data.last()
                .and_then(|doc| self.codec().encode_document(resolved.sort, doc))
        } else {
            None
        };
        let before_candidate = if resumed {
            data.first()
                .and_then(|doc| self.codec().encode_document(resolved.sort, doc))
        } else {
            None
        };

        let after_token = self
            .verify(collection, resolved, after_candidate, Edge::After)
            .await?;
        let before_token = self
            .verify(collection, resolved, before_candidate, Edge::Before)
            .await?;

        let next = after_token
            .as_ref()
            .map(|token| resolved.link("after", token.as_str()))
            .transpose()?;
        let previous = before_token
            .as_ref()
            .map(|token| resolved.link("before", token.as_str()))
            .transpose()?;

        Ok(resolved
            .page(data, method, &self.config.id_field)?
            .with_total(total)
            .with_cursors(Cursors::Range {
                after: after_token,
                before: before_token,
            })
            .with_next(next)
            .with_previous(previous)
            .build())
    }

    /// Keeps `candidate` only if at least one document lies beyond it.
    ///
    /// This is a best-effort check: a document deleted between this count and the
    /// caller's follow-up can still leave the next page empty.
    async fn verify(
        &self,
        collection: &str,
        resolved: &Resolved<'_>,
        candidate: Option<BoundaryToken>,
        edge: Edge,
    ) -> DocumentStoreResult<Option<BoundaryToken>> {
        let Some(token) = candidate else {
            return Ok(None);
        };

        let (after, before) = match edge {
            Edge::After => (Some(token.as_str()), None),
            Edge::Before => (None, Some(token.as_str())),
        };
        let filter = self.composer.compose(
            resolved.base.clone(),
            resolved.sort,
            resolved.direction,
            after,
            before,
        )?;

        let ahead = self.count(collection, filter, Some(resolved.limit)).await?;
        if ahead == 0 {
            debug!(collection, token = %token, ?edge, "lookahead found no documents, discarding token");
            return Ok(None);
        }

        trace!(collection, token = %token, ?edge, ahead, "lookahead confirmed token");
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_request_from_query_string() {
        // Act
        let request = PageRequest::from_query_string("?sort=created_datetime&limit=5&after=abc_1&direction=asc")
            .unwrap();

        // Assert
        assert_eq!(
            request,
            PageRequest::new()
                .sort("created_datetime")
                .limit(5)
                .after("abc_1")
                .direction(SortDirection::Asc)
        );
    }

    #[rstest]
    fn test_request_from_query_string_rejects_bad_numbers() {
        assert!(matches!(
            PageRequest::from_query_string("limit=ten"),
            Err(DocumentStoreError::InvalidPaginationArgs(_))
        ));
    }

    #[rstest]
    fn test_links_are_query_encoded() {
        // Arrange
        let resolved = Resolved {
            base: None,
            sort: "created_datetime",
            direction: SortDirection::Desc,
            limit: 10,
            endpoint: "/posts",
        };

        // Act
        let link = resolved.link("after", "2024-01-01T00:00:00.000Z_507f1f77bcf86cd799439011").unwrap();

        // Assert
        assert_eq!(
            link,
            "/posts?sort=created_datetime&limit=10&after=2024-01-01T00%3A00%3A00.000Z_507f1f77bcf86cd799439011"
        );
    }
}
