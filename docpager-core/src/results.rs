//! Lazy, reusable query results.
//!
//! A [`LazyResultSet`] is either bound to a query whose stream has not been read yet
//! ([`StreamingResult`]) or to an ordered, in-memory sequence ([`MaterializedResult`]).
//! Both answer `count`, `sort`, `distinct`, `list` and `close` with the same meaning; only
//! where the work happens differs. A result set belongs to one caller and must not be
//! shared between concurrent consumers.

use bson::{Bson, Document};
use futures::TryStreamExt;
use std::cmp::Ordering;
use tracing::{debug, trace};

use crate::{
    backend::{DocumentStream, StoreBackend},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Query, Sort, SortDirection},
    value::{compare_values, flatten_document, lookup_path, values_at_path, values_equal},
};

/// Results of a query that has not been materialized.
///
/// The stream is opened on first read and dropped on [`rewind`](Self::rewind),
/// [`sort`](Self::sort) and [`close`](Self::close), so every read after those starts from
/// the first matching document again.
pub struct StreamingResult<B> {
    backend: B,
    collection: String,
    query: Query,
    stream: Option<DocumentStream>,
    closed: bool,
}

impl<B: StoreBackend> StreamingResult<B> {
    pub fn new(backend: B, collection: impl Into<String>, query: Query) -> Self {
        Self {
            backend,
            collection: collection.into(),
            query,
            stream: None,
            closed: false,
        }
    }

    /// The query this result set reads from.
    pub fn query(&self) -> &Query {
        &self.query
    }

    fn ensure_open(&self) -> DocumentStoreResult<()> {
        if self.closed {
            return Err(DocumentStoreError::ResultSetClosed);
        }
        Ok(())
    }

    fn direction(&self) -> SortDirection {
        self.query
            .sort
            .first()
            .map(|sort| sort.direction)
            .unwrap_or(SortDirection::Asc)
    }

    /// Counts the documents the query selects, honoring its offset and limit.
    ///
    /// Falls back to an unbounded count when the backend cannot bound one.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.ensure_open()?;

        match self.backend.count_documents(&self.query, &self.collection).await {
            Err(DocumentStoreError::Unsupported(reason)) => {
                debug!(collection = %self.collection, %reason, "bounded count unsupported, counting all matches");

                let unbounded = Query {
                    filter: self.query.filter.clone(),
                    ..Query::default()
                };
                let total = self.backend.count_documents(&unbounded, &self.collection).await?;
                let skipped = total.saturating_sub(self.query.offset.unwrap_or(0) as u64);

                Ok(match self.query.limit {
                    Some(limit) => skipped.min(limit as u64),
                    None => skipped,
                })
            }
            other => other,
        }
    }

    /// Replaces the query's ordering and resets the read position.
    pub fn sort(&mut self, field: impl Into<String>, direction: SortDirection) -> DocumentStoreResult<()> {
        self.ensure_open()?;
        self.query.sort = vec![Sort::new(field, direction)];
        self.stream = None;
        Ok(())
    }

    /// Distinct values of `field` among matching documents, ordered by the current direction.
    pub async fn distinct(&self, field: &str) -> DocumentStoreResult<Vec<Bson>> {
        self.ensure_open()?;

        let mut values = self
            .backend
            .distinct_values(field, self.query.filter.clone(), &self.collection)
            .await?;
        sort_values(&mut values, self.direction());
        Ok(values)
    }

    /// Reads the whole query into memory without disturbing this result set's position.
    pub async fn list(&self) -> DocumentStoreResult<MaterializedResult> {
        self.ensure_open()?;

        let documents = self
            .backend
            .find_documents(self.query.clone(), &self.collection)
            .await?;
        Ok(MaterializedResult::with_direction(documents, self.direction()))
    }

    /// Returns the next document, opening the stream on first use.
    pub async fn next(&mut self) -> DocumentStoreResult<Option<Document>> {
        self.ensure_open()?;

        if self.stream.is_none() {
            trace!(collection = %self.collection, "opening result stream");
            let stream = self
                .backend
                .stream_documents(self.query.clone(), &self.collection)
                .await?;
            self.stream = Some(stream);
        }

        match self.stream.as_mut() {
            Some(stream) => stream.try_next().await,
            None => Ok(None),
        }
    }

    /// Returns the first matching document without moving the read position.
    pub async fn first(&self) -> DocumentStoreResult<Option<Document>> {
        self.ensure_open()?;

        let query = Query {
            limit: Some(1),
            ..self.query.clone()
        };
        let mut documents = self.backend.find_documents(query, &self.collection).await?;
        Ok(if documents.is_empty() {
            None
        } else {
            Some(documents.swap_remove(0))
        })
    }

    /// Drops the open stream so the next read starts over.
    pub fn rewind(&mut self) -> DocumentStoreResult<()> {
        self.ensure_open()?;
        self.stream = None;
        Ok(())
    }

    /// Releases the stream. Further reads fail with
    /// [`DocumentStoreError::ResultSetClosed`]. Closing twice is a no-op.
    pub fn close(&mut self) {
        if !self.closed {
            debug!(collection = %self.collection, "closing streaming result set");
        }
        self.stream = None;
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// An ordered, in-memory sequence of documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedResult {
    documents: Vec<Document>,
    originals: Option<Vec<Document>>,
    direction: SortDirection,
    position: usize,
}

impl MaterializedResult {
    /// Wraps `documents` in their current order.
    pub fn new(documents: Vec<Document>) -> Self {
        Self::with_direction(documents, SortDirection::Asc)
    }

    fn with_direction(documents: Vec<Document>, direction: SortDirection) -> Self {
        Self {
            documents,
            originals: None,
            direction,
            position: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.documents.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Stable sort by a dotted field path. Documents missing the field sort last in either
    /// direction.
    pub fn sort(&mut self, field: &str, direction: SortDirection) {
        let keyed = |doc: &Document| lookup_path(doc, field).cloned();

        let mut order: Vec<(usize, Option<Bson>)> = self
            .documents
            .iter()
            .enumerate()
            .map(|(index, doc)| (index, keyed(doc)))
            .collect();

        order.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => match direction {
                SortDirection::Asc => compare_values(a, b),
                SortDirection::Desc => compare_values(b, a),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        let indices: Vec<usize> = order.into_iter().map(|(index, _)| index).collect();
        self.documents = reorder(&self.documents, &indices);
        if let Some(originals) = &self.originals {
            self.originals = Some(reorder(originals, &indices));
        }
        self.direction = direction;
        self.position = 0;
    }

    /// Distinct leaf values found at `field`, ordered by the current direction.
    ///
    /// Paths that do not resolve in a document are skipped.
    pub fn distinct(&self, field: &str) -> Vec<Bson> {
        let mut values: Vec<Bson> = self
            .documents
            .iter()
            .flat_map(|doc| values_at_path(doc, field))
            .cloned()
            .collect();

        sort_values(&mut values, self.direction);
        values
    }

    /// A copy of this sequence with its read position reset.
    pub fn list(&self) -> MaterializedResult {
        Self {
            position: 0,
            ..self.clone()
        }
    }

    pub fn next(&mut self) -> Option<Document> {
        let doc = self.documents.get(self.position).cloned();
        if doc.is_some() {
            self.position += 1;
        }
        doc
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }

    /// Replaces every document with its dotted-key flattening. The unflattened documents
    /// stay available through [`original`](Self::original).
    pub fn flatten(&mut self) {
        if self.originals.is_none() {
            let flat = self.documents.iter().map(flatten_document).collect();
            self.originals = Some(std::mem::replace(&mut self.documents, flat));
        }
    }

    /// The documents as they were before [`flatten`](Self::flatten).
    pub fn original(&self) -> &[Document] {
        self.originals.as_deref().unwrap_or(&self.documents)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Clears the sequence.
    pub fn close(&mut self) {
        self.documents.clear();
        self.originals = None;
        self.position = 0;
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

impl From<Vec<Document>> for MaterializedResult {
    fn from(documents: Vec<Document>) -> Self {
        MaterializedResult::new(documents)
    }
}

fn reorder(documents: &[Document], indices: &[usize]) -> Vec<Document> {
    indices.iter().map(|&index| documents[index].clone()).collect()
}

fn sort_values(values: &mut Vec<Bson>, direction: SortDirection) {
    values.sort_by(compare_values);
    values.dedup_by(|a, b| values_equal(a, b));
    if direction == SortDirection::Desc {
        values.reverse();
    }
}

/// Query results in one of two backing modes.
///
/// # Example
///
/// ```ignore
/// let mut results = collection.find(doc! { "status": "active" }).await?;
/// let total = results.count().await?;
/// results.sort("created_datetime", SortDirection::Desc).await?;
/// let page = results.list().await?;
/// results.close();
/// ```
pub enum LazyResultSet<B> {
    Streaming(StreamingResult<B>),
    Materialized(MaterializedResult),
}

impl<B: StoreBackend> LazyResultSet<B> {
    /// A result set that reads `query` from `collection` on demand.
    pub fn streaming(backend: B, collection: impl Into<String>, query: Query) -> Self {
        LazyResultSet::Streaming(StreamingResult::new(backend, collection, query))
    }

    /// A result set over documents already in memory.
    pub fn materialized(documents: Vec<Document>) -> Self {
        LazyResultSet::Materialized(MaterializedResult::new(documents))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, LazyResultSet::Streaming(_))
    }

    /// Number of documents in the result set.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        match self {
            LazyResultSet::Streaming(result) => result.count().await,
            LazyResultSet::Materialized(result) => Ok(result.count()),
        }
    }

    /// Reorders the result set by `field` and resets the read position.
    pub async fn sort(&mut self, field: &str, direction: SortDirection) -> DocumentStoreResult<&mut Self> {
        match self {
            LazyResultSet::Streaming(result) => result.sort(field, direction)?,
            LazyResultSet::Materialized(result) => result.sort(field, direction),
        }
        Ok(self)
    }

    /// Distinct values at a dotted `field` path.
    pub async fn distinct(&self, field: &str) -> DocumentStoreResult<Vec<Bson>> {
        match self {
            LazyResultSet::Streaming(result) => result.distinct(field).await,
            LazyResultSet::Materialized(result) => Ok(result.distinct(field)),
        }
    }

    /// A new, materialized result set holding every document from the start.
    pub async fn list(&self) -> DocumentStoreResult<LazyResultSet<B>> {
        Ok(LazyResultSet::Materialized(match self {
            LazyResultSet::Streaming(result) => result.list().await?,
            LazyResultSet::Materialized(result) => result.list(),
        }))
    }

    /// Returns the next document, or `None` once the results are exhausted.
    pub async fn next(&mut self) -> DocumentStoreResult<Option<Document>> {
        match self {
            LazyResultSet::Streaming(result) => result.next().await,
            LazyResultSet::Materialized(result) => Ok(result.next()),
        }
    }

    pub async fn first(&self) -> DocumentStoreResult<Option<Document>> {
        match self {
            LazyResultSet::Streaming(result) => result.first().await,
            LazyResultSet::Materialized(result) => Ok(result.first().cloned()),
        }
    }

    pub fn rewind(&mut self) -> DocumentStoreResult<()> {
        match self {
            LazyResultSet::Streaming(result) => result.rewind(),
            LazyResultSet::Materialized(result) => {
                result.rewind();
                Ok(())
            }
        }
    }

    /// Flattens every document into dotted keys, materializing a streaming result set first.
    pub async fn flatten(&mut self) -> DocumentStoreResult<&mut Self> {
        if let LazyResultSet::Streaming(result) = self {
            let materialized = result.list().await?;
            result.close();
            *self = LazyResultSet::Materialized(materialized);
        }

        if let LazyResultSet::Materialized(result) = self {
            result.flatten();
        }
        Ok(self)
    }

    /// The unflattened documents of a materialized result set.
    pub fn original(&self) -> Option<&[Document]> {
        match self {
            LazyResultSet::Streaming(_) => None,
            LazyResultSet::Materialized(result) => Some(result.original()),
        }
    }

    /// Releases the stream or clears the sequence. Idempotent.
    pub fn close(&mut self) {
        match self {
            LazyResultSet::Streaming(result) => result.close(),
            LazyResultSet::Materialized(result) => result.close(),
        }
    }

    /// Every document, reading a streaming result set from the start.
    pub async fn into_documents(self) -> DocumentStoreResult<Vec<Document>> {
        match self {
            LazyResultSet::Streaming(result) => Ok(result.list().await?.into_documents()),
            LazyResultSet::Materialized(result) => Ok(result.into_documents()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use rstest::{fixture, rstest};

    #[fixture]
    fn people() -> MaterializedResult {
        MaterializedResult::new(vec![
            doc! { "name": "carol", "age": 41, "address": { "city": "Oslo" }, "tags": ["a", "b"] },
            doc! { "name": "alice", "address": { "city": "Lima" }, "tags": ["b"] },
            doc! { "name": "bob", "age": 29, "address": { "city": "Oslo" } },
            doc! { "name": "dave", "age": 29, "address": "unknown" },
        ])
    }

    fn names(result: &MaterializedResult) -> Vec<String> {
        result
            .documents()
            .iter()
            .map(|doc| doc.get_str("name").unwrap().to_owned())
            .collect()
    }

    #[rstest]
    fn test_sort_is_stable_with_missing_fields_last(mut people: MaterializedResult) {
        // Act
        people.sort("age", SortDirection::Asc);
        let ascending = names(&people);
        people.sort("age", SortDirection::Desc);
        let descending = names(&people);

        // Assert
        assert_eq!(ascending, vec!["bob", "dave", "carol", "alice"]);
        assert_eq!(descending, vec!["carol", "bob", "dave", "alice"]);
    }

    #[rstest]
    fn test_distinct_walks_nested_paths(mut people: MaterializedResult) {
        // Act
        let ascending = people.distinct("address.city");
        people.sort("name", SortDirection::Desc);
        let descending = people.distinct("address.city");

        // Assert
        assert_eq!(ascending, vec![Bson::from("Lima"), Bson::from("Oslo")]);
        assert_eq!(descending, vec![Bson::from("Oslo"), Bson::from("Lima")]);
    }

    #[rstest]
    fn test_distinct_spreads_arrays(people: MaterializedResult) {
        assert_eq!(people.distinct("tags"), vec![Bson::from("a"), Bson::from("b")]);
    }

    #[rstest]
    fn test_distinct_matches_after_flattening(people: MaterializedResult) {
        // Arrange
        let mut flat = people.list();

        // Act
        flat.flatten();

        // Assert
        assert_eq!(flat.distinct("address.city"), people.distinct("address.city"));
        assert!(flat.documents()[0].contains_key("address.city"));
        assert_eq!(flat.original(), people.documents());
    }

    #[rstest]
    fn test_next_and_rewind(mut people: MaterializedResult) {
        // Act
        let first = people.next();
        let second = people.next();
        people.rewind();
        let again = people.next();

        // Assert
        assert_eq!(first, again);
        assert_ne!(first, second);
    }

    #[rstest]
    fn test_list_does_not_move_position(mut people: MaterializedResult) {
        // Arrange
        people.next();

        // Act
        let mut listed = people.list();

        // Assert
        assert_eq!(listed.next().unwrap().get_str("name").unwrap(), "carol");
        assert_eq!(people.next().unwrap().get_str("name").unwrap(), "alice");
    }

    #[rstest]
    fn test_close_clears_and_is_idempotent(mut people: MaterializedResult) {
        // Act
        people.close();
        people.close();

        // Assert
        assert_eq!(people.count(), 0);
        assert!(people.distinct("name").is_empty());
    }
}
