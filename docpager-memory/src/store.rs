//! In-memory storage implementation for document stores.
//!
//! Documents live in per-collection ordered maps keyed by their [`Identifier`], behind an
//! async-aware read-write lock. Without sort keys, results come back in identifier order.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::{debug, trace};

use docpager_core::{
    backend::{
        DocumentStream, PRIMARY_KEY, Replaced, StoreBackend, StoreBackendBuilder, UpdateOutcome, assign_primary_key,
        bind_primary_key, ensure_distinct_keys,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    query::{Expr, FieldOp, Query, Sort, SortDirection},
    value::{compare_values, lookup_path, values_at_path, values_equal},
};

use crate::evaluator::Matcher;

type CollectionMap = BTreeMap<Identifier, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state. Multiple clones
/// of the same instance share the same underlying data.
///
/// # Performance
///
/// Queries scan every document in a collection (no indexing). That is fine for tests and
/// small datasets; use the MongoDB backend for anything larger.
///
/// # Example
///
/// ```ignore
/// use docpager_memory::InMemoryStore;
/// use docpager::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let ids = store.insert_documents(vec![doc! { "name": "Alice" }], "users").await?;
/// assert_eq!(ids.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> (identifier -> document)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Runs `query` against a collection snapshot: filter, sort, then offset and limit.
    async fn select(&self, query: &Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut selected = Matcher::new().filter_documents(collection_map.values(), query.filter.as_ref())?;

        if !query.sort.is_empty() {
            selected.sort_by(|a, b| compare_by_keys(a, b, &query.sort));
        }

        let documents: Vec<Document> = selected
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        trace!(collection, returned = documents.len(), "in-memory query");
        Ok(documents)
    }
}

/// Compares two documents by each sort key in turn; missing fields sort as null.
fn compare_by_keys(a: &Document, b: &Document, keys: &[Sort]) -> Ordering {
    keys.iter()
        .map(|sort| {
            let left = lookup_path(a, &sort.field).unwrap_or(&Bson::Null);
            let right = lookup_path(b, &sort.field).unwrap_or(&Bson::Null);
            let ordering = compare_values(left, right);

            match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Writes `value` at a dotted `path`, creating intermediate documents as needed.
fn set_path(doc: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }

            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DocumentStoreError::InvalidDocument(format!(
                    "cannot set '{path}': '{head}' is not a document"
                ))),
            }
        }
    }
}

/// Copies the equality clauses of an upsert filter into the document it inserts.
fn seed_equalities(doc: &mut Document, expr: &Expr) -> DocumentStoreResult<()> {
    match expr {
        Expr::Field {
            field,
            op: FieldOp::Eq,
            value,
        } => set_path(doc, field, value.clone()),
        Expr::And(children) => children
            .iter()
            .try_for_each(|child| seed_equalities(doc, child)),
        _ => Ok(()),
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Identifier>> {
        let mut prepared = Vec::with_capacity(documents.len());
        for mut doc in documents {
            let id = assign_primary_key(&mut doc)?;
            prepared.push((id, doc));
        }

        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        let ids: Vec<Identifier> = prepared.iter().map(|(id, _)| *id).collect();
        ensure_distinct_keys(&ids, collection)?;
        if let Some(taken) = ids.iter().find(|id| collection_map.contains_key(*id)) {
            return Err(DocumentStoreError::DocumentAlreadyExists(
                taken.to_string(),
                collection.to_string(),
            ));
        }

        for (id, doc) in prepared {
            collection_map.insert(id, doc);
        }

        debug!(collection, inserted = ids.len(), "inserted documents");
        Ok(ids)
    }

    async fn update_documents(
        &self,
        filter: Option<Expr>,
        set: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        if set.contains_key(PRIMARY_KEY) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "'{PRIMARY_KEY}' cannot be updated"
            )));
        }

        let mut store = self.store.write().await;
        if !upsert && !store.contains_key(collection) {
            return Ok(UpdateOutcome::default());
        }
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        let mut matcher = Matcher::new();
        let mut matched = 0;

        for doc in collection_map.values_mut() {
            let hit = match &filter {
                Some(expr) => matcher.matches(doc, expr)?,
                None => true,
            };
            if !hit {
                continue;
            }

            for (path, value) in &set {
                set_path(doc, path, value.clone())?;
            }
            matched += 1;
        }

        if matched > 0 || !upsert {
            return Ok(UpdateOutcome { matched, upserted: None });
        }

        let mut doc = Document::new();
        if let Some(expr) = &filter {
            seed_equalities(&mut doc, expr)?;
        }
        for (path, value) in &set {
            set_path(&mut doc, path, value.clone())?;
        }
        let id = assign_primary_key(&mut doc)?;
        if collection_map.contains_key(&id) {
            return Err(DocumentStoreError::DocumentAlreadyExists(
                id.to_string(),
                collection.to_string(),
            ));
        }
        collection_map.insert(id, doc);

        debug!(collection, %id, "upserted document");
        Ok(UpdateOutcome {
            matched: 0,
            upserted: Some(id),
        })
    }

    async fn replace_document(
        &self,
        id: Identifier,
        mut document: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Replaced> {
        bind_primary_key(&mut document, &id)?;

        let mut store = self.store.write().await;
        if !upsert && !store.contains_key(collection) {
            return Ok(Replaced::Missing);
        }
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        match collection_map.get_mut(&id) {
            Some(existing) => Ok(Replaced::Existing(std::mem::replace(existing, document))),
            None if upsert => {
                collection_map.insert(id, document);
                Ok(Replaced::Inserted)
            }
            None => Ok(Replaced::Missing),
        }
    }

    async fn delete_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };

        let doomed: Vec<Identifier> = {
            let mut matcher = Matcher::new();
            let mut doomed = Vec::new();
            for (id, doc) in collection_map.iter() {
                let matched = match &filter {
                    Some(expr) => matcher.matches(doc, expr)?,
                    None => true,
                };
                if matched {
                    doomed.push(*id);
                }
            }
            doomed
        };

        for id in &doomed {
            collection_map.remove(id);
        }

        debug!(collection, deleted = doomed.len(), "deleted documents");
        Ok(doomed.len() as u64)
    }

    async fn stream_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        let documents = self.select(&query, collection).await?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        self.select(&query, collection).await
    }

    async fn count_documents(&self, query: &Query, collection: &str) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(0);
        };

        let matched = Matcher::new()
            .filter_documents(collection_map.values(), query.filter.as_ref())?
            .len();
        let bounded = matched
            .saturating_sub(query.offset.unwrap_or(0))
            .min(query.limit.unwrap_or(usize::MAX));

        Ok(bounded as u64)
    }

    async fn distinct_values(
        &self,
        field: &str,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let matched = Matcher::new().filter_documents(collection_map.values(), filter.as_ref())?;
        let mut distinct: Vec<Bson> = Vec::new();

        for value in matched
            .into_iter()
            .flat_map(|doc| values_at_path(doc, field))
        {
            if !distinct.iter().any(|seen| values_equal(seen, value)) {
                distinct.push(value.clone());
            }
        }

        Ok(distinct)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        names.sort();

        Ok(names)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docpager_memory::InMemoryStore;
/// use docpager::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use docpager_core::query::Filter;
    use futures::TryStreamExt;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> InMemoryStore {
        InMemoryStore::new()
    }

    async fn seed(store: &InMemoryStore) -> Vec<Identifier> {
        store
            .insert_documents(
                vec![
                    doc! { "name": "carol", "rank": 2, "team": "red" },
                    doc! { "name": "alice", "rank": 1, "team": "blue" },
                    doc! { "name": "bob", "rank": 2, "team": "red" },
                    doc! { "name": "dave", "team": ["red", "green"] },
                ],
                "people",
            )
            .await
            .unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn test_insert_assigns_object_ids(store: InMemoryStore) {
        // Act
        let ids = seed(&store).await;

        // Assert
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| matches!(id, Identifier::ObjectId(_))));
        let docs = store.find_documents(Query::new(), "people").await.unwrap();
        assert!(docs.iter().all(|doc| doc.get_object_id("_id").is_ok()));
    }

    #[rstest]
    #[tokio::test]
    async fn test_insert_rejects_duplicate_key(store: InMemoryStore) {
        // Arrange
        let id = ObjectId::new();
        store
            .insert_documents(vec![doc! { "_id": id }], "people")
            .await
            .unwrap();

        // Act
        let result = store
            .insert_documents(vec![doc! { "_id": id }], "people")
            .await;

        // Assert
        assert!(matches!(result, Err(DocumentStoreError::DocumentAlreadyExists(_, _))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_insert_rejects_unsupported_key(store: InMemoryStore) {
        // Act
        let result = store
            .insert_documents(vec![doc! { "_id": 7 }], "people")
            .await;

        // Assert
        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_multi_key_sort_with_offset_and_limit(store: InMemoryStore) {
        // Arrange
        seed(&store).await;
        let query = Query::builder()
            .sort("rank", SortDirection::Desc)
            .sort("name", SortDirection::Asc)
            .offset(1)
            .limit(2)
            .build();

        // Act
        let names: Vec<String> = store
            .find_documents(query, "people")
            .await
            .unwrap()
            .iter()
            .map(|doc| doc.get_str("name").unwrap().to_string())
            .collect();

        // Assert
        assert_eq!(names, vec!["carol", "alice"]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_stream_matches_find(store: InMemoryStore) {
        // Arrange
        seed(&store).await;
        let query = Query::builder()
            .filter(Filter::eq("team", "red"))
            .build();

        // Act
        let streamed: Vec<Document> = store
            .stream_documents(query.clone(), "people")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let found = store.find_documents(query, "people").await.unwrap();

        // Assert
        assert_eq!(streamed.len(), 3);
        assert_eq!(streamed, found);
    }

    #[rstest]
    #[tokio::test]
    async fn test_count_honors_offset_and_limit(store: InMemoryStore) {
        // Arrange
        seed(&store).await;

        // Act
        let all = store.count_documents(&Query::new(), "people").await.unwrap();
        let bounded = store
            .count_documents(&Query::builder().offset(1).limit(2).build(), "people")
            .await
            .unwrap();
        let past_end = store
            .count_documents(&Query::builder().offset(10).build(), "people")
            .await
            .unwrap();

        // Assert
        assert_eq!((all, bounded, past_end), (4, 2, 0));
    }

    #[rstest]
    #[tokio::test]
    async fn test_distinct_spreads_arrays(store: InMemoryStore) {
        // Arrange
        seed(&store).await;

        // Act
        let mut teams = store
            .distinct_values("team", None, "people")
            .await
            .unwrap();
        teams.sort_by(compare_values);

        // Assert
        assert_eq!(
            teams,
            vec![Bson::from("blue"), Bson::from("green"), Bson::from("red")]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_sets_nested_fields(store: InMemoryStore) {
        // Arrange
        seed(&store).await;

        // Act
        let updated = store
            .update_documents(
                Some(Filter::eq("team", "red")),
                doc! { "meta.flagged": true },
                false,
                "people",
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(updated, UpdateOutcome { matched: 3, upserted: None });
        let flagged = store
            .count_documents(
                &Query::builder().filter(Filter::eq("meta.flagged", true)).build(),
                "people",
            )
            .await
            .unwrap();
        assert_eq!(flagged, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn test_upsert_inserts_from_filter_equalities(store: InMemoryStore) {
        // Arrange
        seed(&store).await;
        let filter = Filter::and([Filter::eq("name", "erin"), Filter::gt("rank", 0)]);

        // Act
        let outcome = store
            .update_documents(Some(filter), doc! { "team": "blue" }, true, "people")
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome.matched, 0);
        let id = outcome.upserted.unwrap();
        let query = Query::builder().filter(Filter::eq("_id", id.to_bson())).build();
        let docs = store.find_documents(query, "people").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("name").unwrap(), "erin");
        assert_eq!(docs[0].get_str("team").unwrap(), "blue");
        assert!(!docs[0].contains_key("rank"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_without_upsert_leaves_missing_collection_alone(store: InMemoryStore) {
        // Act
        let outcome = store
            .update_documents(None, doc! { "x": 1 }, false, "ghosts")
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome, UpdateOutcome::default());
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_replace_keeps_key_and_returns_previous(store: InMemoryStore) {
        // Arrange
        let ids = seed(&store).await;

        // Act
        let replaced = store
            .replace_document(ids[1], doc! { "name": "alicia" }, false, "people")
            .await
            .unwrap();
        let inserted = store
            .replace_document(Identifier::new(), doc! { "name": "frank" }, true, "people")
            .await
            .unwrap();
        let missing = store
            .replace_document(Identifier::new(), doc! { "name": "gina" }, false, "people")
            .await
            .unwrap();

        // Assert
        let Replaced::Existing(previous) = replaced else {
            panic!("expected the previous document");
        };
        assert_eq!(previous.get_str("name").unwrap(), "alice");
        assert_eq!(inserted, Replaced::Inserted);
        assert_eq!(missing, Replaced::Missing);
        let query = Query::builder().filter(Filter::eq("_id", ids[1].to_bson())).build();
        let current = store.find_documents(query, "people").await.unwrap();
        assert_eq!(current[0], doc! { "name": "alicia", "_id": ids[1].to_bson() });
        assert_eq!(store.count_documents(&Query::new(), "people").await.unwrap(), 5);
    }

    #[rstest]
    #[tokio::test]
    async fn test_replace_rejects_conflicting_key(store: InMemoryStore) {
        // Arrange
        let ids = seed(&store).await;

        // Act
        let result = store
            .replace_document(ids[0], doc! { "_id": ids[1].to_bson() }, true, "people")
            .await;

        // Assert
        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_delete_by_filter(store: InMemoryStore) {
        // Arrange
        seed(&store).await;

        // Act
        let deleted = store
            .delete_documents(Some(Filter::lt("rank", 2)), "people")
            .await
            .unwrap();

        // Assert
        assert_eq!(deleted, 1);
        assert_eq!(store.count_documents(&Query::new(), "people").await.unwrap(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn test_missing_collection_reads_empty(store: InMemoryStore) {
        // Act
        let docs = store.find_documents(Query::new(), "ghosts").await.unwrap();
        let count = store.count_documents(&Query::new(), "ghosts").await.unwrap();
        let dropped = store.drop_collection("ghosts").await;

        // Assert
        assert!(docs.is_empty());
        assert_eq!(count, 0);
        assert!(matches!(dropped, Err(DocumentStoreError::CollectionNotFound(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_collections_lifecycle(store: InMemoryStore) {
        // Arrange
        store.create_collection("b").await.unwrap();
        store.create_collection("a").await.unwrap();
        store.create_collection("a").await.unwrap();

        // Act
        let before = store.list_collections().await.unwrap();
        store.drop_collection("a").await.unwrap();
        let after = store.list_collections().await.unwrap();

        // Assert
        assert_eq!(before, vec!["a", "b"]);
        assert_eq!(after, vec!["b"]);
    }
}
