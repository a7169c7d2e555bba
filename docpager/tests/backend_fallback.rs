use async_trait::async_trait;
use bson::{Bson, Document, doc};
use docpager::{
    DocumentStore, DocumentStoreError, DocumentStoreResult, Identifier, PageRequest,
    backend::{DocumentStream, Replaced, StoreBackend, UpdateOutcome},
    memory::InMemoryStore,
    query::{Expr, Query},
};
use rstest::rstest;

/// A backend that can only count whole result sets.
#[derive(Debug, Default)]
struct UnboundedCounts {
    inner: InMemoryStore,
}

#[async_trait]
impl StoreBackend for UnboundedCounts {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<Vec<Identifier>> {
        self.inner.insert_documents(documents, collection).await
    }

    async fn update_documents(
        &self,
        filter: Option<Expr>,
        set: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.inner.update_documents(filter, set, upsert, collection).await
    }

    async fn replace_document(
        &self,
        id: Identifier,
        document: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Replaced> {
        self.inner.replace_document(id, document, upsert, collection).await
    }

    async fn delete_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        self.inner.delete_documents(filter, collection).await
    }

    async fn stream_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        self.inner.stream_documents(query, collection).await
    }

    async fn count_documents(&self, query: &Query, collection: &str) -> DocumentStoreResult<u64> {
        if query.limit.is_some() || query.offset.is_some() {
            return Err(DocumentStoreError::Unsupported("bounded count".to_string()));
        }
        self.inner.count_documents(query, collection).await
    }

    async fn distinct_values(&self, field: &str, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        self.inner.distinct_values(field, filter, collection).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.inner.create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.inner.drop_collection(name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.inner.list_collections().await
    }
}

#[rstest]
#[tokio::test]
async fn test_lookahead_falls_back_to_unbounded_counts() {
    // Arrange
    let store = DocumentStore::new(UnboundedCounts::default());
    let logs = store.collection("logs");
    logs.insert((1..=6).map(|n| doc! { "n": n }).collect())
        .await
        .unwrap();

    // Act
    let first = logs.paginate(PageRequest::new().limit(3)).await.unwrap();
    let second = logs
        .paginate(PageRequest::new().limit(3).after(first.after().unwrap()))
        .await
        .unwrap();

    // Assert
    assert_eq!(first.data.len(), 3);
    assert_eq!(second.data.len(), 3);
    assert!(second.after().is_none());
    assert!(second.before().is_some());
}

#[rstest]
#[tokio::test]
async fn test_bounded_result_count_is_clamped() {
    // Arrange
    let backend = UnboundedCounts::default();
    backend
        .insert_documents((1..=6).map(|n| doc! { "n": n }).collect(), "logs")
        .await
        .unwrap();
    let store = DocumentStore::new(backend);

    // Act
    let count = store
        .collection("logs")
        .query(Query::builder().offset(4).limit(5).build())
        .count()
        .await
        .unwrap();

    // Assert
    assert_eq!(count, 2);
}
