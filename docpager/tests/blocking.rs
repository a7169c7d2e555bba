use bson::doc;
use docpager::{DocumentStore, DocumentStoreError, PageRequest, blocking::BlockingStore, memory::InMemoryStore};
use rstest::{fixture, rstest};

#[fixture]
fn store() -> BlockingStore<InMemoryStore> {
    let store = BlockingStore::new(DocumentStore::new(InMemoryStore::new()).with_default_collection("events")).unwrap();
    let docs = (1..=7)
        .map(|n| {
            let kind = if n % 2 == 0 { "even" } else { "odd" };
            doc! { "n": n, "kind": kind }
        })
        .collect();
    store.insert(None, docs).unwrap();
    store
}

#[rstest]
fn test_blocking_pages_match_async_semantics(store: BlockingStore<InMemoryStore>) {
    // Act
    let first = store.paginate(None, PageRequest::new().limit(4)).unwrap();
    let second = store
        .paginate(None, PageRequest::new().limit(4).after(first.after().unwrap()))
        .unwrap();

    // Assert
    assert_eq!(first.data.len(), 4);
    assert_eq!(second.data.len(), 3);
    assert!(second.after().is_none());
    assert_eq!(first.details.total, 7);
}

#[rstest]
fn test_blocking_counts_and_lists(store: BlockingStore<InMemoryStore>) {
    // Act
    let odd = store.count(None, doc! { "kind": "odd" }).unwrap();
    let evens = store.list(None, doc! { "kind": "even" }).unwrap();
    let kinds = store.distinct(None, "kind", doc! {}).unwrap();
    let removed = store.delete(None, doc! { "n": { "$gt": 5 } }).unwrap();

    // Assert
    assert_eq!(odd, 4);
    assert_eq!(evens.len(), 3);
    assert_eq!(kinds, vec![bson::Bson::from("even"), bson::Bson::from("odd")]);
    assert_eq!(removed, 2);
    assert_eq!(store.count(Some("events"), doc! {}).unwrap(), 5);
}

#[rstest]
fn test_blocking_get_by_identifier(store: BlockingStore<InMemoryStore>) {
    // Arrange
    let ids = store.insert(Some("other"), vec![doc! { "name": "solo" }]).unwrap();

    // Act
    let found = store.get(Some("other"), ids[0]).unwrap();
    let missing_default = BlockingStore::new(DocumentStore::new(InMemoryStore::new()))
        .unwrap()
        .count(None, doc! {});

    // Assert
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_str("name").unwrap(), "solo");
    assert!(matches!(missing_default, Err(DocumentStoreError::Configuration(_))));
}

#[rstest]
fn test_blocking_writes(store: BlockingStore<InMemoryStore>) {
    // Arrange
    let ids = store.insert(None, vec![doc! { "n": 100, "kind": "big" }]).unwrap();

    // Act
    let touched = store.update(None, doc! { "kind": "odd" }, doc! { "seen": true }).unwrap();
    let previous = store
        .put(None, doc! { "_id": ids[0].to_bson(), "n": 101 })
        .unwrap();
    let archived = store.soft_delete(None, doc! { "seen": true }).unwrap();

    // Assert
    assert_eq!(touched, 4);
    assert_eq!(previous.unwrap().get_i32("n").unwrap(), 100);
    assert_eq!(archived, 4);
    assert_eq!(store.count(None, doc! {}).unwrap(), 4);
    assert_eq!(store.count(Some("deleted.events"), doc! {}).unwrap(), 4);
}
