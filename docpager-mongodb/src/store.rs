use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind},
    options::ClientOptions,
};
use std::env;
use tracing::{debug, trace};

use docpager_core::{
    backend::{
        DocumentStream, PRIMARY_KEY, Replaced, StoreBackend, StoreBackendBuilder, UpdateOutcome, assign_primary_key,
        bind_primary_key, ensure_distinct_keys,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    query::{Expr, Query},
};

use crate::query::MongoQueryTranslator;

/// Server error code for creating a collection that already exists.
const NAMESPACE_EXISTS: i32 = 48;
/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

fn backend_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

/// The batch position and code of the first write an insert failed on.
fn first_write_failure(err: &MongoError) -> Option<(usize, i32)> {
    match err.kind.as_ref() {
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()?
            .iter()
            .min_by_key(|write| write.index)
            .map(|write| (write.index, write.code)),
        _ => None,
    }
}

fn id_list(ids: &[Identifier]) -> Vec<Bson> {
    ids.iter().map(Identifier::to_bson).collect()
}

/// A document store backend over a MongoDB database.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(
        &self,
        mut documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Identifier>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let ids = documents
            .iter_mut()
            .map(assign_primary_key)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        ensure_distinct_keys(&ids, collection)?;

        let taken = self
            .get_collection(collection)
            .find_one(doc! { PRIMARY_KEY: { "$in": id_list(&ids) } })
            .await
            .map_err(backend_error)?;
        if let Some(existing) = taken {
            let id = existing
                .get(PRIMARY_KEY)
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(DocumentStoreError::DocumentAlreadyExists(id, collection.to_string()));
        }

        // Ordered inserts stop at the first failed write, so the documents before it are
        // exactly the ones this call wrote.
        if let Err(err) = self.get_collection(collection).insert_many(documents).await {
            let Some((index, code)) = first_write_failure(&err).filter(|(index, _)| *index < ids.len()) else {
                return Err(backend_error(err));
            };

            self.get_collection(collection)
                .delete_many(doc! { PRIMARY_KEY: { "$in": id_list(&ids[..index]) } })
                .await
                .map_err(backend_error)?;
            debug!(collection, rolled_back = index, code, "insert failed part way, removed written documents");

            if code == DUPLICATE_KEY {
                return Err(DocumentStoreError::DocumentAlreadyExists(
                    ids[index].to_string(),
                    collection.to_string(),
                ));
            }
            return Err(backend_error(err));
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

        let result = self
            .get_collection(collection)
            .update_many(
                MongoQueryTranslator::translate(filter.as_ref())?,
                doc! { "$set": set },
            )
            .upsert(upsert)
            .await
            .map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            upserted: result
                .upserted_id
                .as_ref()
                .and_then(Identifier::from_bson),
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

        let previous = self
            .get_collection(collection)
            .find_one_and_replace(doc! { PRIMARY_KEY: id.to_bson() }, document)
            .upsert(upsert)
            .await
            .map_err(backend_error)?;

        Ok(match previous {
            Some(previous) => Replaced::Existing(previous),
            None if upsert => Replaced::Inserted,
            None => Replaced::Missing,
        })
    }

    async fn delete_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let result = self
            .get_collection(collection)
            .delete_many(MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(backend_error)?;

        debug!(collection, deleted = result.deleted_count, "deleted documents");
        Ok(result.deleted_count)
    }

    async fn stream_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<DocumentStream> {
        let filter = MongoQueryTranslator::translate(query.filter.as_ref())?;
        trace!(collection, %filter, "mongodb find");

        let coll = self.get_collection(collection);
        let mut find = coll.find(filter);
        if let Some(sort) = MongoQueryTranslator::sort(&query.sort) {
            find = find.sort(sort);
        }
        if let Some(skip) = query.offset {
            find = find.skip(skip as u64);
        }
        if let Some(limit) = query.limit {
            find = find.limit(limit as i64);
        }

        let cursor = find.await.map_err(backend_error)?;
        Ok(cursor.map_err(backend_error).boxed())
    }

    async fn count_documents(&self, query: &Query, collection: &str) -> DocumentStoreResult<u64> {
        let filter = MongoQueryTranslator::translate(query.filter.as_ref())?;

        let coll = self.get_collection(collection);
        let mut count = coll.count_documents(filter);
        if let Some(skip) = query.offset {
            count = count.skip(skip as u64);
        }
        if let Some(limit) = query.limit {
            count = count.limit(limit as u64);
        }

        count.await.map_err(backend_error)
    }

    async fn distinct_values(
        &self,
        field: &str,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.get_collection(collection)
            .distinct(field, MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(backend_error)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        match self
            .client
            .database(&self.database)
            .create_collection(name)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => match err.kind.as_ref() {
                ErrorKind::Command(command) if command.code == NAMESPACE_EXISTS => Ok(()),
                _ => Err(backend_error(err)),
            },
        }
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        if !self.list_collections().await?.iter().any(|existing| existing == name) {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)?;
        names.sort();

        Ok(names)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Builds a [`MongoDbStore`] from a connection string and database name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }

    /// Reads connection settings from the process environment.
    ///
    /// `MONGO_URI` wins when set. Otherwise the DSN is composed from `MONGO_HOST`
    /// (default `127.0.0.1`), `MONGO_PORT` (default `27017`) and `MONGO_REPLICA_SET`.
    /// The database always comes from `MONGO_DB`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] when `MONGO_DB` is unset or empty.
    pub fn from_env() -> DocumentStoreResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DocumentStoreResult<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let database = var("MONGO_DB")
            .ok_or_else(|| DocumentStoreError::Configuration("MONGO_DB is not set".to_string()))?;

        let dsn = match var("MONGO_URI") {
            Some(uri) => uri,
            None => {
                let host = var("MONGO_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
                let port = var("MONGO_PORT").unwrap_or_else(|| "27017".to_string());
                let mut dsn = format!("mongodb://{host}:{port}/{database}");
                if let Some(replica_set) = var("MONGO_REPLICA_SET") {
                    dsn.push_str("?replicaSet=");
                    dsn.push_str(&replica_set);
                }
                dsn
            }
        };

        Ok(Self { dsn, database })
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        let client = Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        Ok(MongoDbStore::new(client, self.database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[rstest]
    #[case(&[("MONGO_DB", "app")], "mongodb://127.0.0.1:27017/app")]
    #[case(
        &[("MONGO_DB", "app"), ("MONGO_HOST", "db"), ("MONGO_PORT", "27018"), ("MONGO_REPLICA_SET", "rs0")],
        "mongodb://db:27018/app?replicaSet=rs0"
    )]
    #[case(&[("MONGO_DB", "app"), ("MONGO_URI", "mongodb://elsewhere/x")], "mongodb://elsewhere/x")]
    fn test_builder_from_environment(#[case] vars: &[(&str, &str)], #[case] expected: &str) {
        // Act
        let builder = MongoDbStoreBuilder::from_lookup(lookup(vars)).unwrap();

        // Assert
        assert_eq!(builder.dsn(), expected);
        assert_eq!(builder.database, "app");
    }

    #[rstest]
    fn test_builder_requires_database() {
        // Act
        let result = MongoDbStoreBuilder::from_lookup(lookup(&[("MONGO_URI", "mongodb://x")]));

        // Assert
        assert!(matches!(result, Err(DocumentStoreError::Configuration(_))));
    }
}
