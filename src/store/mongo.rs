use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{FindOptions, InsertManyOptions};
use mongodb::sync::{Client, Collection};
use mongodb::IndexModel;
use tracing::{debug, warn};

use super::{BookStore, DocumentIter, FindSpec, InsertOutcome, StoreError, StoreResult};
use crate::config::StoreConfig;

/// A blocking MongoDB collection
pub struct MongoStore {
    client: Client,
    collection: Collection<Document>,
    namespace: String,
}

impl MongoStore {
    /// Connect and ping, so an unreachable server fails here rather than
    /// on the first write.
    pub fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let client = Client::with_uri_str(config.connection_uri())?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        let store = Self {
            client,
            collection,
            namespace: format!("{}.{}", config.database, config.collection),
        };
        store.ping()?;
        debug!(namespace = %store.namespace, "connected");
        Ok(store)
    }
}

impl BookStore for MongoStore {
    fn namespace(&self) -> String {
        self.namespace.clone()
    }

    fn ping(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! {"ping": 1}, None)?;
        Ok(())
    }

    fn insert_many_unordered(&self, docs: &[Document]) -> StoreResult<InsertOutcome> {
        let attempted = docs.len();
        if attempted == 0 {
            return Ok(InsertOutcome::default());
        }

        let mut options = InsertManyOptions::default();
        options.ordered = Some(false);

        match self.collection.insert_many(docs, options) {
            Ok(result) => Ok(InsertOutcome {
                attempted,
                inserted: result.inserted_ids.len(),
            }),
            Err(err) => {
                if let ErrorKind::BulkWrite(failure) = err.kind.as_ref() {
                    let rejected = failure.write_errors.as_ref().map_or(0, Vec::len);
                    if let Some(first) = failure.write_errors.as_ref().and_then(|e| e.first()) {
                        warn!(
                            rejected,
                            code = first.code,
                            message = %first.message,
                            "batch partially rejected"
                        );
                    }
                    return Ok(InsertOutcome {
                        attempted,
                        inserted: attempted.saturating_sub(rejected),
                    });
                }
                Err(err.into())
            }
        }
    }

    fn delete_many(&self, filter: Document) -> StoreResult<u64> {
        Ok(self.collection.delete_many(filter, None)?.deleted_count)
    }

    fn distinct(&self, field: &str, filter: Document) -> StoreResult<Vec<Bson>> {
        Ok(self.collection.distinct(field, filter, None)?)
    }

    fn find(&self, filter: Document, spec: FindSpec) -> StoreResult<DocumentIter<'_>> {
        let mut options = FindOptions::default();
        options.projection = spec.projection;
        options.sort = spec.sort;
        options.limit = spec.limit;

        let cursor = self.collection.find(filter, options)?;
        Ok(Box::new(cursor.map(|doc| doc.map_err(StoreError::from))))
    }

    fn update_one(&self, filter: Document, update: Document) -> StoreResult<u64> {
        Ok(self.collection.update_one(filter, update, None)?.modified_count)
    }

    fn aggregate(&self, pipeline: Vec<Document>) -> StoreResult<DocumentIter<'_>> {
        let cursor = self.collection.aggregate(pipeline, None)?;
        Ok(Box::new(cursor.map(|doc| doc.map_err(StoreError::from))))
    }

    fn create_index(&self, keys: Document) -> StoreResult<()> {
        let model = IndexModel::builder().keys(keys).build();
        self.collection.create_index(model, None)?;
        Ok(())
    }

    fn list_index_keys(&self) -> StoreResult<Vec<Document>> {
        let mut keys = Vec::new();
        for model in self.collection.list_indexes(None)? {
            keys.push(model?.keys);
        }
        Ok(keys)
    }

    fn count_documents(&self, filter: Document) -> StoreResult<u64> {
        Ok(self.collection.count_documents(filter, None)?)
    }

    fn drop_collection(&self) -> StoreResult<()> {
        self.collection.drop(None)?;
        Ok(())
    }
}
