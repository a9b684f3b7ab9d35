//! Document store seam
//!
//! [`BookStore`] lists exactly the collection operations the ingester and
//! the query helpers use. Filters, projections, sorts and pipelines are
//! MongoDB-syntax BSON documents.
//!
//! Two implementations exist:
//!
//! - [`MongoStore`]: a blocking MongoDB collection
//! - [`MemoryStore`]: an in-process collection evaluating the subset of the
//!   query language this crate issues. It has no bulk-update operation.

use mongodb::bson::{Bson, Document};
use thiserror::Error;

pub mod matcher;
pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("unsupported by the in-memory store: {0}")]
    Unsupported(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Streamed query results
pub type DocumentIter<'a> = Box<dyn Iterator<Item = StoreResult<Document>> + 'a>;

/// Options for [`BookStore::find`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
}

impl FindSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Store-reported result of an unordered insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub attempted: usize,
    pub inserted: usize,
}

impl InsertOutcome {
    pub fn failed(&self) -> usize {
        self.attempted.saturating_sub(self.inserted)
    }
}

/// The collection operations this crate consumes
pub trait BookStore {
    /// `database.collection`, for log lines
    fn namespace(&self) -> String;

    /// Check the store is reachable.
    fn ping(&self) -> StoreResult<()>;

    /// Insert without ordering so one rejected document does not block the
    /// rest. Per-document rejections are reported in the outcome, not as
    /// errors.
    fn insert_many_unordered(&self, docs: &[Document]) -> StoreResult<InsertOutcome>;

    /// Returns the number of deleted documents.
    fn delete_many(&self, filter: Document) -> StoreResult<u64>;

    fn distinct(&self, field: &str, filter: Document) -> StoreResult<Vec<Bson>>;

    fn find(&self, filter: Document, spec: FindSpec) -> StoreResult<DocumentIter<'_>>;

    fn find_one(&self, filter: Document, projection: Option<Document>) -> StoreResult<Option<Document>> {
        let spec = FindSpec {
            projection,
            sort: None,
            limit: Some(1),
        };
        self.find(filter, spec)?.next().transpose()
    }

    /// Returns the number of modified documents (0 or 1).
    fn update_one(&self, filter: Document, update: Document) -> StoreResult<u64>;

    fn aggregate(&self, pipeline: Vec<Document>) -> StoreResult<DocumentIter<'_>>;

    fn create_index(&self, keys: Document) -> StoreResult<()>;

    /// Key documents of every index on the collection
    fn list_index_keys(&self) -> StoreResult<Vec<Document>>;

    fn count_documents(&self, filter: Document) -> StoreResult<u64>;

    fn drop_collection(&self) -> StoreResult<()>;
}
