//! Document persistence: a generic repository over JSON documents, with a
//! Postgres (JSONB) backend and an in-memory backend sharing one contract.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

pub mod id;
pub mod memory;
pub mod postgres;
pub mod transaction;

pub use id::{ObjectId, ParseObjectIdError};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use transaction::{ReadConcern, TransactionCoordinator, TxnOptions, Write, WriteConcern};

/// A record that can live in a collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Collection (table) name. Must be a plain SQL identifier.
    const COLLECTION: &'static str;
    /// Top-level fields whose values must be unique across the collection.
    const UNIQUE_FIELDS: &'static [&'static str] = &[];

    fn id(&self) -> ObjectId;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("duplicate value for unique field `{0}`")]
    Duplicate(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("transaction aborted: {0}")]
    Aborted(String),
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Conjunction of top-level field equalities. The empty filter matches every
/// document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Map<String, Value>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// JSON object every matching document contains.
    pub fn as_document(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

/// Typed CRUD capability over one collection.
#[async_trait]
pub trait Repository<T: Document>: Send + Sync {
    async fn find(&self, filter: &Filter) -> Result<Vec<T>, StoreError>;
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<T>, StoreError>;
    async fn insert(&self, doc: &T) -> Result<ObjectId, StoreError>;
    /// Full-document replace. `NotFound` when no document has `id`.
    async fn replace_by_id(&self, id: &ObjectId, doc: &T) -> Result<(), StoreError>;
    /// `NotFound` when no document has `id`.
    async fn delete_by_id(&self, id: &ObjectId) -> Result<(), StoreError>;
    /// Liveness probe against the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Everything a service needs from a backend: plain CRUD plus atomic units.
pub trait DocumentStore<T: Document>: Repository<T> + TransactionCoordinator<T> {}

impl<T, S> DocumentStore<T> for S
where
    T: Document,
    S: Repository<T> + TransactionCoordinator<T>,
{
}
