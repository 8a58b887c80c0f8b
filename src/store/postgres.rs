use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{types::Json, PgConnection, PgPool};
use tracing::{debug, error, warn};

use super::{
    Document, Filter, ObjectId, ReadConcern, Repository, StoreError, TransactionCoordinator,
    TxnOptions, Write, WriteConcern,
};

/// One table per collection: `(id TEXT PRIMARY KEY, doc JSONB NOT NULL)`.
pub struct PgDocumentStore<T> {
    db: PgPool,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for PgDocumentStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Document> PgDocumentStore<T> {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }
}

fn select_sql(collection: &str) -> String {
    format!("SELECT doc FROM {collection} WHERE doc @> $1 ORDER BY id")
}

fn select_by_id_sql(collection: &str) -> String {
    format!("SELECT doc FROM {collection} WHERE id = $1")
}

fn insert_sql(collection: &str) -> String {
    format!("INSERT INTO {collection} (id, doc) VALUES ($1, $2)")
}

fn replace_sql(collection: &str) -> String {
    format!("UPDATE {collection} SET doc = $2 WHERE id = $1")
}

fn delete_sql(collection: &str) -> String {
    format!("DELETE FROM {collection} WHERE id = $1")
}

fn isolation_sql(read: ReadConcern) -> &'static str {
    match read {
        ReadConcern::Local => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
        ReadConcern::Snapshot => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
    }
}

fn commit_sql(write: WriteConcern) -> &'static str {
    match write {
        WriteConcern::Acknowledged => "SET LOCAL synchronous_commit TO local",
        WriteConcern::Majority => "SET LOCAL synchronous_commit TO remote_apply",
    }
}

/// `users_email_key` -> `email`, `users_pkey` -> `id`.
fn field_from_constraint(constraint: &str) -> String {
    if constraint.ends_with("_pkey") {
        return "id".into();
    }
    let trimmed = constraint.strip_suffix("_key").unwrap_or(constraint);
    match trimmed.split_once('_') {
        Some((_table, field)) => field.to_string(),
        None => trimmed.to_string(),
    }
}

/// Maps unique violations onto `Duplicate`, naming the offending field.
fn classify(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            let field = field_from_constraint(db_err.constraint().unwrap_or("unknown"));
            return StoreError::Duplicate(field);
        }
    }
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other),
    }
}

/// Serialization failures and deadlocks are worth retrying as a whole unit.
fn is_transient(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .map(|code| code == "40001" || code == "40P01")
        .unwrap_or(false)
}

async fn apply<T: Document>(conn: &mut PgConnection, write: &Write<T>) -> Result<(), sqlx::Error> {
    match write {
        Write::Insert(doc) => {
            sqlx::query(&insert_sql(T::COLLECTION))
                .bind(doc.id().to_hex())
                .bind(Json(doc))
                .execute(&mut *conn)
                .await?;
        }
        Write::Replace(id, doc) => {
            let res = sqlx::query(&replace_sql(T::COLLECTION))
                .bind(id.to_hex())
                .bind(Json(doc))
                .execute(&mut *conn)
                .await?;
            if res.rows_affected() == 0 {
                return Err(sqlx::Error::RowNotFound);
            }
        }
        Write::Delete(id) => {
            let res = sqlx::query(&delete_sql(T::COLLECTION))
                .bind(id.to_hex())
                .execute(&mut *conn)
                .await?;
            if res.rows_affected() == 0 {
                return Err(sqlx::Error::RowNotFound);
            }
        }
    }
    Ok(())
}

impl<T: Document> PgDocumentStore<T> {
    async fn write_one(&self, write: &Write<T>) -> Result<(), StoreError> {
        let mut conn = self.db.acquire().await.map_err(classify)?;
        apply(&mut conn, write).await.map_err(|e| match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => classify(other),
        })
    }

    /// One attempt at the unit. The transaction rolls back on every early
    /// return, including when this future is dropped mid-flight.
    async fn attempt(&self, opts: &TxnOptions, writes: &[Write<T>]) -> Result<(), sqlx::Error> {
        let mut tx = self.db.begin().await?;
        sqlx::query(isolation_sql(opts.read_concern))
            .execute(&mut *tx)
            .await?;
        sqlx::query(commit_sql(opts.write_concern))
            .execute(&mut *tx)
            .await?;

        for (index, write) in writes.iter().enumerate() {
            if let Err(e) = apply(&mut tx, write).await {
                debug!(collection = T::COLLECTION, index, error = %e, "rolling back");
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "explicit rollback failed; connection will discard it");
                }
                return Err(e);
            }
        }
        tx.commit().await
    }
}

#[async_trait]
impl<T: Document> Repository<T> for PgDocumentStore<T> {
    async fn find(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let rows = sqlx::query_as::<_, (Json<T>,)>(&select_sql(T::COLLECTION))
            .bind(Json(filter.as_document()))
            .fetch_all(&self.db)
            .await
            .map_err(classify)?;
        debug!(collection = T::COLLECTION, count = rows.len(), "find");
        Ok(rows.into_iter().map(|(Json(doc),)| doc).collect())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<T>, StoreError> {
        let row = sqlx::query_as::<_, (Json<T>,)>(&select_by_id_sql(T::COLLECTION))
            .bind(id.to_hex())
            .fetch_optional(&self.db)
            .await
            .map_err(classify)?;
        Ok(row.map(|(Json(doc),)| doc))
    }

    async fn insert(&self, doc: &T) -> Result<ObjectId, StoreError> {
        self.write_one(&Write::Insert(doc.clone())).await?;
        Ok(doc.id())
    }

    async fn replace_by_id(&self, id: &ObjectId, doc: &T) -> Result<(), StoreError> {
        self.write_one(&Write::Replace(*id, doc.clone())).await
    }

    async fn delete_by_id(&self, id: &ObjectId) -> Result<(), StoreError> {
        self.write_one(&Write::Delete(*id)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.db)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl<T: Document> TransactionCoordinator<T> for PgDocumentStore<T> {
    async fn run_atomic(&self, opts: &TxnOptions, writes: Vec<Write<T>>) -> Result<(), StoreError> {
        let attempts = opts.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(opts, &writes).await {
                Ok(()) => {
                    debug!(collection = T::COLLECTION, writes = writes.len(), attempt, "transaction committed");
                    return Ok(());
                }
                Err(e) if is_transient(&e) && attempt < attempts => {
                    warn!(collection = T::COLLECTION, attempt, error = %e, "transient conflict, retrying unit");
                    attempt += 1;
                }
                Err(e) => {
                    error!(collection = T::COLLECTION, attempt, error = %e, "transaction aborted");
                    return Err(StoreError::Aborted(classify(e).to_string()));
                }
            }
        }
    }
}
