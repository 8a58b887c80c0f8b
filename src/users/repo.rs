use std::sync::Arc;

use tracing::debug;

use super::{repo_types::User, UserError};
use crate::store::{DocumentStore, Filter, ObjectId, StoreError, TxnOptions, Write};

/// User-shaped view over a generic document store.
#[derive(Clone)]
pub struct UserRepo {
    store: Arc<dyn DocumentStore<User>>,
}

impl UserRepo {
    pub fn new(store: Arc<dyn DocumentStore<User>>) -> Self {
        Self { store }
    }

    pub async fn find_all(&self) -> Result<Vec<User>, UserError> {
        Ok(self.store.find(&Filter::all()).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User, UserError> {
        let mut found = self.store.find(&Filter::eq("email", email)).await?;
        if found.len() > 1 {
            debug!(email = %email, count = found.len(), "email matched several users");
        }
        if found.is_empty() {
            return Err(UserError::NotFound(email.to_string()));
        }
        Ok(found.swap_remove(0))
    }

    /// Malformed identifiers are `InvalidId`, distinct from a miss.
    pub async fn find_by_id(&self, id: &str) -> Result<User, UserError> {
        let oid: ObjectId = id.parse()?;
        self.store
            .find_by_id(&oid)
            .await?
            .ok_or_else(|| UserError::NotFound(id.to_string()))
    }

    pub async fn insert(&self, user: &User) -> Result<ObjectId, UserError> {
        Ok(self.store.insert(user).await?)
    }

    pub async fn replace_by_id(&self, id: &ObjectId, user: &User) -> Result<(), UserError> {
        self.store
            .replace_by_id(id, user)
            .await
            .map_err(|e| not_found_or(e, id.to_string()))
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<(), UserError> {
        let oid: ObjectId = id.parse()?;
        self.store
            .delete_by_id(&oid)
            .await
            .map_err(|e| not_found_or(e, id.to_string()))
    }

    pub async fn run_atomic(&self, opts: &TxnOptions, writes: Vec<Write<User>>) -> Result<(), UserError> {
        self.store.run_atomic(opts, writes).await.map_err(|e| match e {
            StoreError::Unavailable(msg) => UserError::BackendUnavailable(msg),
            StoreError::Aborted(msg) => UserError::TransactionAborted(msg),
            other => UserError::TransactionAborted(other.to_string()),
        })
    }

    pub async fn ping(&self) -> Result<(), UserError> {
        self.store
            .ping()
            .await
            .map_err(|e| UserError::BackendUnavailable(e.to_string()))
    }
}

fn not_found_or(e: StoreError, key: String) -> UserError {
    match e {
        StoreError::NotFound => UserError::NotFound(key),
        other => other.into(),
    }
}
