use std::{
    collections::BTreeMap,
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{
    Document, Filter, ObjectId, Repository, StoreError, TransactionCoordinator, TxnOptions, Write,
};

type Collection = BTreeMap<ObjectId, Value>;

/// Process-local document store. Clones share the same collection.
///
/// Documents are kept in their serialized form so reads go through the same
/// JSON round-trip as the Postgres backend.
pub struct MemoryStore<T> {
    docs: Arc<RwLock<Collection>>,
    online: Arc<AtomicBool>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            docs: Arc::clone(&self.docs),
            online: Arc::clone(&self.online),
            _record: PhantomData,
        }
    }
}

impl<T: Document> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            docs: Arc::new(RwLock::new(BTreeMap::new())),
            online: Arc::new(AtomicBool::new(true)),
            _record: PhantomData,
        }
    }

    /// Simulates losing (or regaining) the backend. While offline every
    /// operation fails with `Unavailable`.
    #[cfg(test)]
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.docs.read().map(|docs| docs.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".into()))
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collection>, StoreError> {
        self.check_online()?;
        self.docs
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collection>, StoreError> {
        self.check_online()?;
        self.docs
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

fn check_unique<T: Document>(
    docs: &Collection,
    id: &ObjectId,
    doc: &Value,
) -> Result<(), StoreError> {
    for field in T::UNIQUE_FIELDS {
        let Some(value) = doc.get(*field) else {
            continue;
        };
        let taken = docs
            .iter()
            .any(|(other_id, other)| other_id != id && other.get(*field) == Some(value));
        if taken {
            return Err(StoreError::Duplicate((*field).to_string()));
        }
    }
    Ok(())
}

fn apply<T: Document>(docs: &mut Collection, write: &Write<T>) -> Result<(), StoreError> {
    match write {
        Write::Insert(doc) => {
            let id = doc.id();
            if docs.contains_key(&id) {
                return Err(StoreError::Duplicate("id".into()));
            }
            let value = serde_json::to_value(doc)?;
            check_unique::<T>(docs, &id, &value)?;
            docs.insert(id, value);
        }
        Write::Replace(id, doc) => {
            if !docs.contains_key(id) {
                return Err(StoreError::NotFound);
            }
            let value = serde_json::to_value(doc)?;
            check_unique::<T>(docs, id, &value)?;
            docs.insert(*id, value);
        }
        Write::Delete(id) => {
            docs.remove(id).ok_or(StoreError::NotFound)?;
        }
    }
    Ok(())
}

#[async_trait]
impl<T: Document> Repository<T> for MemoryStore<T> {
    async fn find(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let docs = self.read()?;
        docs.values()
            .filter(|doc| filter.matches(doc))
            .map(|doc| serde_json::from_value(doc.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<T>, StoreError> {
        let docs = self.read()?;
        docs.get(id)
            .map(|doc| serde_json::from_value(doc.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn insert(&self, doc: &T) -> Result<ObjectId, StoreError> {
        let mut docs = self.write()?;
        apply(&mut docs, &Write::Insert(doc.clone()))?;
        Ok(doc.id())
    }

    async fn replace_by_id(&self, id: &ObjectId, doc: &T) -> Result<(), StoreError> {
        let mut docs = self.write()?;
        apply(&mut docs, &Write::Replace(*id, doc.clone()))
    }

    async fn delete_by_id(&self, id: &ObjectId) -> Result<(), StoreError> {
        let mut docs = self.write()?;
        apply::<T>(&mut docs, &Write::Delete(*id))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }
}

#[async_trait]
impl<T: Document> TransactionCoordinator<T> for MemoryStore<T> {
    async fn run_atomic(&self, _opts: &TxnOptions, writes: Vec<Write<T>>) -> Result<(), StoreError> {
        // Holding the write lock for the whole unit gives snapshot reads and
        // serial commits.
        let mut docs = self.write()?;
        let mut staged = docs.clone();
        for (index, write) in writes.iter().enumerate() {
            if let Err(e) = apply(&mut staged, write) {
                debug!(collection = T::COLLECTION, index, error = %e, "memory transaction rolled back");
                return Err(StoreError::Aborted(e.to_string()));
            }
        }
        *docs = staged;
        debug!(collection = T::COLLECTION, writes = writes.len(), "memory transaction committed");
        Ok(())
    }
}
