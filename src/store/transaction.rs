use async_trait::async_trait;

use super::{Document, ObjectId, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteConcern {
    /// Acknowledged by the node that took the write.
    #[allow(dead_code)]
    Acknowledged,
    /// Acknowledged once replicated to a majority of nodes.
    Majority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConcern {
    #[allow(dead_code)]
    Local,
    /// Every read in the unit sees one point-in-time view.
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnOptions {
    pub write_concern: WriteConcern,
    pub read_concern: ReadConcern,
    /// Whole-unit attempts on transient conflicts. Individual writes are never
    /// retried on their own.
    pub max_attempts: u32,
}

impl TxnOptions {
    pub fn majority_snapshot() -> Self {
        Self {
            write_concern: WriteConcern::Majority,
            read_concern: ReadConcern::Snapshot,
            max_attempts: 3,
        }
    }
}

impl Default for TxnOptions {
    fn default() -> Self {
        Self::majority_snapshot()
    }
}

#[derive(Debug, Clone)]
pub enum Write<T> {
    Insert(T),
    Replace(ObjectId, T),
    Delete(ObjectId),
}

/// Runs a sequence of writes as one all-or-nothing unit.
///
/// On success every write is visible; on error none is. The session backing
/// the unit is released before this returns, whatever the outcome.
#[async_trait]
pub trait TransactionCoordinator<T: Document>: Send + Sync {
    async fn run_atomic(&self, opts: &TxnOptions, writes: Vec<Write<T>>) -> Result<(), StoreError>;
}
