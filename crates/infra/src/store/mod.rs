//! Store abstractions for transactions and batches.

mod in_memory;

pub use in_memory::{InMemoryBatchStore, InMemoryTransactionStore};

use ledgerseal_core::{BatchId, OrganisationId, TransactionId};
use ledgerseal_dispatch::{Batch, BatchStatus, Transaction};

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),
    #[error("batch already exists: {0}")]
    BatchAlreadyExists(BatchId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Transaction persistence seam.
///
/// Business fields are written once by ingestion; the core only rewrites the
/// status/reconciliation fields it owns, and transactions are never deleted
/// (append-only audit requirement).
pub trait TransactionStore: Send + Sync {
    /// Insert or replace a transaction record.
    fn upsert(&self, tx: Transaction) -> Result<(), StoreError>;

    fn get(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// Load a batch's constituent set, preserving the given order.
    /// A missing id is an error: a batch must never silently shrink.
    fn get_set(&self, ids: &[TransactionId]) -> Result<Vec<Transaction>, StoreError>;

    /// Persist status/reconciliation updates for a whole set atomically.
    fn save_set(&self, txs: &[Transaction]) -> Result<(), StoreError>;

    /// All transactions of an organisation (assembly candidates).
    fn list_for_organisation(&self, org: OrganisationId) -> Result<Vec<Transaction>, StoreError>;
}

/// Batch persistence seam.
pub trait BatchStore: Send + Sync {
    fn insert(&self, batch: Batch) -> Result<(), StoreError>;

    fn get(&self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    /// Replace the stored batch (status, statistics, reconciliation fields).
    fn update(&self, batch: &Batch) -> Result<(), StoreError>;

    /// All batches of an organisation, superseded ones included.
    fn list_for_organisation(&self, org: OrganisationId) -> Result<Vec<Batch>, StoreError>;

    /// Batches currently in the given status, across organisations.
    /// Startup recovery uses this to find in-flight dispatches.
    fn list_by_status(&self, status: BatchStatus) -> Result<Vec<Batch>, StoreError>;
}
