//! Publisher error taxonomy.

use thiserror::Error;

use ledgerseal_core::BatchId;
use ledgerseal_dispatch::DispatchError;
use ledgerseal_infra::StoreError;

use crate::backend::BackendError;
use crate::record::DispatchStoreError;

/// Result type for publisher operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors surfaced by the ledger publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A publish for this batch is already in flight; concurrent requests
    /// are rejected, not queued.
    #[error("publish already in progress for batch {batch_id}")]
    PublishInProgress { batch_id: BatchId },

    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    /// The signer/backend failed for this batch. Whether the batch was
    /// bounced back to `APPROVE` for retry or terminally rejected is
    /// reflected in the stored batch state.
    #[error("backend failure for batch {batch_id}: {source}")]
    Backend {
        batch_id: BatchId,
        source: BackendError,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    DispatchStore(#[from] DispatchStoreError),
}
