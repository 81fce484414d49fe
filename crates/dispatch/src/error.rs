//! Dispatch-core error taxonomy.

use thiserror::Error;

use ledgerseal_core::{BatchId, DomainError};

use crate::batch::BatchStatus;

/// Result type for dispatch-core operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by the dispatch core.
///
/// Input errors (`EmptySet`, `OverlappingWindow`, `Canonicalization`) leave
/// no side effects; state errors (`IllegalStateTransition`) leave the batch
/// unchanged. Invariant violations arrive through [`DomainError`] and are
/// bugs, not recoverable conditions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No eligible transactions matched the filtering parameters.
    #[error("no eligible transactions for batch assembly")]
    EmptySet,

    /// The filtering parameters intersect an existing non-terminal batch for
    /// the same organisation, which would double-publish a transaction.
    #[error("filtering parameters overlap existing batch {existing}")]
    OverlappingWindow { existing: BatchId },

    /// A required field was missing while building the canonical form.
    ///
    /// Transactions that passed ingestion validation should never trigger
    /// this; it indicates an upstream invariant broke.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    /// The requested batch status transition is not part of the state machine.
    #[error("illegal state transition for batch {batch_id}: {from:?} -> {to:?}")]
    IllegalStateTransition {
        batch_id: BatchId,
        from: BatchStatus,
        to: BatchStatus,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}
