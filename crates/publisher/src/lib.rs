//! `ledgerseal-publisher` — anchoring batches on the public ledger.
//!
//! Builds, signs and submits the ledger transaction carrying a batch's
//! content hash, tracks confirmation against an eventually-consistent
//! network, and feeds confirmed outcomes into the reconciliation engine.

pub mod backend;
pub mod confirm;
pub mod error;
pub mod publish;
pub mod record;
pub mod recovery;
pub mod retry;
pub mod worker;


pub use backend::{
    AnchorPayload, BackendError, Confirmation, LedgerBackend, ScriptedBackend, SignedTx,
    SubmissionId, SubmitScript,
};
pub use confirm::ConfirmationPolicy;
pub use error::{PublishError, PublishResult};
pub use publish::{Publisher, PublisherConfig};
pub use record::{
    DispatchOutcome, DispatchStore, DispatchStoreError, InMemoryDispatchStore, LedgerDispatch,
};
pub use recovery::RecoveryReport;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use worker::{
    spawn_confirmation_worker, spawn_submission_worker, WorkerConfig, WorkerHandle, WorkerStats,
};
