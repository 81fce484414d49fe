//! `ledgerseal-dispatch` — the batch dispatch core.
//!
//! Assembles approved accounting transactions into sealed batches, computes
//! the canonical content hash that gets anchored on the public ledger, owns
//! the batch/transaction status state machines and reconciles confirmed
//! ledger outcomes back into the books.

pub mod approval;
pub mod assembler;
pub mod batch;
pub mod canonical;
pub mod error;
pub mod filtering;
pub mod reconcile;
pub mod transaction;

pub use approval::Approver;
pub use assembler::{Assembly, BatchAssembler};
pub use batch::{Batch, BatchStatistics, BatchStatus, BatchStatusView};
pub use canonical::{canonicalize, content_hash};
pub use error::{DispatchError, DispatchResult};
pub use filtering::{AccountingPeriod, FilteringParameters};
pub use reconcile::{ReconciliationOutcome, Reconciler};
pub use transaction::{
    Account, Counterparty, CounterpartyKind, Document, ReconciliationFinalStatus,
    ReconciliationState, RejectionCode, Transaction, TransactionItem, TransactionStatus,
    TransactionType, ValidationStatus, Vat,
};
