//! Infrastructure layer: persistence seams for the dispatch core.
//!
//! The store traits are the restart-survival contract: batch records and
//! transaction status/reconciliation fields must outlive the process. The
//! in-memory implementations back tests and development; production wiring
//! plugs real persistence in behind the same traits.

pub mod store;

pub use store::{
    BatchStore, InMemoryBatchStore, InMemoryTransactionStore, StoreError, TransactionStore,
};
