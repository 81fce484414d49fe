//! Single-flight batch publishing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{error, info, warn};

use ledgerseal_core::{AggregateRoot, BatchId};
use ledgerseal_dispatch::{
    content_hash, BatchStatus, Reconciler, RejectionCode, Transaction, TransactionStatus,
};
use ledgerseal_infra::{BatchStore, TransactionStore};

use crate::backend::{AnchorPayload, BackendError, LedgerBackend, SubmissionId};
use crate::confirm::ConfirmationPolicy;
use crate::error::{PublishError, PublishResult};
use crate::record::{DispatchStore, LedgerDispatch};
use crate::retry::RetryPolicy;

/// Publisher configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Budget + backoff for submission attempts. `max_attempts` bounds the
    /// `PUBLISH -> APPROVE` retry bounces per batch.
    pub submit_retry: RetryPolicy,
    /// Confirmation polling backoff and the bounded confirmation timeout.
    pub confirmation: ConfirmationPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            submit_retry: RetryPolicy::default(),
            confirmation: ConfirmationPolicy::default(),
        }
    }
}

/// The ledger publisher.
///
/// Guarantees at-most-one outstanding submission per batch: a per-batch
/// single-flight lock rejects concurrent `publish` calls with
/// [`PublishError::PublishInProgress`] instead of queueing them. On backend
/// acceptance the [`LedgerDispatch`] record is durably stored *before* the
/// caller is acknowledged, so a crash after acceptance cannot orphan the
/// on-chain write. Once accepted, a dispatch is un-cancellable and runs to
/// confirmation or timeout.
pub struct Publisher<B> {
    backend: Arc<B>,
    batches: Arc<dyn BatchStore>,
    transactions: Arc<dyn TransactionStore>,
    dispatches: Arc<dyn DispatchStore>,
    in_flight: Mutex<HashSet<BatchId>>,
    pub(crate) reconciler: Reconciler,
    pub(crate) config: PublisherConfig,
}

/// RAII release of the per-batch single-flight slot.
struct InFlightGuard<'a> {
    slots: &'a Mutex<HashSet<BatchId>>,
    batch_id: BatchId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slots.lock().unwrap().remove(&self.batch_id);
    }
}

impl<B: LedgerBackend> Publisher<B> {
    pub fn new(
        backend: Arc<B>,
        batches: Arc<dyn BatchStore>,
        transactions: Arc<dyn TransactionStore>,
        dispatches: Arc<dyn DispatchStore>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            backend,
            batches,
            transactions,
            dispatches,
            in_flight: Mutex::new(HashSet::new()),
            reconciler: Reconciler::new(),
            config,
        }
    }

    pub(crate) fn batches(&self) -> &dyn BatchStore {
        self.batches.as_ref()
    }

    pub(crate) fn transactions(&self) -> &dyn TransactionStore {
        self.transactions.as_ref()
    }

    pub(crate) fn dispatches(&self) -> &dyn DispatchStore {
        self.dispatches.as_ref()
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    fn acquire(&self, batch_id: BatchId) -> PublishResult<InFlightGuard<'_>> {
        let mut slots = self.in_flight.lock().unwrap();
        if !slots.insert(batch_id) {
            return Err(PublishError::PublishInProgress { batch_id });
        }
        Ok(InFlightGuard {
            slots: &self.in_flight,
            batch_id,
        })
    }

    /// Perform one submission attempt for a batch in `APPROVE`.
    ///
    /// A transient backend failure bounces the batch back to `APPROVE`
    /// (bounded by the retry budget) for the submission worker to retry
    /// after backoff; the single-flight lock is never held across that wait.
    /// Budget exhaustion or a permanent failure rejects the batch.
    pub fn publish(&self, batch_id: BatchId) -> PublishResult<SubmissionId> {
        let _guard = self.acquire(batch_id)?;

        let mut batch = self
            .batches
            .get(batch_id)?
            .ok_or(PublishError::BatchNotFound(batch_id))?;
        let mut txs = self.transactions.get_set(batch.transaction_ids())?;

        // Re-derive the hash from the stored set; begin_publish aborts on a
        // stale sealed hash before any state changes.
        let current = content_hash(&txs)?;
        let statuses = move_statuses(&mut txs, TransactionStatus::Approve, TransactionStatus::Publish);
        batch.begin_publish(&current, &statuses)?;
        self.batches.update(&batch)?;
        self.transactions.save_set(&txs)?;

        let payload = AnchorPayload {
            batch_id,
            organisation_id: batch.organisation_id(),
            content_hash: current,
        };
        let attempt = batch.retry_count() + 1;

        let submitted = self
            .backend
            .sign(&payload)
            .and_then(|signed| self.backend.submit(&signed));

        match submitted {
            Ok(submission_id) => {
                // Durably stored before the caller sees the acceptance.
                self.dispatches
                    .upsert(LedgerDispatch::new(batch_id, submission_id.clone()))?;
                info!(
                    batch_id = %batch_id,
                    submission_id = %submission_id,
                    attempt,
                    "ledger submission accepted"
                );
                Ok(submission_id)
            }
            Err(source @ BackendError::Transient(_)) => {
                if self.config.submit_retry.should_retry(attempt) {
                    let statuses = move_statuses(
                        &mut txs,
                        TransactionStatus::Publish,
                        TransactionStatus::Approve,
                    );
                    batch.retry_to_approve(self.config.submit_retry.max_attempts, &statuses)?;
                    self.batches.update(&batch)?;
                    self.transactions.save_set(&txs)?;
                    warn!(
                        batch_id = %batch_id,
                        attempt,
                        error = %source,
                        "transient submission failure, batch returned to approve"
                    );
                } else {
                    batch.reject(&[RejectionCode::SubmissionRetriesExhausted], &statuses)?;
                    self.batches.update(&batch)?;
                    error!(
                        batch_id = %batch_id,
                        attempt,
                        error = %source,
                        "submission retry budget exhausted, batch rejected"
                    );
                }
                Err(PublishError::Backend { batch_id, source })
            }
            Err(source @ BackendError::Permanent(_)) => {
                batch.reject(&[RejectionCode::SubmissionFailed], &statuses)?;
                self.batches.update(&batch)?;
                error!(
                    batch_id = %batch_id,
                    error = %source,
                    "permanent submission failure, batch rejected"
                );
                Err(PublishError::Backend { batch_id, source })
            }
        }
    }

    /// Batches in `APPROVE` whose next submission attempt is due.
    ///
    /// Fresh batches are due immediately; bounced ones wait out the
    /// exponential backoff keyed on their retry count.
    pub fn due_for_submission(&self) -> PublishResult<Vec<BatchId>> {
        let now = Utc::now();
        let mut due = Vec::new();
        for batch in self.batches.list_by_status(BatchStatus::Approve)? {
            let ready = if batch.retry_count() == 0 {
                true
            } else {
                let delay = self
                    .config
                    .submit_retry
                    .delay_for_attempt(batch.retry_count());
                let next = batch.updated_at()
                    + chrono::Duration::from_std(delay).unwrap_or_default();
                now >= next
            };
            if ready {
                due.push(*batch.id());
            }
        }
        Ok(due)
    }
}

/// Shift every transaction currently in `from` to `to`; returns the full
/// status vector afterwards (invalid ones stay untouched).
pub(crate) fn move_statuses(
    txs: &mut [Transaction],
    from: TransactionStatus,
    to: TransactionStatus,
) -> Vec<TransactionStatus> {
    for tx in txs.iter_mut() {
        if tx.status == from {
            tx.status = to;
        }
    }
    txs.iter().map(|tx| tx.status).collect()
}
