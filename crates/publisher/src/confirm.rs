//! Confirmation tracking against an eventually-consistent ledger.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use ledgerseal_core::{AggregateRoot, BatchId};
use ledgerseal_dispatch::{
    BatchStatus, ReconciliationFinalStatus, ReconciliationOutcome, RejectionCode,
};

use crate::backend::{Confirmation, LedgerBackend};
use crate::error::{PublishError, PublishResult};
use crate::publish::Publisher;
use crate::retry::RetryPolicy;

/// Polling cadence and the bounded confirmation window.
#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    /// Backoff between confirmation polls (its `max_attempts` is not used;
    /// polling is bounded by `timeout`, not by a count).
    pub poll: RetryPolicy,
    /// How long after submission a still-pending dispatch is declared
    /// timed out and its batch rejected.
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll: RetryPolicy::exponential(u32::MAX, Duration::from_secs(2), Duration::from_secs(60)),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl<B: LedgerBackend> Publisher<B> {
    /// Poll the confirmation status of one in-flight dispatch.
    ///
    /// Returns the reconciliation outcome once the network confirms the
    /// anchor, `None` while still pending. A dispatch pending past the
    /// confirmation timeout rejects its batch with `CONFIRMATION_TIMEOUT`;
    /// the record is kept so a late confirmation can still be resolved by
    /// [`Publisher::sweep_stale_timeouts`].
    pub fn poll_confirmation_once(
        &self,
        batch_id: BatchId,
    ) -> PublishResult<Option<ReconciliationOutcome>> {
        let Some(mut record) = self.dispatches().get(batch_id)? else {
            return Ok(None);
        };
        if !record.is_open() {
            return Ok(None);
        }

        match self.backend().query_confirmation(&record.submission_id) {
            Err(err) => {
                // Query failures are always retried; only the timeout ends
                // the wait.
                warn!(batch_id = %batch_id, error = %err, "confirmation query failed");
                let delay = self.config.confirmation.poll.delay_for_attempt(record.poll_attempts + 1);
                record.record_poll(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                self.dispatches().upsert(record)?;
                Ok(None)
            }
            Ok(Confirmation::Pending) => {
                let now = Utc::now();
                let age = now
                    .signed_duration_since(record.submitted_at)
                    .to_std()
                    .unwrap_or_default();
                if age >= self.config.confirmation.timeout {
                    self.reject_batch(batch_id, RejectionCode::ConfirmationTimeout)?;
                    warn!(
                        batch_id = %batch_id,
                        submission_id = %record.submission_id,
                        "confirmation window elapsed, batch rejected"
                    );
                    // Record stays open: the submission may still land and
                    // be picked up by the stale-timeout sweep.
                    return Ok(None);
                }
                let delay = self.config.confirmation.poll.delay_for_attempt(record.poll_attempts + 1);
                record.record_poll(now + chrono::Duration::from_std(delay).unwrap_or_default());
                self.dispatches().upsert(record)?;
                debug!(batch_id = %batch_id, "confirmation still pending");
                Ok(None)
            }
            Ok(Confirmation::Confirmed { hash }) => {
                record.mark_confirmed(hash.clone());
                self.dispatches().upsert(record)?;
                let outcome = self.reconcile_confirmed(batch_id, &hash)?;
                Ok(Some(outcome))
            }
            Ok(Confirmation::Failed { reason }) => {
                record.mark_failed(reason.clone());
                self.dispatches().upsert(record)?;
                self.reject_batch(batch_id, RejectionCode::SubmissionFailed)?;
                warn!(
                    batch_id = %batch_id,
                    reason = %reason,
                    "ledger rejected the submission, batch rejected"
                );
                Ok(None)
            }
        }
    }

    /// Poll every open dispatch whose next poll is due. Returns the batch
    /// ids that reached a reconciliation outcome this pass.
    pub fn poll_due_confirmations(&self) -> PublishResult<Vec<BatchId>> {
        let now = Utc::now();
        let mut settled = Vec::new();
        for batch in self.batches().list_by_status(BatchStatus::Publish)? {
            let id = *batch.id();
            let due = match self.dispatches().get(id)? {
                Some(record) => record.is_open() && record.poll_due(now),
                None => false,
            };
            if due && self.poll_confirmation_once(id)?.is_some() {
                settled.push(id);
            }
        }
        Ok(settled)
    }

    /// Re-query dispatches of batches rejected solely for confirmation
    /// timeout. A submission that confirmed after the window elapsed is
    /// reconciled late, moving the batch `REJECTED -> PUBLISHED` when the
    /// observed hash matches. Returns how many batches resolved clean; a
    /// late confirmation that mismatches stays rejected with the mismatch
    /// code appended and is not counted.
    pub fn sweep_stale_timeouts(&self) -> PublishResult<usize> {
        let mut resolved = 0;
        for batch in self.batches().list_by_status(BatchStatus::Rejected)? {
            if batch.rejection_codes() != [RejectionCode::ConfirmationTimeout] {
                continue;
            }
            let id = *batch.id();
            let Some(mut record) = self.dispatches().get(id)? else {
                continue;
            };
            if !record.is_open() {
                continue;
            }
            if let Ok(Confirmation::Confirmed { hash }) =
                self.backend().query_confirmation(&record.submission_id)
            {
                record.mark_confirmed(hash.clone());
                self.dispatches().upsert(record)?;
                let outcome = self.reconcile_confirmed(id, &hash)?;
                if outcome.final_status == ReconciliationFinalStatus::Matched {
                    info!(batch_id = %id, "late confirmation resolved after timeout");
                    resolved += 1;
                } else {
                    warn!(batch_id = %id, "late confirmation mismatched, batch stays rejected");
                }
            }
        }
        Ok(resolved)
    }

    pub(crate) fn reconcile_confirmed(
        &self,
        batch_id: BatchId,
        observed_hash: &str,
    ) -> PublishResult<ReconciliationOutcome> {
        let mut batch = self
            .batches()
            .get(batch_id)?
            .ok_or(PublishError::BatchNotFound(batch_id))?;
        let mut txs = self.transactions().get_set(batch.transaction_ids())?;
        let outcome = self.reconciler.reconcile(&mut batch, &mut txs, observed_hash)?;
        self.batches().update(&batch)?;
        self.transactions().save_set(&txs)?;
        info!(
            batch_id = %batch_id,
            final_status = ?outcome.final_status,
            batch_status = ?batch.status(),
            "reconciliation settled"
        );
        Ok(outcome)
    }

    /// Reject a batch over an in-flight dispatch. Idempotent: a batch that
    /// already ended rejected (e.g. timed out while its record stayed open)
    /// is left untouched.
    pub(crate) fn reject_batch(
        &self,
        batch_id: BatchId,
        code: RejectionCode,
    ) -> PublishResult<()> {
        let mut batch = self
            .batches()
            .get(batch_id)?
            .ok_or(PublishError::BatchNotFound(batch_id))?;
        if batch.status() == BatchStatus::Rejected {
            return Ok(());
        }
        let statuses: Vec<_> = self
            .transactions()
            .get_set(batch.transaction_ids())?
            .iter()
            .map(|tx| tx.status)
            .collect();
        batch.reject(&[code], &statuses)?;
        self.batches().update(&batch)?;
        Ok(())
    }
}
