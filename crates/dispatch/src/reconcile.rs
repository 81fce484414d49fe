//! Reconciliation engine: expected vs observed ledger outcome.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ledgerseal_core::{AggregateRoot, DomainError};

use crate::batch::{Batch, BatchStatus};
use crate::canonical::content_hash;
use crate::error::{DispatchError, DispatchResult};
use crate::transaction::{
    ReconciliationFinalStatus, RejectionCode, Transaction, TransactionStatus,
};

/// Result of comparing the re-derived (source) hash against the
/// on-chain-recorded (sink) hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub final_status: ReconciliationFinalStatus,
    /// Expected hash, re-derived from the stored transaction set.
    pub source: String,
    /// Observed hash, as confirmed on the ledger.
    pub sink: String,
    pub rejection_codes: Vec<RejectionCode>,
}

/// Stateless reconciliation service.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    pub fn new() -> Self {
        Self
    }

    /// Reconcile a confirmed ledger outcome into the batch.
    ///
    /// Re-derives the expected content hash from the batch's current stored
    /// transaction set and compares it with `observed_hash`. A match moves
    /// batch and transactions to `published`; any divergence is terminal and
    /// requires the operator to re-assemble a new batch — never auto-healed.
    ///
    /// Idempotent: reconciling an already-matched batch returns the recorded
    /// outcome without touching state. Accepts batches in `PUBLISH` (normal
    /// confirmation) or rejected purely for `CONFIRMATION_TIMEOUT` (late
    /// confirmation picked up by the sweep).
    pub fn reconcile(
        &self,
        batch: &mut Batch,
        transactions: &mut [Transaction],
        observed_hash: &str,
    ) -> DispatchResult<ReconciliationOutcome> {
        if batch.status() == BatchStatus::Published {
            return batch.reconciliation().cloned().ok_or_else(|| {
                DomainError::invariant(format!(
                    "batch {} is published without a reconciliation outcome",
                    batch.id()
                ))
                .into()
            });
        }

        let late = batch.status() == BatchStatus::Rejected
            && batch.rejection_codes() == [RejectionCode::ConfirmationTimeout];
        if batch.status() != BatchStatus::Publish && !late {
            return Err(DispatchError::IllegalStateTransition {
                batch_id: *batch.id(),
                from: batch.status(),
                to: BatchStatus::Published,
            });
        }

        let expected = content_hash(transactions)?;
        let sealed = batch.content_hash().ok_or_else(|| {
            DomainError::invariant(format!("batch {} reconciled before sealing", batch.id()))
        })?;

        // The sealed hash is read-only after seal time; if the stored set no
        // longer reproduces it, something mutated behind the batch's back.
        if expected != sealed {
            let outcome = ReconciliationOutcome {
                final_status: ReconciliationFinalStatus::Mismatched,
                source: expected,
                sink: observed_hash.to_string(),
                rejection_codes: vec![RejectionCode::LateMutationDetected],
            };
            warn!(
                batch_id = %batch.id(),
                "stored transaction set no longer matches sealed hash"
            );
            return self.finish_mismatch(batch, transactions, outcome);
        }

        if expected == observed_hash {
            let outcome = ReconciliationOutcome {
                final_status: ReconciliationFinalStatus::Matched,
                source: expected.clone(),
                sink: observed_hash.to_string(),
                rejection_codes: Vec::new(),
            };

            for tx in transactions.iter_mut() {
                if tx.status == TransactionStatus::Publish {
                    tx.status = TransactionStatus::Published;
                }
                tx.reconciliation.source = Some(expected.clone());
                tx.reconciliation.sink = Some(observed_hash.to_string());
                tx.reconciliation.final_status = Some(ReconciliationFinalStatus::Matched);
                tx.reconciliation.rejection_codes.clear();
            }
            let statuses: Vec<TransactionStatus> =
                transactions.iter().map(|tx| tx.status).collect();

            if late {
                batch.resolve_late_confirmation(&statuses)?;
            } else {
                batch.mark_published(&statuses)?;
            }
            batch.set_reconciliation(outcome.clone());

            info!(batch_id = %batch.id(), "reconciliation matched");
            Ok(outcome)
        } else {
            let outcome = ReconciliationOutcome {
                final_status: ReconciliationFinalStatus::Mismatched,
                source: expected,
                sink: observed_hash.to_string(),
                rejection_codes: vec![RejectionCode::HashMismatch],
            };
            warn!(
                batch_id = %batch.id(),
                source = %outcome.source,
                sink = %outcome.sink,
                "reconciliation mismatched"
            );
            self.finish_mismatch(batch, transactions, outcome)
        }
    }

    /// Record a mismatch: transactions keep their current status (they are
    /// *not* published), reconciliation fields are populated, the batch ends
    /// rejected. A batch already rejected (late confirmation after timeout)
    /// gets the mismatch code appended so its rejection codes stay the full
    /// story.
    fn finish_mismatch(
        &self,
        batch: &mut Batch,
        transactions: &mut [Transaction],
        outcome: ReconciliationOutcome,
    ) -> DispatchResult<ReconciliationOutcome> {
        for tx in transactions.iter_mut() {
            tx.reconciliation.source = Some(outcome.source.clone());
            tx.reconciliation.sink = Some(outcome.sink.clone());
            tx.reconciliation.final_status = Some(ReconciliationFinalStatus::Mismatched);
            tx.reconciliation.rejection_codes = outcome.rejection_codes.clone();
        }
        let statuses: Vec<TransactionStatus> = transactions.iter().map(|tx| tx.status).collect();

        match batch.status() {
            BatchStatus::Publish => batch.reject(&outcome.rejection_codes, &statuses)?,
            BatchStatus::Rejected => {
                batch.append_rejection_codes(&outcome.rejection_codes, &statuses)?
            }
            _ => {}
        }
        batch.set_reconciliation(outcome.clone());
        Ok(outcome)
    }
}
