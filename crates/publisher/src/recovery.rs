//! Startup recovery for in-flight dispatches.

use tracing::{info, warn};

use ledgerseal_core::AggregateRoot;
use ledgerseal_dispatch::{BatchStatus, RejectionCode};

use crate::backend::LedgerBackend;
use crate::error::PublishResult;
use crate::publish::Publisher;

/// What startup recovery found and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Batches in `PUBLISH` with a dispatch record; confirmation tracking
    /// resumed by re-querying the ledger.
    pub resumed: usize,
    /// Batches in `PUBLISH` with no dispatch record. The process died
    /// between submission and persisting the record, so whether the
    /// submission went out is unknowable; rejected rather than resubmitted.
    pub orphaned: usize,
}

impl<B: LedgerBackend> Publisher<B> {
    /// Resume confirmation tracking after a restart.
    ///
    /// Never resubmits: re-submission of a batch whose first submission may
    /// have been accepted would double-anchor it.
    pub fn resume_in_flight(&self) -> PublishResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for batch in self.batches().list_by_status(BatchStatus::Publish)? {
            let id = *batch.id();
            match self.dispatches().get(id)? {
                Some(record) if record.is_open() => {
                    self.poll_confirmation_once(id)?;
                    report.resumed += 1;
                }
                Some(_) => {
                    // Record already finalized; the batch state will have
                    // been settled by the same write path. Nothing to do.
                }
                None => {
                    self.reject_batch(id, RejectionCode::OrphanedSubmission)?;
                    warn!(batch_id = %id, "no dispatch record for in-flight batch, rejected as orphaned");
                    report.orphaned += 1;
                }
            }
        }
        info!(
            resumed = report.resumed,
            orphaned = report.orphaned,
            "in-flight dispatch recovery complete"
        );
        Ok(report)
    }
}
