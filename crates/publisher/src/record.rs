//! LedgerDispatch record: per-batch submission bookkeeping.
//!
//! Owned exclusively by the publisher. Created on the first accepted
//! submission, updated on every confirmation poll, finalized on confirmation
//! or terminal failure.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerseal_core::BatchId;

use crate::backend::SubmissionId;

/// Final/in-progress outcome of a ledger submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Accepted by the backend, awaiting confirmation.
    Submitted,
    /// Confirmed on the ledger with the recorded anchor hash.
    Confirmed { hash: String },
    /// Terminally failed (network rejection or confirmation timeout).
    Failed { reason: String },
}

/// Per-batch record of the submitted ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDispatch {
    pub batch_id: BatchId,
    pub submission_id: SubmissionId,
    pub submitted_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Confirmation polls performed so far; drives poll backoff.
    pub poll_attempts: u32,
    /// Earliest time of the next confirmation poll.
    pub next_poll_at: Option<DateTime<Utc>>,
    pub outcome: DispatchOutcome,
}

impl LedgerDispatch {
    pub fn new(batch_id: BatchId, submission_id: SubmissionId) -> Self {
        Self {
            batch_id,
            submission_id,
            submitted_at: Utc::now(),
            confirmed_at: None,
            poll_attempts: 0,
            next_poll_at: None,
            outcome: DispatchOutcome::Submitted,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Submitted)
    }

    /// Whether a confirmation poll is due.
    pub fn poll_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_poll_at {
            Some(at) => now >= at,
            None => true,
        }
    }

    pub fn record_poll(&mut self, next_poll_at: DateTime<Utc>) {
        self.poll_attempts += 1;
        self.next_poll_at = Some(next_poll_at);
    }

    pub fn mark_confirmed(&mut self, hash: String) {
        self.confirmed_at = Some(Utc::now());
        self.outcome = DispatchOutcome::Confirmed { hash };
        self.next_poll_at = None;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.outcome = DispatchOutcome::Failed {
            reason: reason.into(),
        };
        self.next_poll_at = None;
    }
}

/// Dispatch-record persistence seam (one record per batch).
pub trait DispatchStore: Send + Sync {
    fn upsert(&self, record: LedgerDispatch) -> Result<(), DispatchStoreError>;
    fn get(&self, batch_id: BatchId) -> Result<Option<LedgerDispatch>, DispatchStoreError>;
}

/// Dispatch store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory dispatch store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDispatchStore {
    records: RwLock<HashMap<BatchId, LedgerDispatch>>,
}

impl InMemoryDispatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl DispatchStore for InMemoryDispatchStore {
    fn upsert(&self, record: LedgerDispatch) -> Result<(), DispatchStoreError> {
        self.records
            .write()
            .unwrap()
            .insert(record.batch_id, record);
        Ok(())
    }

    fn get(&self, batch_id: BatchId) -> Result<Option<LedgerDispatch>, DispatchStoreError> {
        Ok(self.records.read().unwrap().get(&batch_id).cloned())
    }
}
