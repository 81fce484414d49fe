//! Batch aggregate: sealed transaction set + dispatch state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerseal_core::{AggregateRoot, BatchId, DomainError, OrganisationId, TransactionId, UserId};

use crate::error::{DispatchError, DispatchResult};
use crate::filtering::FilteringParameters;
use crate::reconcile::ReconciliationOutcome;
use crate::transaction::{RejectionCode, TransactionStatus};

/// Batch-level dispatch status.
///
/// Forward-only except `Publish -> Approve` (bounded retry after a
/// recoverable submission failure) and the explicit late-confirmation exit
/// from `Rejected` (see [`Batch::resolve_late_confirmation`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Assembling / validating.
    Pending,
    /// Sealed, awaiting publish.
    Approve,
    /// Dispatch in flight.
    Publish,
    /// Confirmed on the ledger and reconciled.
    Published,
    /// Terminal failure.
    Rejected,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Published | BatchStatus::Rejected)
    }
}

/// Counts of constituent transactions per processing status.
///
/// Always recomputed from the transaction statuses, never incrementally
/// maintained; `total` equals the count of constituent transactions at every
/// point in the state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub invalid: usize,
    pub pending: usize,
    pub approve: usize,
    pub publish: usize,
    pub published: usize,
    pub total: usize,
}

impl BatchStatistics {
    pub fn from_statuses(statuses: impl IntoIterator<Item = TransactionStatus>) -> Self {
        let mut stats = Self::default();
        for status in statuses {
            match status {
                TransactionStatus::Invalid => stats.invalid += 1,
                TransactionStatus::Pending => stats.pending += 1,
                TransactionStatus::Approve => stats.approve += 1,
                TransactionStatus::Publish => stats.publish += 1,
                TransactionStatus::Published => stats.published += 1,
            }
            stats.total += 1;
        }
        stats
    }
}

/// Read-only status surface for reporting/API collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatusView {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub statistics: BatchStatistics,
    pub content_hash: Option<String>,
    pub rejection_codes: Vec<RejectionCode>,
    pub reconciliation: Option<ReconciliationOutcome>,
    pub superseded: bool,
}

/// An ordered, immutable-once-sealed set of transactions sharing one
/// [`FilteringParameters`] fingerprint.
///
/// The content hash is a pure function of the sealed transaction set; after
/// sealing, only status/reconciliation fields may change. Batches are never
/// physically deleted — superseded batches are marked, not removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    organisation_id: OrganisationId,
    parameters: FilteringParameters,
    /// Constituent transactions, ordered by (entry date, internal number).
    transaction_ids: Vec<TransactionId>,
    /// SHA-256 over sorted transaction ids + parameter bytes; assembly with
    /// the same inputs finds the existing batch through this key.
    idempotency_key: String,
    statistics: BatchStatistics,
    status: BatchStatus,
    content_hash: Option<String>,
    rejection_codes: Vec<RejectionCode>,
    reconciliation: Option<ReconciliationOutcome>,
    superseded: bool,
    retry_count: u32,
    created_at: DateTime<Utc>,
    created_by: UserId,
    updated_at: DateTime<Utc>,
    updated_by: Option<UserId>,
    version: u64,
}

impl AggregateRoot for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Batch {
    pub fn new(
        organisation_id: OrganisationId,
        parameters: FilteringParameters,
        transaction_ids: Vec<TransactionId>,
        idempotency_key: String,
        created_by: UserId,
        statuses: &[TransactionStatus],
    ) -> Self {
        let now = Utc::now();
        Self {
            id: BatchId::new(),
            organisation_id,
            parameters,
            transaction_ids,
            idempotency_key,
            statistics: BatchStatistics::from_statuses(statuses.iter().copied()),
            status: BatchStatus::Pending,
            content_hash: None,
            rejection_codes: Vec::new(),
            reconciliation: None,
            superseded: false,
            retry_count: 0,
            created_at: now,
            created_by,
            updated_at: now,
            updated_by: None,
            version: 0,
        }
    }

    pub fn organisation_id(&self) -> OrganisationId {
        self.organisation_id
    }

    pub fn parameters(&self) -> &FilteringParameters {
        &self.parameters
    }

    pub fn transaction_ids(&self) -> &[TransactionId] {
        &self.transaction_ids
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn statistics(&self) -> BatchStatistics {
        self.statistics
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn rejection_codes(&self) -> &[RejectionCode] {
        &self.rejection_codes
    }

    pub fn reconciliation(&self) -> Option<&ReconciliationOutcome> {
        self.reconciliation.as_ref()
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn status_view(&self) -> BatchStatusView {
        BatchStatusView {
            batch_id: self.id,
            status: self.status,
            statistics: self.statistics,
            content_hash: self.content_hash.clone(),
            rejection_codes: self.rejection_codes.clone(),
            reconciliation: self.reconciliation.clone(),
            superseded: self.superseded,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }

    fn transition(&mut self, to: BatchStatus) -> DispatchResult<()> {
        use BatchStatus::*;
        let allowed = matches!(
            (self.status, to),
            (Pending, Approve)
                | (Approve, Publish)
                | (Publish, Published)
                | (Publish, Rejected)
                | (Publish, Approve)
        );
        if !allowed {
            return Err(DispatchError::IllegalStateTransition {
                batch_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// Recompute statistics from the current constituent transaction
    /// statuses. Called transactionally with every status mutation.
    pub fn recompute_statistics(&mut self, statuses: &[TransactionStatus]) {
        debug_assert_eq!(statuses.len(), self.transaction_ids.len());
        self.statistics = BatchStatistics::from_statuses(statuses.iter().copied());
    }

    /// Fix the content hash of the assembled set. Pending-only; idempotent
    /// when called again with the same hash.
    pub fn seal(&mut self, hash: String) -> DispatchResult<()> {
        if self.status != BatchStatus::Pending {
            return Err(DispatchError::IllegalStateTransition {
                batch_id: self.id,
                from: self.status,
                to: BatchStatus::Approve,
            });
        }
        match &self.content_hash {
            Some(existing) if *existing == hash => Ok(()),
            Some(_) => Err(DomainError::invariant(format!(
                "batch {} already sealed with a different hash",
                self.id
            ))
            .into()),
            None => {
                self.content_hash = Some(hash);
                self.touch();
                Ok(())
            }
        }
    }

    /// `PENDING -> APPROVE`. Requires the batch to be sealed; the caller has
    /// already moved the constituent transactions to `approve`.
    pub fn approve(&mut self, actor: UserId, statuses: &[TransactionStatus]) -> DispatchResult<()> {
        if self.content_hash.is_none() {
            return Err(
                DomainError::invariant(format!("batch {} approved before sealing", self.id)).into(),
            );
        }
        self.transition(BatchStatus::Approve)?;
        self.updated_by = Some(actor);
        self.recompute_statistics(statuses);
        Ok(())
    }

    /// `APPROVE -> PUBLISH`. Re-validates that the sealed hash still matches
    /// the hash of the current stored transaction set; a stale hash is a
    /// fatal invariant violation and the transition does not apply.
    pub fn begin_publish(
        &mut self,
        current_hash: &str,
        statuses: &[TransactionStatus],
    ) -> DispatchResult<()> {
        let sealed = self.content_hash.as_deref().ok_or_else(|| {
            DomainError::invariant(format!("batch {} published before sealing", self.id))
        })?;
        if sealed != current_hash {
            return Err(DomainError::invariant(format!(
                "batch {} content hash is stale: sealed {sealed}, current {current_hash}",
                self.id
            ))
            .into());
        }
        self.transition(BatchStatus::Publish)?;
        self.recompute_statistics(statuses);
        Ok(())
    }

    /// `PUBLISH -> APPROVE` after a recoverable submission failure, bounded
    /// by the retry budget.
    pub fn retry_to_approve(
        &mut self,
        retry_budget: u32,
        statuses: &[TransactionStatus],
    ) -> DispatchResult<()> {
        if self.retry_count >= retry_budget {
            return Err(DomainError::conflict(format!(
                "batch {} exhausted its retry budget of {retry_budget}",
                self.id
            ))
            .into());
        }
        self.transition(BatchStatus::Approve)?;
        self.retry_count += 1;
        self.recompute_statistics(statuses);
        Ok(())
    }

    /// `PUBLISH -> PUBLISHED` after a matched reconciliation.
    pub fn mark_published(&mut self, statuses: &[TransactionStatus]) -> DispatchResult<()> {
        self.transition(BatchStatus::Published)?;
        self.recompute_statistics(statuses);
        Ok(())
    }

    /// `PUBLISH -> REJECTED` (terminal, except for late confirmations).
    pub fn reject(
        &mut self,
        codes: &[RejectionCode],
        statuses: &[TransactionStatus],
    ) -> DispatchResult<()> {
        self.transition(BatchStatus::Rejected)?;
        for code in codes {
            if !self.rejection_codes.contains(code) {
                self.rejection_codes.push(*code);
            }
        }
        self.recompute_statistics(statuses);
        Ok(())
    }

    /// Append rejection codes to an already-rejected batch (late
    /// reconciliation findings surfacing after the original rejection).
    pub fn append_rejection_codes(
        &mut self,
        codes: &[RejectionCode],
        statuses: &[TransactionStatus],
    ) -> DispatchResult<()> {
        if self.status != BatchStatus::Rejected {
            return Err(DispatchError::IllegalStateTransition {
                batch_id: self.id,
                from: self.status,
                to: BatchStatus::Rejected,
            });
        }
        for code in codes {
            if !self.rejection_codes.contains(code) {
                self.rejection_codes.push(*code);
            }
        }
        self.touch();
        self.recompute_statistics(statuses);
        Ok(())
    }

    /// The only sanctioned exit from `REJECTED`: a batch rejected solely for
    /// `CONFIRMATION_TIMEOUT` later confirmed on-chain and reconciled clean.
    pub fn resolve_late_confirmation(
        &mut self,
        statuses: &[TransactionStatus],
    ) -> DispatchResult<()> {
        let timeout_only = self.rejection_codes == [RejectionCode::ConfirmationTimeout];
        if self.status != BatchStatus::Rejected || !timeout_only {
            return Err(DispatchError::IllegalStateTransition {
                batch_id: self.id,
                from: self.status,
                to: BatchStatus::Published,
            });
        }
        self.status = BatchStatus::Published;
        self.rejection_codes.clear();
        self.touch();
        self.recompute_statistics(statuses);
        Ok(())
    }

    /// Record the reconciliation outcome (set once by the engine, re-read on
    /// idempotent re-runs).
    pub fn set_reconciliation(&mut self, outcome: ReconciliationOutcome) {
        self.reconciliation = Some(outcome);
        self.touch();
    }

    /// Mark this batch as superseded by a re-assembled successor. The record
    /// stays for audit; it just stops counting against overlap checks.
    pub fn mark_superseded(&mut self) {
        self.superseded = true;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filtering::AccountingPeriod;
    use crate::transaction::TransactionType;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn params() -> FilteringParameters {
        FilteringParameters {
            transaction_types: [TransactionType::Journal].into_iter().collect(),
            from_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            period_from: AccountingPeriod::new(2024, 1),
            period_to: AccountingPeriod::new(2024, 3),
            transaction_numbers: Default::default(),
        }
    }

    fn batch(statuses: &[TransactionStatus]) -> Batch {
        let ids: Vec<_> = statuses.iter().map(|_| TransactionId::new()).collect();
        Batch::new(
            OrganisationId::new(),
            params(),
            ids,
            "key".to_string(),
            UserId::new(),
            statuses,
        )
    }

    fn sealed_approved(statuses: &[TransactionStatus]) -> Batch {
        let mut b = batch(statuses);
        b.seal("hash".to_string()).unwrap();
        let approved: Vec<_> = statuses.iter().map(|_| TransactionStatus::Approve).collect();
        b.approve(UserId::new(), &approved).unwrap();
        b
    }

    #[test]
    fn happy_path_walks_the_full_state_machine() {
        let two = [TransactionStatus::Pending, TransactionStatus::Pending];
        let mut b = batch(&two);
        assert_eq!(b.status(), BatchStatus::Pending);
        assert_eq!(b.statistics().pending, 2);
        assert_eq!(b.statistics().total, 2);

        b.seal("h".to_string()).unwrap();
        b.approve(UserId::new(), &[TransactionStatus::Approve; 2])
            .unwrap();
        assert_eq!(b.status(), BatchStatus::Approve);
        assert_eq!(b.statistics().approve, 2);

        b.begin_publish("h", &[TransactionStatus::Publish; 2]).unwrap();
        assert_eq!(b.status(), BatchStatus::Publish);

        b.mark_published(&[TransactionStatus::Published; 2]).unwrap();
        assert_eq!(b.status(), BatchStatus::Published);
        assert_eq!(b.statistics().published, 2);
    }

    #[test]
    fn approve_before_seal_is_an_invariant_violation() {
        let mut b = batch(&[TransactionStatus::Pending]);
        let err = b
            .approve(UserId::new(), &[TransactionStatus::Approve])
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::InvariantViolation(_))
        ));
        assert_eq!(b.status(), BatchStatus::Pending);
    }

    #[test]
    fn illegal_transition_fails_without_partial_application() {
        let mut b = batch(&[TransactionStatus::Pending]);
        let before = b.clone();

        let err = b.mark_published(&[TransactionStatus::Published]).unwrap_err();
        assert!(matches!(err, DispatchError::IllegalStateTransition { .. }));
        assert_eq!(b, before);
    }

    #[test]
    fn stale_hash_aborts_publish_without_state_change() {
        let mut b = sealed_approved(&[TransactionStatus::Pending]);
        let before = b.clone();

        let err = b
            .begin_publish("a-different-hash", &[TransactionStatus::Publish])
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::InvariantViolation(_))
        ));
        assert_eq!(b, before);
    }

    #[test]
    fn sealing_twice_with_the_same_hash_is_idempotent() {
        let mut b = batch(&[TransactionStatus::Pending]);
        b.seal("h".to_string()).unwrap();
        b.seal("h".to_string()).unwrap();
        assert!(b.seal("other".to_string()).is_err());
    }

    #[test]
    fn retry_bounces_back_to_approve_until_budget_exhausted() {
        let statuses = [TransactionStatus::Approve];
        let mut b = sealed_approved(&statuses);

        b.begin_publish("hash", &[TransactionStatus::Publish]).unwrap();
        b.retry_to_approve(2, &statuses).unwrap();
        assert_eq!(b.status(), BatchStatus::Approve);
        assert_eq!(b.retry_count(), 1);

        b.begin_publish("hash", &[TransactionStatus::Publish]).unwrap();
        b.retry_to_approve(2, &statuses).unwrap();

        b.begin_publish("hash", &[TransactionStatus::Publish]).unwrap();
        let err = b.retry_to_approve(2, &statuses).unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::Conflict(_))));
        assert_eq!(b.status(), BatchStatus::Publish);
    }

    #[test]
    fn late_confirmation_only_resolves_pure_timeout_rejections() {
        let statuses = [TransactionStatus::Publish];
        let mut b = sealed_approved(&[TransactionStatus::Approve]);
        b.begin_publish("hash", &statuses).unwrap();
        b.reject(&[RejectionCode::ConfirmationTimeout], &statuses)
            .unwrap();

        b.resolve_late_confirmation(&[TransactionStatus::Published])
            .unwrap();
        assert_eq!(b.status(), BatchStatus::Published);
        assert!(b.rejection_codes().is_empty());

        let mut rejected = sealed_approved(&[TransactionStatus::Approve]);
        rejected.begin_publish("hash", &statuses).unwrap();
        rejected
            .reject(&[RejectionCode::HashMismatch], &statuses)
            .unwrap();
        assert!(rejected
            .resolve_late_confirmation(&[TransactionStatus::Published])
            .is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: statistics always sum to `total`, and `total` equals the
        /// number of constituent transactions.
        #[test]
        fn statistics_total_matches_constituent_count(
            raw in prop::collection::vec(0u8..5, 0..64)
        ) {
            let statuses: Vec<TransactionStatus> = raw
                .iter()
                .map(|n| match n {
                    0 => TransactionStatus::Invalid,
                    1 => TransactionStatus::Pending,
                    2 => TransactionStatus::Approve,
                    3 => TransactionStatus::Publish,
                    _ => TransactionStatus::Published,
                })
                .collect();

            let stats = BatchStatistics::from_statuses(statuses.iter().copied());
            prop_assert_eq!(stats.total, statuses.len());
            prop_assert_eq!(
                stats.invalid + stats.pending + stats.approve + stats.publish + stats.published,
                stats.total
            );
        }
    }
}
