//! Approval service: sealing a pending batch and approving its constituents.

use ledgerseal_core::{AggregateRoot, DomainError, TransactionId, UserId};
use tracing::info;

use crate::batch::{Batch, BatchStatus};
use crate::canonical::content_hash;
use crate::error::DispatchResult;
use crate::transaction::{Transaction, TransactionStatus};

/// Stateless approval service.
///
/// Approval is the last gate before dispatch: it fixes the content hash
/// (sealing) and moves constituent transactions from `pending` to `approve`.
/// Once every dispatchable constituent is approved the batch itself moves to
/// `APPROVE`. Statistics are recomputed with every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Approver;

impl Approver {
    pub fn new() -> Self {
        Self
    }

    /// Approve every pending constituent and move the batch to `APPROVE`
    /// in one step.
    pub fn approve_all(
        &self,
        batch: &mut Batch,
        transactions: &mut [Transaction],
        actor: UserId,
    ) -> DispatchResult<()> {
        let ids: Vec<TransactionId> = transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .map(|tx| tx.id)
            .collect();
        self.approve(batch, transactions, &ids, actor)
    }

    /// Approve the named constituents.
    ///
    /// Seals the batch on first use (the hash is fixed before anything is
    /// approved against it). When no dispatchable constituent remains
    /// pending, the batch transitions to `APPROVE`; until then it stays
    /// `PENDING` with updated statistics.
    ///
    /// All-or-nothing: the whole id list is validated before anything is
    /// mutated, so a rejected request leaves batch and transactions exactly
    /// as they were.
    pub fn approve(
        &self,
        batch: &mut Batch,
        transactions: &mut [Transaction],
        ids: &[TransactionId],
        actor: UserId,
    ) -> DispatchResult<()> {
        for id in ids {
            let tx = transactions.iter().find(|tx| tx.id == *id).ok_or_else(|| {
                DomainError::validation(format!(
                    "transaction {id} is not part of batch {}",
                    batch.id()
                ))
            })?;
            if tx.status != TransactionStatus::Pending {
                return Err(DomainError::conflict(format!(
                    "transaction {id} is not pending (status {:?})",
                    tx.status
                ))
                .into());
            }
        }

        if batch.content_hash().is_none() {
            let hash = content_hash(transactions)?;
            batch.seal(hash)?;
        }

        for tx in transactions.iter_mut() {
            if ids.contains(&tx.id) {
                tx.status = TransactionStatus::Approve;
            }
        }

        let statuses: Vec<TransactionStatus> = transactions.iter().map(|tx| tx.status).collect();
        let all_approved = !statuses.contains(&TransactionStatus::Pending);

        if all_approved && batch.status() == BatchStatus::Pending {
            batch.approve(actor, &statuses)?;
            info!(
                batch_id = %batch.id(),
                approved = statuses.iter().filter(|s| **s == TransactionStatus::Approve).count(),
                "batch fully approved"
            );
        } else {
            batch.recompute_statistics(&statuses);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{Assembly, BatchAssembler};
    use crate::error::DispatchError;
    use crate::filtering::{AccountingPeriod, FilteringParameters};
    use crate::transaction::{
        Account, Document, ReconciliationState, TransactionItem, TransactionType,
        ValidationStatus,
    };
    use chrono::NaiveDate;
    use ledgerseal_core::OrganisationId;

    fn item(amount: i64, is_debit: bool) -> TransactionItem {
        TransactionItem {
            account: Account {
                code: if is_debit { "1000" } else { "2000" }.to_string(),
                name: "acct".to_string(),
            },
            amount_lcy: amount,
            amount_fcy: amount,
            fx_rate: "1.0".to_string(),
            is_debit,
            event_code: None,
            cost_center: None,
            project: None,
            vat: None,
        }
    }

    fn tx(org: OrganisationId, number: &str) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            organisation_id: org,
            internal_number: number.to_string(),
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            transaction_type: TransactionType::Journal,
            data_source: "netsuite".to_string(),
            document: Some(Document {
                number: format!("DOC-{number}"),
                currency: "EUR".to_string(),
                counterparty: None,
            }),
            items: vec![item(10_000, true), item(10_000, false)],
            validation_status: ValidationStatus::Validated,
            status: TransactionStatus::Pending,
            reconciliation: ReconciliationState::default(),
        }
    }

    fn params() -> FilteringParameters {
        FilteringParameters {
            transaction_types: [TransactionType::Journal].into_iter().collect(),
            from_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            period_from: AccountingPeriod::new(2024, 3),
            period_to: AccountingPeriod::new(2024, 3),
            transaction_numbers: Default::default(),
        }
    }

    fn assembled(count: usize) -> (Batch, Vec<Transaction>) {
        let org = OrganisationId::new();
        let candidates = (0..count).map(|i| tx(org, &format!("TX-{i}"))).collect();
        match BatchAssembler::new()
            .assemble(org, params(), candidates, &[], UserId::new())
            .unwrap()
        {
            Assembly::New {
                batch,
                transactions,
            } => (batch, transactions),
            other => panic!("expected new batch, got {other:?}"),
        }
    }

    #[test]
    fn approve_all_seals_and_moves_batch_to_approve() {
        let (mut batch, mut txs) = assembled(2);

        Approver::new()
            .approve_all(&mut batch, &mut txs, UserId::new())
            .unwrap();

        assert_eq!(batch.status(), BatchStatus::Approve);
        assert!(batch.content_hash().is_some());
        assert_eq!(batch.statistics().approve, 2);
        for t in &txs {
            assert_eq!(t.status, TransactionStatus::Approve);
        }
    }

    #[test]
    fn partial_approval_keeps_the_batch_pending() {
        let (mut batch, mut txs) = assembled(3);
        let first = txs[0].id;

        Approver::new()
            .approve(&mut batch, &mut txs, &[first], UserId::new())
            .unwrap();

        assert_eq!(batch.status(), BatchStatus::Pending);
        assert_eq!(batch.statistics().approve, 1);
        assert_eq!(batch.statistics().pending, 2);

        // Approving the rest completes the transition.
        let rest: Vec<_> = txs[1..].iter().map(|t| t.id).collect();
        Approver::new()
            .approve(&mut batch, &mut txs, &rest, UserId::new())
            .unwrap();
        assert_eq!(batch.status(), BatchStatus::Approve);
    }

    #[test]
    fn approving_a_foreign_transaction_fails() {
        let (mut batch, mut txs) = assembled(1);

        let err = Approver::new()
            .approve(&mut batch, &mut txs, &[TransactionId::new()], UserId::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::Validation(_))
        ));
        assert_eq!(batch.status(), BatchStatus::Pending);
    }

    #[test]
    fn rejected_request_leaves_batch_and_transactions_untouched() {
        let (mut batch, mut txs) = assembled(3);
        let batch_before = batch.clone();
        let txs_before = txs.clone();

        // Valid ids first, a foreign one in the middle: nothing may apply.
        let ids = [txs[0].id, TransactionId::new(), txs[1].id];
        let err = Approver::new()
            .approve(&mut batch, &mut txs, &ids, UserId::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::Validation(_))
        ));

        assert_eq!(batch, batch_before);
        assert!(batch.content_hash().is_none());
        assert_eq!(batch.statistics().pending, 3);
        assert_eq!(txs, txs_before);
    }

    #[test]
    fn invalid_constituents_do_not_block_full_approval() {
        let (mut batch, mut txs) = assembled(2);
        // One constituent failed ingestion validation.
        txs[0].status = TransactionStatus::Invalid;
        let statuses: Vec<_> = txs.iter().map(|t| t.status).collect();
        batch.recompute_statistics(&statuses);

        Approver::new()
            .approve_all(&mut batch, &mut txs, UserId::new())
            .unwrap();

        assert_eq!(batch.status(), BatchStatus::Approve);
        assert_eq!(batch.statistics().invalid, 1);
        assert_eq!(batch.statistics().approve, 1);
    }

    #[test]
    fn double_approval_of_a_transaction_is_a_conflict() {
        let (mut batch, mut txs) = assembled(2);
        let first = txs[0].id;

        Approver::new()
            .approve(&mut batch, &mut txs, &[first], UserId::new())
            .unwrap();
        let err = Approver::new()
            .approve(&mut batch, &mut txs, &[first], UserId::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::Conflict(_))
        ));
    }
}
