//! In-memory store implementations for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ledgerseal_core::{AggregateRoot, BatchId, OrganisationId, TransactionId};
use ledgerseal_dispatch::{Batch, BatchStatus, Transaction};

use super::{BatchStore, StoreError, TransactionStore};

/// In-memory transaction store.
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn upsert(&self, tx: Transaction) -> Result<(), StoreError> {
        self.transactions.write().unwrap().insert(tx.id, tx);
        Ok(())
    }

    fn get(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transactions.read().unwrap().get(&id).cloned())
    }

    fn get_set(&self, ids: &[TransactionId]) -> Result<Vec<Transaction>, StoreError> {
        let map = self.transactions.read().unwrap();
        ids.iter()
            .map(|id| {
                map.get(id)
                    .cloned()
                    .ok_or(StoreError::TransactionNotFound(*id))
            })
            .collect()
    }

    fn save_set(&self, txs: &[Transaction]) -> Result<(), StoreError> {
        let mut map = self.transactions.write().unwrap();
        // Validate first so a missing record cannot half-apply the set.
        for tx in txs {
            if !map.contains_key(&tx.id) {
                return Err(StoreError::TransactionNotFound(tx.id));
            }
        }
        for tx in txs {
            map.insert(tx.id, tx.clone());
        }
        Ok(())
    }

    fn list_for_organisation(&self, org: OrganisationId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .values()
            .filter(|tx| tx.organisation_id == org)
            .cloned()
            .collect())
    }
}

/// In-memory batch store.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    batches: RwLock<HashMap<BatchId, Batch>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl BatchStore for InMemoryBatchStore {
    fn insert(&self, batch: Batch) -> Result<(), StoreError> {
        let mut map = self.batches.write().unwrap();
        let id = *batch.id();
        if map.contains_key(&id) {
            return Err(StoreError::BatchAlreadyExists(id));
        }
        map.insert(id, batch);
        Ok(())
    }

    fn get(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        Ok(self.batches.read().unwrap().get(&id).cloned())
    }

    fn update(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut map = self.batches.write().unwrap();
        let id = *batch.id();
        if !map.contains_key(&id) {
            return Err(StoreError::BatchNotFound(id));
        }
        map.insert(id, batch.clone());
        Ok(())
    }

    fn list_for_organisation(&self, org: OrganisationId) -> Result<Vec<Batch>, StoreError> {
        Ok(self
            .batches
            .read()
            .unwrap()
            .values()
            .filter(|b| b.organisation_id() == org)
            .cloned()
            .collect())
    }

    fn list_by_status(&self, status: BatchStatus) -> Result<Vec<Batch>, StoreError> {
        Ok(self
            .batches
            .read()
            .unwrap()
            .values()
            .filter(|b| b.status() == status)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerseal_core::UserId;
    use ledgerseal_dispatch::{
        Account, AccountingPeriod, Document, FilteringParameters, ReconciliationState,
        TransactionItem, TransactionStatus, TransactionType, ValidationStatus,
    };

    fn tx(org: OrganisationId) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            organisation_id: org,
            internal_number: "TX-1".to_string(),
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            transaction_type: TransactionType::Journal,
            data_source: "csv".to_string(),
            document: Some(Document {
                number: "DOC-1".to_string(),
                currency: "EUR".to_string(),
                counterparty: None,
            }),
            items: vec![
                TransactionItem {
                    account: Account {
                        code: "1000".to_string(),
                        name: "Cash".to_string(),
                    },
                    amount_lcy: 100,
                    amount_fcy: 100,
                    fx_rate: "1.0".to_string(),
                    is_debit: true,
                    event_code: None,
                    cost_center: None,
                    project: None,
                    vat: None,
                },
                TransactionItem {
                    account: Account {
                        code: "2000".to_string(),
                        name: "Payables".to_string(),
                    },
                    amount_lcy: 100,
                    amount_fcy: 100,
                    fx_rate: "1.0".to_string(),
                    is_debit: false,
                    event_code: None,
                    cost_center: None,
                    project: None,
                    vat: None,
                },
            ],
            validation_status: ValidationStatus::Validated,
            status: TransactionStatus::Pending,
            reconciliation: ReconciliationState::default(),
        }
    }

    fn batch(org: OrganisationId, tx_ids: Vec<TransactionId>) -> Batch {
        let statuses: Vec<_> = tx_ids.iter().map(|_| TransactionStatus::Pending).collect();
        Batch::new(
            org,
            FilteringParameters {
                transaction_types: [TransactionType::Journal].into_iter().collect(),
                from_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                to_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                period_from: AccountingPeriod::new(2024, 3),
                period_to: AccountingPeriod::new(2024, 3),
                transaction_numbers: Default::default(),
            },
            tx_ids,
            "key".to_string(),
            UserId::new(),
            &statuses,
        )
    }

    #[test]
    fn get_set_preserves_order_and_rejects_missing_ids() {
        let store = InMemoryTransactionStore::new();
        let org = OrganisationId::new();

        let a = tx(org);
        let b = tx(org);
        store.upsert(a.clone()).unwrap();
        store.upsert(b.clone()).unwrap();

        let set = store.get_set(&[b.id, a.id]).unwrap();
        assert_eq!(set[0].id, b.id);
        assert_eq!(set[1].id, a.id);

        let missing = TransactionId::new();
        assert!(matches!(
            store.get_set(&[a.id, missing]),
            Err(StoreError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn save_set_does_not_half_apply() {
        let store = InMemoryTransactionStore::new();
        let org = OrganisationId::new();

        let mut a = tx(org);
        store.upsert(a.clone()).unwrap();

        let phantom = tx(org); // never inserted
        a.status = TransactionStatus::Approve;
        let result = store.save_set(&[a.clone(), phantom]);
        assert!(result.is_err());

        // The stored record still has its original status.
        let stored = store.get(a.id).unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }

    #[test]
    fn batch_insert_is_unique_and_update_requires_existence() {
        let store = InMemoryBatchStore::new();
        let org = OrganisationId::new();
        let b = batch(org, vec![TransactionId::new()]);

        store.insert(b.clone()).unwrap();
        assert!(matches!(
            store.insert(b.clone()),
            Err(StoreError::BatchAlreadyExists(_))
        ));

        let other = batch(org, vec![TransactionId::new()]);
        assert!(matches!(
            store.update(&other),
            Err(StoreError::BatchNotFound(_))
        ));
    }

    #[test]
    fn list_by_status_finds_in_flight_batches() {
        let store = InMemoryBatchStore::new();
        let org = OrganisationId::new();
        let b = batch(org, vec![TransactionId::new()]);
        store.insert(b).unwrap();

        assert_eq!(store.list_by_status(BatchStatus::Pending).unwrap().len(), 1);
        assert!(store.list_by_status(BatchStatus::Publish).unwrap().is_empty());
    }
}
