//! Batch assembly: grouping eligible transactions into a new batch.

use sha2::{Digest, Sha256};
use tracing::info;

use ledgerseal_core::{AggregateRoot, BatchId, OrganisationId, UserId};

use crate::batch::Batch;
use crate::error::{DispatchError, DispatchResult};
use crate::filtering::FilteringParameters;
use crate::transaction::{Transaction, TransactionStatus, ValidationStatus};

/// Outcome of an assembly request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// Idempotent re-assembly: the same transaction-id set and parameters
    /// already produced this batch.
    Existing(BatchId),
    /// A freshly assembled batch plus its constituent transactions with the
    /// assembly-owned status fields set.
    New {
        batch: Batch,
        transactions: Vec<Transaction>,
    },
}

/// Stateless assembly service.
///
/// The assembler is pure: the caller loads the candidate transactions and
/// the organisation's existing batches, and persists whatever comes back.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchAssembler;

impl BatchAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Assemble a batch from `candidates` under `parameters`.
    ///
    /// `existing` must hold every non-superseded batch of the organisation;
    /// it drives both the idempotency lookup and the overlapping-window
    /// check (only non-terminal batches count for overlap).
    pub fn assemble(
        &self,
        organisation_id: OrganisationId,
        parameters: FilteringParameters,
        candidates: Vec<Transaction>,
        existing: &[Batch],
        actor: UserId,
    ) -> DispatchResult<Assembly> {
        let mut eligible: Vec<Transaction> = candidates
            .into_iter()
            .filter(|tx| tx.organisation_id == organisation_id && parameters.matches(tx))
            .collect();

        if eligible.is_empty() {
            return Err(DispatchError::EmptySet);
        }

        // Canonical in-batch order; part of the reproducible-hash contract.
        eligible.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));

        for tx in &mut eligible {
            tx.status = match tx.validation_status {
                ValidationStatus::Failed => TransactionStatus::Invalid,
                ValidationStatus::Validated if !tx.is_balanced() => TransactionStatus::Invalid,
                ValidationStatus::Validated => TransactionStatus::Pending,
            };
        }

        let key = idempotency_key(&eligible, &parameters);

        if let Some(batch) = existing
            .iter()
            .find(|b| !b.is_superseded() && b.idempotency_key() == key)
        {
            info!(
                organisation_id = %organisation_id,
                batch_id = %batch.id(),
                "assembly matched existing batch"
            );
            return Ok(Assembly::Existing(*batch.id()));
        }

        if let Some(batch) = existing
            .iter()
            .find(|b| !b.is_superseded() && !b.status().is_terminal() && parameters.overlaps(b.parameters()))
        {
            return Err(DispatchError::OverlappingWindow {
                existing: *batch.id(),
            });
        }

        let statuses: Vec<TransactionStatus> = eligible.iter().map(|tx| tx.status).collect();
        let ids = eligible.iter().map(|tx| tx.id).collect();
        let batch = Batch::new(organisation_id, parameters, ids, key, actor, &statuses);

        info!(
            organisation_id = %organisation_id,
            batch_id = %batch.id(),
            transactions = eligible.len(),
            "assembled new batch"
        );

        Ok(Assembly::New {
            batch,
            transactions: eligible,
        })
    }
}

/// Idempotency key: SHA-256 over the sorted transaction ids and the
/// canonical parameter bytes.
fn idempotency_key(ordered: &[Transaction], parameters: &FilteringParameters) -> String {
    let mut ids: Vec<String> = ordered.iter().map(|tx| tx.id.to_string()).collect();
    ids.sort();

    let mut hasher = Sha256::new();
    for id in &ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(parameters.canonical_bytes());
    hex::encode(hasher.finalize())
}
