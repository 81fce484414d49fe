//! Filtering parameters: which transactions qualify for a batch.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ledgerseal_core::ValueObject;

use crate::transaction::{Transaction, TransactionType};

/// Accounting period (year-month), inclusive range endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub year: i32,
    /// 1-12.
    pub month: u32,
}

impl AccountingPeriod {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

impl core::fmt::Display for AccountingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Value object identifying the transactions eligible for a batch.
///
/// Two batches for the same organisation must never hold overlapping
/// parameter windows that could include the same transaction twice; see
/// [`FilteringParameters::overlaps`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteringParameters {
    /// Eligible transaction types; must be non-empty.
    pub transaction_types: BTreeSet<TransactionType>,
    /// Entry-date window, inclusive.
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    /// Accounting-period window, inclusive.
    pub period_from: AccountingPeriod,
    pub period_to: AccountingPeriod,
    /// Optional explicit transaction-number filter; empty = no restriction.
    pub transaction_numbers: BTreeSet<String>,
}

impl ValueObject for FilteringParameters {}

impl FilteringParameters {
    /// Whether a transaction qualifies under these parameters.
    pub fn matches(&self, tx: &Transaction) -> bool {
        if !self.transaction_types.contains(&tx.transaction_type) {
            return false;
        }
        if tx.entry_date < self.from_date || tx.entry_date > self.to_date {
            return false;
        }
        if !self.transaction_numbers.is_empty()
            && !self.transaction_numbers.contains(&tx.internal_number)
        {
            return false;
        }
        true
    }

    /// Overlap predicate used to reject double-publishing windows.
    ///
    /// Two parameter sets overlap when their date windows intersect and their
    /// type sets intersect, or when both explicitly name a common transaction
    /// number. Explicit number sets that are disjoint never overlap, even on
    /// intersecting windows.
    pub fn overlaps(&self, other: &FilteringParameters) -> bool {
        let both_explicit =
            !self.transaction_numbers.is_empty() && !other.transaction_numbers.is_empty();
        if both_explicit {
            return self
                .transaction_numbers
                .intersection(&other.transaction_numbers)
                .next()
                .is_some();
        }

        let dates_intersect = self.from_date <= other.to_date && other.from_date <= self.to_date;
        if !dates_intersect {
            return false;
        }

        self.transaction_types
            .intersection(&other.transaction_types)
            .next()
            .is_some()
    }

    /// Stable byte encoding used in the assembly idempotency key.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for ty in &self.transaction_types {
            out.extend_from_slice(ty.canonical_name().as_bytes());
            out.push(b',');
        }
        out.extend_from_slice(self.from_date.to_string().as_bytes());
        out.push(b'|');
        out.extend_from_slice(self.to_date.to_string().as_bytes());
        out.push(b'|');
        out.extend_from_slice(self.period_from.to_string().as_bytes());
        out.push(b'|');
        out.extend_from_slice(self.period_to.to_string().as_bytes());
        out.push(b'|');
        for num in &self.transaction_numbers {
            out.extend_from_slice(num.as_bytes());
            out.push(b',');
        }
        out
    }
}
