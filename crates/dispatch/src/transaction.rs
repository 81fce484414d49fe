//! Accounting transaction model.
//!
//! Business fields are immutable once ingested; the dispatch core only ever
//! mutates the status/reconciliation fields it owns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ledgerseal_core::{Entity, OrganisationId, TransactionId};

/// High-level accounting transaction type (closed set, from the source ERP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    CardCharge,
    VendorBill,
    VendorPayment,
    BillCredit,
    ExpenseReport,
    Journal,
    FxRevaluation,
    Transfer,
    CustomerPayment,
}

impl TransactionType {
    /// Stable wire name used in the canonical encoding.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            TransactionType::CardCharge => "CardCharge",
            TransactionType::VendorBill => "VendorBill",
            TransactionType::VendorPayment => "VendorPayment",
            TransactionType::BillCredit => "BillCredit",
            TransactionType::ExpenseReport => "ExpenseReport",
            TransactionType::Journal => "Journal",
            TransactionType::FxRevaluation => "FxRevaluation",
            TransactionType::Transfer => "Transfer",
            TransactionType::CustomerPayment => "CustomerPayment",
        }
    }
}

/// Outcome of ingestion-side validation (set before the core ever sees the
/// transaction; read-only here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Validated,
    Failed,
}

/// Per-transaction processing status, mirroring a subset of the batch
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Invalid,
    Pending,
    Approve,
    Publish,
    Published,
}

impl TransactionStatus {
    /// Only validated, not-yet-dispatched transactions move forward.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Approve)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Invalid | TransactionStatus::Published)
    }
}

/// Account identifier + display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1000"
    pub name: String, // e.g. "Cash"
}

/// VAT classification on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vat {
    pub code: String,
    /// Rate in basis points (e.g. 2000 = 20%). Kept integral so canonical
    /// bytes stay float-free.
    pub rate_bp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyKind {
    Vendor,
    Employee,
    Customer,
}

impl CounterpartyKind {
    /// Stable wire name used in the canonical encoding.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            CounterpartyKind::Vendor => "Vendor",
            CounterpartyKind::Employee => "Employee",
            CounterpartyKind::Customer => "Customer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub kind: CounterpartyKind,
    pub name: Option<String>,
}

/// Source document reference (invoice, bill, journal voucher, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub number: String,
    /// Document (FCY) currency code, ISO 4217.
    pub currency: String,
    pub counterparty: Option<Counterparty>,
}

/// One side of a transaction (immutable business data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionItem {
    pub account: Account,
    /// Positive amount in functional-currency minor units (e.g. cents).
    pub amount_lcy: i64,
    /// Positive amount in document-currency minor units.
    pub amount_fcy: i64,
    /// FX rate as a decimal string ("1.0", "0.9213"); never a float.
    pub fx_rate: String,
    /// true = debit, false = credit.
    pub is_debit: bool,
    pub event_code: Option<String>,
    pub cost_center: Option<String>,
    pub project: Option<String>,
    pub vat: Option<Vat>,
}

/// Closed taxonomy of reconciliation/dispatch rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    /// On-chain hash differs from the re-derived expected hash.
    HashMismatch,
    /// The stored transaction set no longer matches the sealed hash.
    LateMutationDetected,
    /// A dispatch was found without a persisted submission record.
    OrphanedSubmission,
    /// Confirmation polling exceeded its bounded timeout.
    ConfirmationTimeout,
    /// The submission retry budget was exhausted against the backend.
    SubmissionRetriesExhausted,
    /// The backend reported a permanent submission failure.
    SubmissionFailed,
}

/// Final verdict of reconciling source (expected) vs sink (observed) hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationFinalStatus {
    Matched,
    Mismatched,
}

/// Core-owned reconciliation fields on a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationState {
    /// Expected hash, re-derived from the stored transaction set.
    pub source: Option<String>,
    /// Observed hash, as recorded on the ledger.
    pub sink: Option<String>,
    pub final_status: Option<ReconciliationFinalStatus>,
    pub rejection_codes: Vec<RejectionCode>,
}

/// An accounting transaction as handed over by ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub organisation_id: OrganisationId,
    /// Internal (ERP) transaction number; part of the canonical ordering key.
    pub internal_number: String,
    pub entry_date: NaiveDate,
    pub transaction_type: TransactionType,
    /// Label of the ingestion source (e.g. "netsuite", "csv").
    pub data_source: String,
    pub document: Option<Document>,
    pub items: Vec<TransactionItem>,

    pub validation_status: ValidationStatus,
    pub status: TransactionStatus,
    pub reconciliation: ReconciliationState,
}

impl Transaction {
    /// Double-entry invariant: debit total equals credit total over the item
    /// set, in functional currency.
    pub fn is_balanced(&self) -> bool {
        let mut debit: i128 = 0;
        let mut credit: i128 = 0;
        for item in &self.items {
            if item.is_debit {
                debit += item.amount_lcy as i128;
            } else {
                credit += item.amount_lcy as i128;
            }
        }
        debit == credit
    }

    /// Ordering key inside a batch: (entry date, internal number) ascending.
    pub fn ordering_key(&self) -> (NaiveDate, &str) {
        (self.entry_date, self.internal_number.as_str())
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
