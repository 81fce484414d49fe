//! Signer/backend capability interface.
//!
//! The core treats the chain-interaction channel as untrusted: possibly
//! slow, possibly duplicating, never consulted for consensus. Signing keys
//! live entirely behind this seam.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::Digest;
use thiserror::Error;

use ledgerseal_core::{BatchId, OrganisationId};

/// Metadata payload anchored on the ledger for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPayload {
    pub batch_id: BatchId,
    pub organisation_id: OrganisationId,
    /// Hex-encoded SHA-256 content hash of the sealed batch.
    pub content_hash: String,
}

/// An opaque signed ledger transaction, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx(pub Vec<u8>);

/// Backend-assigned identifier of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl core::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confirmation state of a submitted ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Not yet visible / not enough finality.
    Pending,
    /// Confirmed; carries the hash the ledger recorded in the anchor
    /// metadata (the reconciliation sink).
    Confirmed { hash: String },
    /// The network dropped or rejected the transaction.
    Failed { reason: String },
}

/// Backend call failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Worth retrying (network blip, mempool congestion, node restart).
    #[error("transient backend error: {0}")]
    Transient(String),
    /// Retrying cannot help (malformed tx, rejected signature).
    #[error("permanent backend error: {0}")]
    Permanent(String),
}

/// External signer + ledger backend.
///
/// Calls are blocking; workers own the waiting. Implementations must accept
/// duplicate `query_confirmation` calls for the same submission.
pub trait LedgerBackend: Send + Sync {
    /// Sign an anchoring transaction embedding the payload as metadata.
    fn sign(&self, payload: &AnchorPayload) -> Result<SignedTx, BackendError>;

    /// Submit to the ledger network; acceptance yields a submission id.
    fn submit(&self, tx: &SignedTx) -> Result<SubmissionId, BackendError>;

    /// Query the confirmation state of an accepted submission.
    fn query_confirmation(&self, id: &SubmissionId) -> Result<Confirmation, BackendError>;
}

/// Scripted response for [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub enum SubmitScript {
    Accept,
    Transient(String),
    Permanent(String),
}

/// Deterministic fake backend for tests.
///
/// `submit` consumes scripted outcomes in order (defaulting to acceptance),
/// `query_confirmation` consumes scripted confirmation states in order
/// (defaulting to `Pending`). An optional artificial submit delay makes the
/// single-flight window wide enough to race against in tests.
#[derive(Default)]
pub struct ScriptedBackend {
    submits: Mutex<VecDeque<SubmitScript>>,
    confirmations: Mutex<VecDeque<Result<Confirmation, BackendError>>>,
    submit_delay: Option<Duration>,
    submissions: Mutex<Vec<AnchorPayload>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub fn script_submit(&self, outcome: SubmitScript) {
        self.submits.lock().unwrap().push_back(outcome);
    }

    pub fn script_confirmation(&self, outcome: Result<Confirmation, BackendError>) {
        self.confirmations.lock().unwrap().push_back(outcome);
    }

    /// Payloads that reached `sign` (i.e. submission attempts).
    pub fn seen_payloads(&self) -> Vec<AnchorPayload> {
        self.submissions.lock().unwrap().clone()
    }
}

impl LedgerBackend for ScriptedBackend {
    fn sign(&self, payload: &AnchorPayload) -> Result<SignedTx, BackendError> {
        self.submissions.lock().unwrap().push(payload.clone());
        Ok(SignedTx(
            serde_json::to_vec(payload)
                .map_err(|e| BackendError::Permanent(format!("serialize payload: {e}")))?,
        ))
    }

    fn submit(&self, tx: &SignedTx) -> Result<SubmissionId, BackendError> {
        if let Some(delay) = self.submit_delay {
            std::thread::sleep(delay);
        }
        let script = self
            .submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitScript::Accept);
        match script {
            SubmitScript::Accept => {
                let digest = sha2::Sha256::digest(&tx.0);
                Ok(SubmissionId(hex::encode(digest)))
            }
            SubmitScript::Transient(reason) => Err(BackendError::Transient(reason)),
            SubmitScript::Permanent(reason) => Err(BackendError::Permanent(reason)),
        }
    }

    fn query_confirmation(&self, _id: &SubmissionId) -> Result<Confirmation, BackendError> {
        self.confirmations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Confirmation::Pending))
    }
}
