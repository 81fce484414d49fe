//! Canonical byte form + content hash of a transaction set.
//!
//! The published on-chain fingerprint must be independently reproducible by
//! any third party holding the same transaction data, so the encoding is
//! fully deterministic: transactions sorted by (entry date, internal number),
//! a fixed field order, length-framed fields, amounts as fixed-point minor
//! units and dates as ISO-8601. No locale, timezone or float formatting can
//! leak in.

use sha2::{Digest, Sha256};

use crate::error::{DispatchError, DispatchResult};
use crate::transaction::{Transaction, TransactionItem};

/// Encoding version tag; bump on any change to the byte layout.
const CANONICAL_VERSION: &[u8] = b"ledgerseal-canonical-v1";

fn put(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put(out, s.as_bytes());
}

fn put_opt(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(v) => {
            out.push(1);
            put_str(out, v);
        }
        None => out.push(0),
    }
}

fn encode_item(out: &mut Vec<u8>, item: &TransactionItem) -> DispatchResult<()> {
    if item.account.code.is_empty() {
        return Err(DispatchError::Canonicalization(
            "item account code is empty".to_string(),
        ));
    }
    if item.fx_rate.is_empty() {
        return Err(DispatchError::Canonicalization(
            "item fx rate is empty".to_string(),
        ));
    }

    put_str(out, &item.account.code);
    put_str(out, &item.account.name);
    put(out, &item.amount_lcy.to_be_bytes());
    put(out, &item.amount_fcy.to_be_bytes());
    put_str(out, &item.fx_rate);
    out.push(u8::from(item.is_debit));
    put_opt(out, item.event_code.as_deref());
    put_opt(out, item.cost_center.as_deref());
    put_opt(out, item.project.as_deref());
    match &item.vat {
        Some(vat) => {
            out.push(1);
            put_str(out, &vat.code);
            match vat.rate_bp {
                Some(bp) => {
                    out.push(1);
                    put(out, &bp.to_be_bytes());
                }
                None => out.push(0),
            }
        }
        None => out.push(0),
    }
    Ok(())
}

fn encode_transaction(out: &mut Vec<u8>, tx: &Transaction) -> DispatchResult<()> {
    let document = tx.document.as_ref().ok_or_else(|| {
        DispatchError::Canonicalization(format!("transaction {} has no document", tx.id))
    })?;
    if tx.items.is_empty() {
        return Err(DispatchError::Canonicalization(format!(
            "transaction {} has no items",
            tx.id
        )));
    }

    put_str(out, &tx.internal_number);
    // ISO-8601 calendar date; entry dates carry no time component.
    put_str(out, &tx.entry_date.format("%Y-%m-%d").to_string());
    put_str(out, tx.transaction_type.canonical_name());
    put_str(out, &document.number);
    put_str(out, &document.currency);
    match &document.counterparty {
        Some(cp) => {
            out.push(1);
            put_str(out, cp.kind.canonical_name());
            put_opt(out, cp.name.as_deref());
        }
        None => out.push(0),
    }

    out.extend_from_slice(&(tx.items.len() as u32).to_be_bytes());
    for item in &tx.items {
        encode_item(out, item)?;
    }
    Ok(())
}

/// Map an ordered transaction set to its canonical byte representation.
///
/// Input ordering does not matter; the encoder sorts by (entry date,
/// internal number) itself so semantically identical sets always produce
/// identical bytes.
pub fn canonicalize(transactions: &[Transaction]) -> DispatchResult<Vec<u8>> {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));

    let mut out = Vec::new();
    put(&mut out, CANONICAL_VERSION);
    out.extend_from_slice(&(ordered.len() as u32).to_be_bytes());
    for tx in ordered {
        encode_transaction(&mut out, tx)?;
    }
    Ok(out)
}

/// SHA-256 content hash over the canonical form, hex-encoded.
///
/// This is the fingerprint anchored on the ledger.
pub fn content_hash(transactions: &[Transaction]) -> DispatchResult<String> {
    let bytes = canonicalize(transactions)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}
