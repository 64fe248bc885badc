//! Ledger-side contracts: the rows the database reader yields and the
//! payloads the write API accepts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::FireflyId;

/// One account row from the ledger database, soft-deleted rows already
/// filtered out by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    /// Primary key of the account.
    pub id: FireflyId,
    /// The ledger's account-type string (e.g. "Asset account").
    pub account_type: String,
    /// Display name.
    pub name: String,
    /// IBAN, where configured. Carried for completeness; feed accounts
    /// are identified by their local bank numbers.
    pub iban: Option<String>,
    /// Comma-separated bank account numbers.
    pub account_number: Option<String>,
    /// External identifier stored on the account.
    pub external_id: Option<String>,
    /// Free-text notes, possibly embedding identity hint blocks.
    pub notes: Option<String>,
}

/// One transaction row from the ledger database: the journal joined
/// with its destination-side split.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    /// Primary key of the journal.
    pub id: FireflyId,
    /// The ledger's transaction-type string (e.g. "Withdrawal").
    pub transaction_type: String,
    /// Description line.
    pub description: String,
    /// Booking instant.
    pub date: DateTime<Utc>,
    /// Signed destination-side amount, rounded to two decimal places.
    pub amount: Decimal,
    /// Ledger account id of the debit side.
    pub source_id: FireflyId,
    /// Ledger account id of the credit side.
    pub destination_id: FireflyId,
    /// Foreign-currency amount, if any.
    pub foreign_amount: Option<Decimal>,
    /// Foreign-currency code, if any.
    pub foreign_currency_code: Option<String>,
    /// Comma-separated external identifier list.
    pub external_id: Option<String>,
    /// Category name, if any.
    pub category_name: Option<String>,
}

/// The account payload sent to both the create and update endpoints.
///
/// The exporter compares payloads for byte equality to decide whether a
/// write is needed at all, so every field is already in its final wire
/// form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPayload {
    /// Display name.
    pub name: String,
    /// Sorted, comma-joined canonical bank numbers.
    pub account_number: String,
    /// Rebuilt notes field, absent when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One split of a transaction write request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSplit {
    /// Transaction kind ("withdrawal", "deposit" or "transfer").
    #[serde(rename = "type")]
    pub kind: String,
    /// Sorted, comma-joined feed transaction identifiers.
    pub external_id: String,
    /// Description line.
    pub description: String,
    /// ISO-8601 booking instant.
    pub date: String,
    /// Stringified exact amount.
    pub amount: String,
    /// Ledger id of the debit-side account, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Debit-side account name, used when no ledger id exists yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// Ledger id of the credit-side account, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    /// Credit-side account name, used when no ledger id exists yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    /// Stringified foreign amount, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_amount: Option<String>,
    /// Foreign-currency code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_currency_code: Option<String>,
    /// Category name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

/// A transaction write request wrapping a single split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Let the ledger run its rule engine on the write.
    pub apply_rules: bool,
    /// Let the ledger fire its webhooks on the write.
    pub fire_webhooks: bool,
    /// The splits; this pipeline always sends exactly one.
    pub transactions: Vec<TransactionSplit>,
}

impl TransactionRequest {
    /// Wraps a single split with the pipeline's fixed flags.
    #[inline]
    #[must_use]
    pub fn single(split: TransactionSplit) -> Self {
        Self {
            apply_rules: true,
            fire_webhooks: true,
            transactions: vec![split],
        }
    }
}

/// An account create request: the shared payload plus the account type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountCreateRequest<'a> {
    /// The shared payload fields.
    #[serde(flatten)]
    pub payload: &'a AccountPayload,
    /// Lowercase account type for the create endpoint.
    #[serde(rename = "type")]
    pub kind: &'a str,
}
