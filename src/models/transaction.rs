//! Transaction model: one signed movement of value between two accounts
//! of the companion account store.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, AccountKind, AkahuId, FireflyId, TransactionId};
use crate::error::{Result, SyncError};

/// The ledger's transaction kind, determined by the (source kind,
/// destination kind) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money leaving an owned account.
    Withdrawal,
    /// Money entering an owned account.
    Deposit,
    /// Money moving between two owned accounts.
    Transfer,
}

impl TransactionKind {
    /// The lowercase type string the ledger's write API expects.
    #[inline]
    #[must_use]
    pub const fn as_api_type(self) -> &'static str {
        match self {
            Self::Withdrawal => "withdrawal",
            Self::Deposit => "deposit",
            Self::Transfer => "transfer",
        }
    }
}

impl core::fmt::Display for TransactionKind {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_api_type())
    }
}

/// Resolves the ledger transaction kind for a (source kind, destination
/// kind) pair.
///
/// # Errors
///
/// Returns [`SyncError::InvalidKind`] for pairs the ledger cannot
/// represent (anything out of an expense, anything into a revenue, and
/// revenue-to-expense).
pub fn transaction_kind(
    source_kind: AccountKind,
    destination_kind: AccountKind,
) -> Result<TransactionKind> {
    use AccountKind::{Asset, Expense, Liability, Revenue};
    match (source_kind, destination_kind) {
        (Asset, Asset) | (Liability, Liability) => Ok(TransactionKind::Transfer),
        (Asset, Liability | Expense) | (Liability, Expense) => Ok(TransactionKind::Withdrawal),
        (Liability | Revenue, Asset) | (Revenue, Liability) => Ok(TransactionKind::Deposit),
        _ => Err(SyncError::InvalidKind {
            source_kind,
            destination_kind,
        }),
    }
}

/// A transaction candidate before a store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Ledger-side primary key; present iff imported from the ledger.
    pub firefly_id: Option<FireflyId>,
    /// Feed transaction identifiers attached to this transaction. A
    /// fused transfer pair carries two.
    pub akahu_ids: BTreeSet<AkahuId>,
    /// Free-text description.
    pub description: String,
    /// Instant with minute precision. Whether the hour/minute is zero
    /// matters to the merger.
    pub date: DateTime<Utc>,
    /// Exact positive amount.
    pub amount: Decimal,
    /// Debit-side account in the companion account store.
    pub source_id: AccountId,
    /// Credit-side account in the companion account store.
    pub destination_id: AccountId,
    /// Foreign-currency amount; present together with the code.
    pub foreign_amount: Option<Decimal>,
    /// Foreign-currency code; present together with the amount.
    pub foreign_currency_code: Option<String>,
    /// Category name, if known.
    pub category_name: Option<String>,
}

impl NewTransaction {
    /// Creates a candidate with the mandatory fields and no optionals.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        date: DateTime<Utc>,
        amount: Decimal,
        source_id: AccountId,
        destination_id: AccountId,
    ) -> Self {
        Self {
            firefly_id: None,
            akahu_ids: BTreeSet::new(),
            description: description.into(),
            date,
            amount,
            source_id,
            destination_id,
            foreign_amount: None,
            foreign_currency_code: None,
            category_name: None,
        }
    }
}

/// One signed movement of value, as held by a transaction store.
///
/// `firefly_id` is write-once and `akahu_ids` may only grow; the store
/// rejects updates that violate either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Internal stable key, unique within one transaction store.
    pub id: TransactionId,
    /// Ledger-side primary key; present iff imported from the ledger.
    pub firefly_id: Option<FireflyId>,
    /// Feed transaction identifiers attached to this transaction.
    pub akahu_ids: BTreeSet<AkahuId>,
    /// Free-text description.
    pub description: String,
    /// Instant with minute precision.
    pub date: DateTime<Utc>,
    /// Exact positive amount.
    pub amount: Decimal,
    /// Debit-side account in the companion account store.
    pub source_id: AccountId,
    /// Credit-side account in the companion account store.
    pub destination_id: AccountId,
    /// Foreign-currency amount; present together with the code.
    pub foreign_amount: Option<Decimal>,
    /// Foreign-currency code; present together with the amount.
    pub foreign_currency_code: Option<String>,
    /// Category name, if known.
    pub category_name: Option<String>,
}

impl Transaction {
    /// Builds a stored transaction from a candidate and a freshly
    /// assigned id.
    pub(crate) fn from_new(id: TransactionId, new: NewTransaction) -> Self {
        Self {
            id,
            firefly_id: new.firefly_id,
            akahu_ids: new.akahu_ids,
            description: new.description,
            date: new.date,
            amount: new.amount,
            source_id: new.source_id,
            destination_id: new.destination_id,
            foreign_amount: new.foreign_amount,
            foreign_currency_code: new.foreign_currency_code,
            category_name: new.category_name,
        }
    }

    /// Re-wraps this transaction as a candidate for insertion into
    /// another store, dropping the internal id.
    #[must_use]
    pub fn as_new(&self) -> NewTransaction {
        NewTransaction {
            firefly_id: self.firefly_id,
            akahu_ids: self.akahu_ids.clone(),
            description: self.description.clone(),
            date: self.date,
            amount: self.amount,
            source_id: self.source_id,
            destination_id: self.destination_id,
            foreign_amount: self.foreign_amount,
            foreign_currency_code: self.foreign_currency_code.clone(),
            category_name: self.category_name.clone(),
        }
    }
}
