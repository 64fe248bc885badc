//! Data models for the reconciliation pipeline.
//!
//! This module contains the in-memory account and transaction entities,
//! newtype ID wrappers, the raw feed-record mirrors, and the ledger row
//! and write-payload types.

mod account;
mod akahu;
mod firefly;
mod ids;
mod transaction;

pub use account::{Account, AccountKind, AccountRole, NewAccount};
pub use akahu::{
    FeedAccount, FeedCategory, FeedCategoryGroup, FeedCategoryGroups, FeedConversion, FeedMerchant,
    FeedMeta, FeedTransaction,
};
pub use firefly::{
    AccountCreateRequest, AccountPayload, AccountRow, TransactionRequest, TransactionRow,
    TransactionSplit,
};
pub use ids::{AccountId, AkahuId, FireflyId, TransactionId};
pub use transaction::{transaction_kind, NewTransaction, Transaction, TransactionKind};
