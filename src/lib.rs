//! Reconciles a Firefly III ledger against the Akahu bank-aggregation feed.
//!
//! The crate imports the ledger's accounts and transactions, imports the
//! cached feed transactions for the same user, resolves which feed rows
//! correspond to which ledger rows (promoting or creating counterparty
//! account roles where necessary), fuses internal transfers, merges the
//! two transaction collections, and emits the minimal set of create and
//! update calls back to the ledger's write API.
//!
//! # Architecture
//!
//! - [`models`] - Core data types: accounts, transactions, raw feed
//!   records, ledger rows and write payloads
//! - [`identity`] - Bank-number canonicalization, name normalization and
//!   bigram similarity
//! - [`store`] - Indexed in-memory account and transaction stores
//! - [`import`] - Ledger and feed importers, counterparty matching and
//!   internal-transfer fusion
//! - [`merge`] - The structural-key transaction merger
//! - [`export`] - Change detection and minimal mutation emission
//! - [`client`] - Blocking HTTP clients for the Firefly write API and
//!   the Akahu feed API
//! - [`db`] - SQLite access: the ledger database reader and the feed
//!   cache
//! - [`config`] - Environment-driven configuration
//! - [`sync`] - The end-to-end pipeline

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod identity;
pub mod import;
pub mod merge;
pub mod models;
pub mod store;
pub mod sync;
