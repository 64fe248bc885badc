//! The end-to-end reconciliation pipeline.
//!
//! One linear batch run: read the ledger, build the in-memory stores,
//! snapshot them, fold in the feed, and emit the difference back to the
//! ledger. The snapshot taken after the ledger import is the unchanging
//! reference the exporter diffs against.

use crate::client::{AkahuClient, FireflyClient};
use crate::config::Config;
use crate::db::{AkahuCache, FireflyDatabase};
use crate::error::Result;
use crate::export::{export, ExportSummary, LedgerWriter};
use crate::import::{import_feed, import_ledger_accounts, import_ledger_transactions};
use crate::merge::merge_transactions;
use crate::store::{AccountStore, TransactionStore};

/// Counts of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Accounts imported from the ledger.
    pub ledger_accounts: usize,
    /// Transactions imported from the ledger.
    pub ledger_transactions: usize,
    /// Feed transactions considered (after transfer fusion).
    pub feed_transactions: usize,
    /// Write counts of the export phase.
    pub export: ExportSummary,
}

/// Runs the whole pipeline with the production collaborators.
///
/// # Errors
///
/// Returns the first fatal error: configuration problems, database or
/// feed decoding failures, and data-integrity violations. Remote-write
/// failures during export are logged and counted instead.
#[tracing::instrument(skip_all)]
pub fn run(config: &Config) -> Result<SyncSummary> {
    let cache = AkahuCache::open(&config.database_url)?;
    if config.load_akahu_data {
        tracing::info!("refreshing feed cache");
        let client = AkahuClient::builder()
            .app_token(&config.akahu_app_token)
            .user_token(&config.akahu_user_token)
            .build()?;
        cache.store_accounts(&client.accounts()?)?;
        cache.store_transactions(&client.transactions()?)?;
    }

    let writer = FireflyClient::builder()
        .base_url(&config.firefly_base_path)
        .token(&config.firefly_api_key)
        .build()?;
    let ledger = FireflyDatabase::open(&config.firefly_database_url)?;
    run_with(&ledger, &cache, &writer, config.dry_run)
}

/// Runs the pipeline against explicit collaborators; the seam used by
/// tests.
///
/// # Errors
///
/// Same as [`run`].
pub fn run_with<W: LedgerWriter>(
    ledger: &FireflyDatabase,
    cache: &AkahuCache,
    writer: &W,
    dry_run: bool,
) -> Result<SyncSummary> {
    let mut accounts = AccountStore::new();
    let mut transactions = TransactionStore::new();

    import_ledger_accounts(&mut accounts, &ledger.accounts()?)?;
    import_ledger_transactions(&mut transactions, &accounts, &ledger.transactions()?)?;
    tracing::info!(
        accounts = accounts.len(),
        transactions = transactions.len(),
        "ledger imported"
    );

    let original_accounts = accounts.duplicate();
    let original_transactions = transactions.duplicate();

    let feed_store = import_feed(&mut accounts, &cache.transactions()?)?;
    let feed_count = feed_store.len();
    tracing::info!(feed_transactions = feed_count, "feed imported");

    let outcome = merge_transactions(&mut transactions, feed_store, |_, _| true, |_, _| {})?;
    tracing::debug!(
        unmatched_ledger = outcome.unmatched_left.len(),
        new_from_feed = outcome.unmatched_right.len(),
        "merge complete"
    );

    let export_summary = export(
        &original_accounts,
        &mut accounts,
        &original_transactions,
        &transactions,
        writer,
        dry_run,
    )?;

    Ok(SyncSummary {
        ledger_accounts: original_accounts.len(),
        ledger_transactions: original_transactions.len(),
        feed_transactions: feed_count,
        export: export_summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::models::{AccountKind, AccountPayload, FireflyId, TransactionRequest};
    use serde_json::json;
    use std::cell::RefCell;

    /// Records writes instead of performing them.
    #[derive(Debug, Default)]
    struct RecordingWriter {
        calls: RefCell<Vec<String>>,
    }

    impl LedgerWriter for RecordingWriter {
        fn create_account(&self, kind: AccountKind, payload: &AccountPayload) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("create-account {kind} {}", payload.name));
            Ok(())
        }

        fn update_account(&self, external_id: FireflyId, payload: &AccountPayload) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("update-account {external_id} {}", payload.name));
            Ok(())
        }

        fn create_transaction(&self, request: &TransactionRequest) -> Result<()> {
            self.calls.borrow_mut().push(format!(
                "create-transaction {} {}",
                request.transactions[0].kind, request.transactions[0].external_id
            ));
            Ok(())
        }

        fn update_transaction(
            &self,
            external_id: FireflyId,
            request: &TransactionRequest,
        ) -> Result<()> {
            self.calls.borrow_mut().push(format!(
                "update-transaction {external_id} {}",
                request.transactions[0].external_id
            ));
            Ok(())
        }
    }

    /// Builds an in-memory ledger with one asset account tagged with a
    /// feed id.
    fn ledger_with_one_asset() -> FireflyDatabase {
        let ledger = FireflyDatabase::open(":memory:").unwrap();
        ledger
            .connection_for_tests()
            .execute_batch(
                "CREATE TABLE account_types (id INTEGER PRIMARY KEY, type TEXT NOT NULL);
                 CREATE TABLE accounts (
                     id INTEGER PRIMARY KEY, account_type_id INTEGER NOT NULL,
                     name TEXT NOT NULL, iban TEXT, deleted_at TEXT);
                 CREATE TABLE account_meta (
                     id INTEGER PRIMARY KEY, account_id INTEGER NOT NULL,
                     name TEXT NOT NULL, data TEXT NOT NULL);
                 CREATE TABLE notes (
                     id INTEGER PRIMARY KEY, noteable_id INTEGER NOT NULL,
                     noteable_type TEXT NOT NULL, text TEXT, deleted_at TEXT);
                 CREATE TABLE transaction_types (id INTEGER PRIMARY KEY, type TEXT NOT NULL);
                 CREATE TABLE transaction_currencies (id INTEGER PRIMARY KEY, code TEXT NOT NULL);
                 CREATE TABLE transaction_journals (
                     id INTEGER PRIMARY KEY, transaction_type_id INTEGER NOT NULL,
                     description TEXT NOT NULL, date TEXT NOT NULL, deleted_at TEXT);
                 CREATE TABLE transactions (
                     id INTEGER PRIMARY KEY, transaction_journal_id INTEGER NOT NULL,
                     account_id INTEGER NOT NULL, amount REAL NOT NULL,
                     foreign_amount REAL, foreign_currency_id INTEGER, deleted_at TEXT);
                 CREATE TABLE journal_meta (
                     id INTEGER PRIMARY KEY, transaction_journal_id INTEGER NOT NULL,
                     name TEXT NOT NULL, data TEXT NOT NULL, deleted_at TEXT);
                 CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                 CREATE TABLE category_transaction_journal (
                     category_id INTEGER NOT NULL, transaction_journal_id INTEGER NOT NULL);
                 INSERT INTO account_types (id, type) VALUES (1, 'Asset account');
                 INSERT INTO accounts (id, account_type_id, name, iban, deleted_at)
                     VALUES (1, 1, 'Cheque', NULL, NULL);
                 INSERT INTO notes (noteable_id, noteable_type, text, deleted_at)
                     VALUES (1, 'FireflyIII\\Models\\Account', '**Akahu ID** `acc_X`', NULL);",
            )
            .unwrap();
        ledger
    }

    fn cache_with_one_deposit() -> AkahuCache {
        let cache = AkahuCache::open(":memory:").unwrap();
        cache
            .store_transactions(&[json!({
                "_id": "trans_A1",
                "_account": "acc_X",
                "amount": 50.0,
                "date": "2024-01-02T10:30:00Z",
                "description": "Coffee shop"
            })])
            .unwrap();
        cache
    }

    #[test]
    fn fresh_ledger_one_feed_deposit_creates_account_and_transaction() {
        let ledger = ledger_with_one_asset();
        let cache = cache_with_one_deposit();
        let writer = RecordingWriter::default();

        let summary = run_with(&ledger, &cache, &writer, false).unwrap();
        assert_eq!(summary.ledger_accounts, 1);
        assert_eq!(summary.feed_transactions, 1);
        assert_eq!(summary.export.accounts_created, 1);
        assert_eq!(summary.export.transactions_created, 1);

        let calls = writer.calls.into_inner();
        assert_eq!(
            calls,
            vec![
                "create-account revenue Coffee shop".to_owned(),
                "create-transaction deposit trans_A1".to_owned(),
            ]
        );
    }

    #[test]
    fn rerun_against_same_cache_repeats_the_same_creates() {
        let cache = cache_with_one_deposit();
        let first = RecordingWriter::default();
        run_with(&ledger_with_one_asset(), &cache, &first, false).unwrap();
        let second = RecordingWriter::default();
        run_with(&ledger_with_one_asset(), &cache, &second, false).unwrap();
        assert_eq!(first.calls.into_inner(), second.calls.into_inner());
    }

    #[test]
    fn tagged_ledger_transaction_matches_feed_and_emits_nothing() {
        let ledger = ledger_with_one_asset();
        ledger
            .connection_for_tests()
            .execute_batch(
                "INSERT INTO account_types (id, type) VALUES (2, 'Revenue account');
                 INSERT INTO accounts (id, account_type_id, name, iban, deleted_at)
                     VALUES (2, 2, 'Coffee shop', NULL, NULL);
                 INSERT INTO transaction_types (id, type) VALUES (1, 'Deposit');
                 INSERT INTO transaction_journals (id, transaction_type_id, description, date, deleted_at)
                     VALUES (100, 1, 'Coffee shop', '2024-01-02 10:30:00', NULL);
                 INSERT INTO transactions (transaction_journal_id, account_id, amount, foreign_amount, foreign_currency_id, deleted_at)
                     VALUES (100, 2, -50.0, NULL, NULL, NULL),
                            (100, 1, 50.0, NULL, NULL, NULL);
                 INSERT INTO journal_meta (transaction_journal_id, name, data, deleted_at)
                     VALUES (100, 'external_id', '\"trans_A1,manual\"', NULL);",
            )
            .unwrap();
        let cache = cache_with_one_deposit();
        let writer = RecordingWriter::default();

        let summary = run_with(&ledger, &cache, &writer, false).unwrap();
        // The feed row fuses into the tagged ledger transaction, so the
        // diff is empty.
        assert!(writer.calls.into_inner().is_empty());
        assert_eq!(summary.export.transactions_unchanged, 1);
        assert_eq!(summary.export.transactions_created, 0);
        assert_eq!(summary.export.accounts_created, 0);
        assert_eq!(summary.export.accounts_updated, 0);
    }

    #[test]
    fn unknown_feed_account_aborts() {
        let ledger = ledger_with_one_asset();
        let cache = AkahuCache::open(":memory:").unwrap();
        cache
            .store_transactions(&[json!({
                "_id": "trans_B1",
                "_account": "acc_UNKNOWN",
                "amount": -10.0,
                "date": "2024-01-02T10:30:00Z",
                "description": "mystery"
            })])
            .unwrap();
        let writer = RecordingWriter::default();
        let err = run_with(&ledger, &cache, &writer, false).unwrap_err();
        assert!(matches!(err, SyncError::UnconfiguredAccount { .. }));
        assert!(writer.calls.into_inner().is_empty());
    }

    #[test]
    fn dry_run_emits_no_writes() {
        let ledger = ledger_with_one_asset();
        let cache = cache_with_one_deposit();
        let writer = RecordingWriter::default();
        let summary = run_with(&ledger, &cache, &writer, true).unwrap();
        assert_eq!(summary.export.accounts_created, 1);
        assert!(writer.calls.into_inner().is_empty());
    }
}
