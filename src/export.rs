//! Exporter: compares the original snapshot against the modified state
//! and emits the minimal set of create/update calls to the ledger.
//!
//! Writes are best-effort: a failed remote call is logged with its
//! payload and the loop continues with the next entity. Re-running the
//! pipeline is idempotent, so nothing is rolled back.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SyncError};
use crate::models::{
    transaction_kind, Account, AccountKind, AccountPayload, AccountRole, FireflyId, Transaction,
    TransactionRequest, TransactionSplit,
};
use crate::store::{AccountStore, TransactionStore};

/// The ledger write operations the exporter needs.
///
/// Implemented by the HTTP client and by test doubles.
pub trait LedgerWriter {
    /// Creates an account of the given kind.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote call fails.
    fn create_account(&self, kind: AccountKind, payload: &AccountPayload) -> Result<()>;

    /// Updates the account backing the given ledger row.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote call fails.
    fn update_account(&self, external_id: FireflyId, payload: &AccountPayload) -> Result<()>;

    /// Creates a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote call fails.
    fn create_transaction(&self, request: &TransactionRequest) -> Result<()>;

    /// Updates the transaction backing the given ledger row.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote call fails.
    fn update_transaction(&self, external_id: FireflyId, request: &TransactionRequest)
        -> Result<()>;
}

/// Write counts of one export run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Account create calls issued.
    pub accounts_created: usize,
    /// Account update calls issued.
    pub accounts_updated: usize,
    /// Account sides skipped because their payload was unchanged.
    pub accounts_unchanged: usize,
    /// Transaction create calls issued.
    pub transactions_created: usize,
    /// Transaction update calls issued.
    pub transactions_updated: usize,
    /// Transactions skipped because their payload was unchanged.
    pub transactions_unchanged: usize,
    /// Remote calls that failed and were skipped over.
    pub failed_writes: usize,
}

/// Prior `**Akahu ID**` block inside a notes field.
static AKAHU_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n*\*\*Akahu ID\*\* `[^`]*`").expect("valid akahu block pattern"));

/// Prior `**Alternate names**` block inside a notes field.
static ALTERNATE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n*\*\*Alternate names\*\*(?:\n-[ \t]*`[^`]*`)+")
        .expect("valid alternate block pattern")
});

/// Diffs the modified stores against their original snapshots and
/// writes what changed, in insertion order: accounts first, then
/// transactions.
///
/// With `dry_run` the remote calls are suppressed but the comparison,
/// logging and counting still happen.
///
/// # Errors
///
/// Returns an error on broken referential integrity (a transaction
/// pointing at a missing account) or an invalid kind-table pair.
/// Remote-write failures do not error; they are logged and counted.
#[tracing::instrument(skip_all)]
pub fn export<W: LedgerWriter>(
    original_accounts: &AccountStore,
    modified_accounts: &mut AccountStore,
    original_transactions: &TransactionStore,
    modified_transactions: &TransactionStore,
    writer: &W,
    dry_run: bool,
) -> Result<ExportSummary> {
    synthesize_missing_roles(modified_accounts, modified_transactions)?;

    let mut summary = ExportSummary::default();
    for account in modified_accounts.iter() {
        if let Some(role) = account.source.clone() {
            emit_account_side(
                original_accounts,
                &account,
                &role,
                Side::Source,
                writer,
                dry_run,
                &mut summary,
            );
        }
        if let Some(role) = account.destination.clone() {
            // Owned accounts were already written through their source
            // role; only a distinct expense row needs its own write.
            if role.kind == AccountKind::Expense {
                emit_account_side(
                    original_accounts,
                    &account,
                    &role,
                    Side::Destination,
                    writer,
                    dry_run,
                    &mut summary,
                );
            }
        }
    }

    for transaction in modified_transactions.iter() {
        emit_transaction(
            original_transactions,
            modified_accounts,
            &transaction,
            writer,
            dry_run,
            &mut summary,
        )?;
    }
    Ok(summary)
}

/// Which role of an account is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Destination,
}

/// Guarantees the kind table resolves for every transaction: accounts
/// missing a required role get one synthesized in place.
fn synthesize_missing_roles(
    accounts: &mut AccountStore,
    transactions: &TransactionStore,
) -> Result<()> {
    for transaction in transactions.iter() {
        let mut source = accounts
            .get(transaction.source_id)
            .ok_or(SyncError::UnknownId {
                entity: "account",
                id: transaction.source_id.into_inner(),
            })?;
        if source.source.is_none() {
            source.source = Some(AccountRole::new(AccountKind::Revenue));
            accounts.save(source)?;
        }
        let mut destination =
            accounts
                .get(transaction.destination_id)
                .ok_or(SyncError::UnknownId {
                    entity: "account",
                    id: transaction.destination_id.into_inner(),
                })?;
        if destination.destination.is_none() {
            destination.destination = Some(AccountRole::new(AccountKind::Expense));
            accounts.save(destination)?;
        }
    }
    Ok(())
}

/// Builds the wire payload of one account side.
fn account_payload(account: &Account, role: &AccountRole) -> AccountPayload {
    AccountPayload {
        name: account.name.clone(),
        account_number: account
            .bank_numbers
            .iter()
            .cloned()
            .collect::<Vec<String>>()
            .join(","),
        notes: rebuild_notes(role.notes.as_deref(), account),
    }
}

/// Rebuilds an account's notes field: prior identity blocks are
/// stripped, then the current feed id and alternate names (other than
/// the primary) are appended. Backticks inside names become
/// apostrophes.
fn rebuild_notes(prior: Option<&str>, account: &Account) -> Option<String> {
    let mut notes = prior.unwrap_or_default().to_owned();
    notes = AKAHU_BLOCK_RE.replace_all(&notes, "").into_owned();
    notes = ALTERNATE_BLOCK_RE.replace_all(&notes, "").into_owned();
    if let Some(akahu) = &account.akahu_id {
        notes.push_str("\n\n**Akahu ID** `");
        notes.push_str(akahu.as_str());
        notes.push('`');
    }
    let primary = account.normalized_name();
    let alternates: Vec<&str> = account
        .alternate_names
        .iter()
        .filter(|(normalized, _)| **normalized != primary)
        .map(|(_, display)| display.as_str())
        .collect();
    if !alternates.is_empty() {
        notes.push_str("\n\n**Alternate names**");
        for name in alternates {
            notes.push_str("\n- `");
            notes.push_str(&name.replace('`', "'"));
            notes.push('`');
        }
    }
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Emits one side of one account, skipping byte-identical payloads.
#[allow(
    clippy::too_many_arguments,
    reason = "flat emission parameters beat a context struct used once"
)]
fn emit_account_side<W: LedgerWriter>(
    original_accounts: &AccountStore,
    account: &Account,
    role: &AccountRole,
    side: Side,
    writer: &W,
    dry_run: bool,
    summary: &mut ExportSummary,
) {
    let payload = account_payload(account, role);
    let original_payload = original_accounts.get(account.id).and_then(|original| {
        let original_role = match side {
            Side::Source => original.source.clone(),
            Side::Destination => original.destination.clone(),
        };
        original_role.map(|role| account_payload(&original, &role))
    });
    if original_payload.as_ref() == Some(&payload) {
        summary.accounts_unchanged += 1;
        return;
    }

    if dry_run {
        tracing::info!(name = %payload.name, external_id = ?role.external_id, "dry-run: account write suppressed");
    }
    let is_update = role.external_id.is_some();
    let result = if dry_run {
        Ok(())
    } else {
        match role.external_id {
            Some(external_id) => writer.update_account(external_id, &payload),
            None => writer.create_account(role.kind, &payload),
        }
    };
    match result {
        Ok(()) if is_update => summary.accounts_updated += 1,
        Ok(()) => summary.accounts_created += 1,
        Err(err) => {
            tracing::error!(error = %err, payload = ?payload, "account write failed");
            summary.failed_writes += 1;
        }
    }
}

/// Builds the wire request of one transaction against the *modified*
/// account store.
fn transaction_request(
    transaction: &Transaction,
    accounts: &AccountStore,
) -> Result<TransactionRequest> {
    let source = accounts
        .get(transaction.source_id)
        .ok_or(SyncError::UnknownId {
            entity: "account",
            id: transaction.source_id.into_inner(),
        })?;
    let destination = accounts
        .get(transaction.destination_id)
        .ok_or(SyncError::UnknownId {
            entity: "account",
            id: transaction.destination_id.into_inner(),
        })?;
    let source_role = source.source.as_ref().ok_or(SyncError::InvalidAccount {
        name: source.name.clone(),
        reason: "missing source role",
    })?;
    let destination_role = destination
        .destination
        .as_ref()
        .ok_or(SyncError::InvalidAccount {
            name: destination.name.clone(),
            reason: "missing destination role",
        })?;
    let kind = transaction_kind(source_role.kind, destination_role.kind)?;

    let external_id = transaction
        .akahu_ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>()
        .join(",");
    Ok(TransactionRequest::single(TransactionSplit {
        kind: kind.as_api_type().to_owned(),
        external_id,
        description: transaction.description.clone(),
        date: transaction.date.to_rfc3339(),
        amount: transaction.amount.to_string(),
        source_id: source_role.external_id.map(|id| id.to_string()),
        source_name: source_role
            .external_id
            .is_none()
            .then(|| source.name.clone()),
        destination_id: destination_role.external_id.map(|id| id.to_string()),
        destination_name: destination_role
            .external_id
            .is_none()
            .then(|| destination.name.clone()),
        foreign_amount: transaction.foreign_amount.map(|amount| amount.to_string()),
        foreign_currency_code: transaction.foreign_currency_code.clone(),
        category_name: transaction.category_name.clone(),
    }))
}

/// Emits one transaction, skipping byte-identical payloads.
///
/// The original side is also rendered against the modified account
/// store, so changes to referenced accounts surface as transaction
/// updates too.
fn emit_transaction<W: LedgerWriter>(
    original_transactions: &TransactionStore,
    accounts: &AccountStore,
    transaction: &Transaction,
    writer: &W,
    dry_run: bool,
    summary: &mut ExportSummary,
) -> Result<()> {
    let request = transaction_request(transaction, accounts)?;
    let original_request = original_transactions
        .get(transaction.id)
        .map(|original| transaction_request(&original, accounts))
        .transpose()?;
    if original_request.as_ref() == Some(&request) {
        summary.transactions_unchanged += 1;
        return Ok(());
    }

    if dry_run {
        tracing::info!(
            description = %transaction.description,
            firefly_id = ?transaction.firefly_id,
            "dry-run: transaction write suppressed"
        );
    }
    let is_update = transaction.firefly_id.is_some();
    let result = if dry_run {
        Ok(())
    } else {
        match transaction.firefly_id {
            Some(external_id) => writer.update_transaction(external_id, &request),
            None => writer.create_transaction(&request),
        }
    };
    match result {
        Ok(()) if is_update => summary.transactions_updated += 1,
        Ok(()) => summary.transactions_created += 1,
        Err(err) => {
            tracing::error!(error = %err, request = ?request, "transaction write failed");
            summary.failed_writes += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AkahuId, NewAccount, NewTransaction};
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use std::cell::RefCell;

    /// What a recording writer saw.
    #[derive(Debug, Clone, PartialEq)]
    enum Write {
        CreateAccount(AccountKind, AccountPayload),
        UpdateAccount(FireflyId, AccountPayload),
        CreateTransaction(TransactionRequest),
        UpdateTransaction(FireflyId, TransactionRequest),
    }

    #[derive(Debug, Default)]
    struct RecordingWriter {
        writes: RefCell<Vec<Write>>,
        fail: bool,
    }

    impl RecordingWriter {
        fn failing() -> Self {
            Self {
                writes: RefCell::new(Vec::new()),
                fail: true,
            }
        }

        fn into_writes(self) -> Vec<Write> {
            self.writes.into_inner()
        }

        fn record(&self, write: Write) -> Result<()> {
            self.writes.borrow_mut().push(write);
            if self.fail {
                Err(SyncError::Api {
                    status: 500,
                    message: "boom".to_owned(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl LedgerWriter for RecordingWriter {
        fn create_account(&self, kind: AccountKind, payload: &AccountPayload) -> Result<()> {
            self.record(Write::CreateAccount(kind, payload.clone()))
        }

        fn update_account(&self, external_id: FireflyId, payload: &AccountPayload) -> Result<()> {
            self.record(Write::UpdateAccount(external_id, payload.clone()))
        }

        fn create_transaction(&self, request: &TransactionRequest) -> Result<()> {
            self.record(Write::CreateTransaction(request.clone()))
        }

        fn update_transaction(
            &self,
            external_id: FireflyId,
            request: &TransactionRequest,
        ) -> Result<()> {
            self.record(Write::UpdateTransaction(external_id, request.clone()))
        }
    }

    fn date(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn asset(name: &str, external_id: i64, akahu: &str) -> NewAccount {
        let mut new = NewAccount::named(name);
        new.akahu_id = Some(AkahuId::from(akahu));
        new.source = Some(AccountRole::with_external_id(
            AccountKind::Asset,
            FireflyId::new(external_id),
        ));
        new.destination = Some(AccountRole::with_external_id(
            AccountKind::Asset,
            FireflyId::new(external_id),
        ));
        new
    }

    #[test]
    fn unchanged_state_emits_zero_writes() {
        let mut accounts = AccountStore::new();
        let cheque = accounts.create(asset("Cheque", 1, "acc_X")).unwrap();
        let mut coffee = NewAccount::named("Coffee");
        coffee.destination = Some(AccountRole::with_external_id(
            AccountKind::Expense,
            FireflyId::new(10),
        ));
        let coffee = accounts.create(coffee).unwrap();
        let mut transactions = TransactionStore::new();
        let mut tx = NewTransaction::new(
            "flat white",
            date("2024-01-02T10:30:00Z"),
            Decimal::new(550, 2),
            cheque.id,
            coffee.id,
        );
        tx.firefly_id = Some(FireflyId::new(100));
        transactions.create(tx).unwrap();

        let original_accounts = accounts.duplicate();
        let original_transactions = transactions.duplicate();
        let writer = RecordingWriter::default();
        let summary = export(
            &original_accounts,
            &mut accounts,
            &original_transactions,
            &transactions,
            &writer,
            false,
        )
        .unwrap();

        assert!(writer.into_writes().is_empty());
        assert_eq!(summary.accounts_created + summary.accounts_updated, 0);
        assert_eq!(
            summary.transactions_created + summary.transactions_updated,
            0
        );
        assert_eq!(summary.transactions_unchanged, 1);
    }

    #[test]
    fn new_revenue_account_and_deposit_are_created() {
        let mut accounts = AccountStore::new();
        let cheque = accounts.create(asset("Cheque", 1, "acc_X")).unwrap();
        let original_accounts = accounts.duplicate();
        let original_transactions = TransactionStore::new();

        let mut shop = NewAccount::named("Coffee shop");
        shop.source = Some(AccountRole::new(AccountKind::Revenue));
        let shop = accounts.create(shop).unwrap();
        let mut transactions = TransactionStore::new();
        let mut tx = NewTransaction::new(
            "Coffee shop",
            date("2024-01-02T10:30:00Z"),
            Decimal::new(5000, 2),
            shop.id,
            cheque.id,
        );
        tx.akahu_ids.insert(AkahuId::from("trans_A1"));
        transactions.create(tx).unwrap();

        let writer = RecordingWriter::default();
        let summary = export(
            &original_accounts,
            &mut accounts,
            &original_transactions,
            &transactions,
            &writer,
            false,
        )
        .unwrap();

        assert_eq!(summary.accounts_created, 1);
        assert_eq!(summary.transactions_created, 1);
        let writes = writer.into_writes();
        match &writes[0] {
            Write::CreateAccount(kind, payload) => {
                assert_eq!(*kind, AccountKind::Revenue);
                assert_eq!(payload.name, "Coffee shop");
            }
            other => panic!("expected account create, got {other:?}"),
        }
        match &writes[1] {
            Write::CreateTransaction(request) => {
                let split = &request.transactions[0];
                assert_eq!(split.kind, "deposit");
                assert_eq!(split.external_id, "trans_A1");
                assert_eq!(split.amount, "50.00");
                assert_eq!(split.source_name.as_deref(), Some("Coffee shop"));
                assert_eq!(split.destination_id.as_deref(), Some("1"));
            }
            other => panic!("expected transaction create, got {other:?}"),
        }
    }

    #[test]
    fn changed_account_is_updated_once_per_ledger_row() {
        let mut accounts = AccountStore::new();
        // A merged counterparty: revenue row 11 and expense row 10.
        let mut coffee = NewAccount::named("Coffee");
        coffee.source = Some(AccountRole::with_external_id(
            AccountKind::Revenue,
            FireflyId::new(11),
        ));
        coffee.destination = Some(AccountRole::with_external_id(
            AccountKind::Expense,
            FireflyId::new(10),
        ));
        let created = accounts.create(coffee).unwrap();
        let original_accounts = accounts.duplicate();

        let mut changed = accounts.get(created.id).unwrap();
        changed
            .bank_numbers
            .insert("01-0002-0000003-004".to_owned());
        accounts.save(changed).unwrap();

        let transactions = TransactionStore::new();
        let writer = RecordingWriter::default();
        let summary = export(
            &original_accounts,
            &mut accounts,
            &transactions,
            &transactions,
            &writer,
            false,
        )
        .unwrap();

        assert_eq!(summary.accounts_updated, 2);
        let writes = writer.into_writes();
        assert_eq!(
            writes
                .iter()
                .filter_map(|write| match write {
                    Write::UpdateAccount(id, _) => Some(id.into_inner()),
                    _ => None,
                })
                .collect::<Vec<i64>>(),
            vec![11, 10]
        );
    }

    #[test]
    fn notes_round_trip_rebuilds_identity_blocks() {
        let mut new = NewAccount::named("New World");
        new.akahu_id = Some(AkahuId::from("merchant_nw"));
        new.add_alternate_name("NEW WORLD `METRO`");
        let mut role = AccountRole::new(AccountKind::Expense);
        role.notes = Some(
            "Groceries.\n\n**Akahu ID** `merchant_old`\n\n**Alternate names**\n- `stale`"
                .to_owned(),
        );
        new.destination = Some(role);
        let mut store = AccountStore::new();
        let account = store.create(new).unwrap();

        let payload = account_payload(
            &account,
            account.destination.as_ref().expect("destination role"),
        );
        let notes = payload.notes.unwrap();
        assert!(notes.starts_with("Groceries."));
        assert!(notes.contains("**Akahu ID** `merchant_nw`"));
        assert!(!notes.contains("merchant_old"));
        assert!(!notes.contains("stale"));
        // Backticks inside names are replaced with apostrophes.
        assert!(notes.contains("- `NEW WORLD 'METRO'`"));
    }

    #[test]
    fn missing_roles_are_synthesized_before_the_kind_table() {
        let mut accounts = AccountStore::new();
        let cheque = accounts.create(asset("Cheque", 1, "acc_X")).unwrap();
        let mut shop = NewAccount::named("Shop");
        shop.source = Some(AccountRole::new(AccountKind::Revenue));
        let shop = accounts.create(shop).unwrap();
        let original_accounts = accounts.duplicate();

        // Money flowing *to* the shop, which has no destination role.
        let mut transactions = TransactionStore::new();
        transactions
            .create(NewTransaction::new(
                "refund reversal",
                date("2024-01-05T09:00:00Z"),
                Decimal::new(2000, 2),
                cheque.id,
                shop.id,
            ))
            .unwrap();

        let writer = RecordingWriter::default();
        export(
            &original_accounts,
            &mut accounts,
            &TransactionStore::new(),
            &transactions,
            &writer,
            false,
        )
        .unwrap();

        let shop = accounts.get(shop.id).unwrap();
        assert_eq!(
            shop.destination.as_ref().unwrap().kind,
            AccountKind::Expense
        );
        let writes = writer.into_writes();
        assert!(writes.iter().any(|write| matches!(
            write,
            Write::CreateTransaction(request)
                if request.transactions[0].kind == "withdrawal"
        )));
    }

    #[test]
    fn failed_writes_are_logged_and_skipped() {
        let mut accounts = AccountStore::new();
        let original_accounts = accounts.duplicate();
        let mut first = NewAccount::named("First");
        first.source = Some(AccountRole::new(AccountKind::Revenue));
        accounts.create(first).unwrap();
        let mut second = NewAccount::named("Second");
        second.source = Some(AccountRole::new(AccountKind::Revenue));
        accounts.create(second).unwrap();

        let transactions = TransactionStore::new();
        let writer = RecordingWriter::failing();
        let summary = export(
            &original_accounts,
            &mut accounts,
            &transactions,
            &transactions,
            &writer,
            false,
        )
        .unwrap();

        assert_eq!(summary.failed_writes, 2);
        // Both writes were still attempted.
        assert_eq!(writer.into_writes().len(), 2);
    }

    #[test]
    fn dry_run_suppresses_remote_calls_but_counts() {
        let mut accounts = AccountStore::new();
        let original_accounts = accounts.duplicate();
        let mut shop = NewAccount::named("Shop");
        shop.source = Some(AccountRole::new(AccountKind::Revenue));
        accounts.create(shop).unwrap();

        let transactions = TransactionStore::new();
        let writer = RecordingWriter::default();
        let summary = export(
            &original_accounts,
            &mut accounts,
            &transactions,
            &transactions,
            &writer,
            true,
        )
        .unwrap();

        assert_eq!(summary.accounts_created, 1);
        assert!(writer.into_writes().is_empty());
    }

    #[test]
    fn rename_of_id_referenced_account_leaves_transactions_alone() {
        let mut accounts = AccountStore::new();
        let cheque = accounts.create(asset("Cheque", 1, "acc_X")).unwrap();
        let mut shop = NewAccount::named("Shop");
        shop.destination = Some(AccountRole::with_external_id(
            AccountKind::Expense,
            FireflyId::new(10),
        ));
        let shop = accounts.create(shop).unwrap();
        let mut transactions = TransactionStore::new();
        let mut tx = NewTransaction::new(
            "purchase",
            date("2024-01-06T11:00:00Z"),
            Decimal::new(900, 2),
            cheque.id,
            shop.id,
        );
        tx.firefly_id = Some(FireflyId::new(200));
        transactions.create(tx).unwrap();
        let original_accounts = accounts.duplicate();
        let original_transactions = transactions.duplicate();

        let mut renamed = accounts.get(shop.id).unwrap();
        renamed.name = "Shop NZ".to_owned();
        renamed
            .alternate_names
            .insert("shop nz".to_owned(), "Shop NZ".to_owned());
        accounts.save(renamed).unwrap();

        let writer = RecordingWriter::default();
        let summary = export(
            &original_accounts,
            &mut accounts,
            &original_transactions,
            &transactions,
            &writer,
            false,
        )
        .unwrap();

        // The rename writes the account; the transaction references the
        // shop by ledger id, and both payload renderings use the
        // modified account store, so no transaction write happens.
        assert_eq!(summary.accounts_updated, 1);
        assert_eq!(summary.transactions_unchanged, 1);
        assert!(writer
            .into_writes()
            .iter()
            .all(|write| matches!(write, Write::UpdateAccount(..))));
    }
}
