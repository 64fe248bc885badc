//! Ledger importer: turns raw ledger rows into stored accounts and
//! transactions.
//!
//! Account rows carry identity evidence in three places: the bank
//! number column, the external-id column, and hint blocks embedded in
//! the free-text notes. Every piece of evidence is looked up against
//! the store so that the two role-halves of one counterparty (an
//! expense row and a revenue row with the same name) collapse into a
//! single account.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SyncError};
use crate::identity::canonical_bank_number;
use crate::models::{
    Account, AccountId, AccountKind, AccountRole, AccountRow, AkahuId, NewAccount, NewTransaction,
    TransactionRow,
};
use crate::store::{AccountStore, TransactionStore};

/// The feed-id hint (`**Akahu ID**` line) embedded in an account's
/// notes.
static AKAHU_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*Akahu ID\*\* `([^`]+)`").expect("valid akahu hint pattern"));

/// `**Alternate names**` block embedded in an account's notes.
static ALTERNATE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*Alternate names\*\*((?:\n-\s*`[^`]+`)+)").expect("valid alternate pattern")
});

/// One backticked name inside an alternate-names block.
static ALTERNATE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid name pattern"));

/// Extracts the feed identifier hint from a notes field.
pub(crate) fn akahu_id_hint(notes: &str) -> Option<AkahuId> {
    AKAHU_HINT_RE
        .captures(notes)
        .map(|captures| AkahuId::from(captures[1].to_owned()))
}

/// Extracts every alternate name from a notes field.
pub(crate) fn alternate_name_hints(notes: &str) -> Vec<String> {
    ALTERNATE_BLOCK_RE
        .captures(notes)
        .map(|captures| {
            ALTERNATE_NAME_RE
                .captures_iter(&captures[1])
                .map(|name| name[1].to_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Imports ledger account rows into the store.
///
/// Rows with unmapped account types are dropped. Rows that collide with
/// an existing entry on a single secondary key are skipped with a
/// warning (first wins). An expense or revenue row that matches exactly
/// one existing account is merged into it; any other multi-way match is
/// a fatal conflict.
///
/// # Errors
///
/// Returns [`SyncError::AccountConflict`] when a row matches more than
/// one existing account, or one it cannot be merged into.
#[tracing::instrument(skip_all, fields(rows = rows.len()))]
pub fn import_ledger_accounts(store: &mut AccountStore, rows: &[AccountRow]) -> Result<()> {
    for row in rows {
        let Some(kind) = AccountKind::from_ledger_type(&row.account_type) else {
            tracing::debug!(
                account_type = %row.account_type,
                name = %row.name,
                "dropping account row with unmapped type"
            );
            continue;
        };
        let candidate = build_candidate(row, kind);
        let matches = collect_matches(store, &candidate);
        match matches.len() {
            0 => match store.create(candidate) {
                Ok(_) => {}
                Err(SyncError::DuplicateKey { index, key }) => {
                    tracing::warn!(name = %row.name, index, key, "skipping duplicate account row");
                }
                Err(err) => return Err(err),
            },
            1 if matches!(kind, AccountKind::Expense | AccountKind::Revenue) => {
                let Some((_, existing)) = matches.into_iter().next() else {
                    continue;
                };
                let merged = merge_into_existing(existing, &candidate)?;
                store.save(merged)?;
            }
            _ => return Err(account_conflict(&candidate, matches.into_values())),
        }
    }
    Ok(())
}

/// Builds the candidate account for one ledger row.
fn build_candidate(row: &AccountRow, kind: AccountKind) -> NewAccount {
    let mut candidate = NewAccount::named(row.name.as_str());
    let notes = row.notes.as_deref().unwrap_or_default();
    for name in alternate_name_hints(notes) {
        candidate.add_alternate_name(&name);
    }
    if let Some(raw_numbers) = &row.account_number {
        candidate.bank_numbers.extend(
            raw_numbers
                .split(',')
                .filter_map(|item| canonical_bank_number(item)),
        );
    }
    candidate.akahu_id = akahu_id_hint(notes)
        .or_else(|| row.external_id.clone().map(AkahuId::new));
    let role = AccountRole {
        kind,
        external_id: Some(row.id),
        notes: row.notes.clone(),
    };
    match kind {
        AccountKind::Asset | AccountKind::Liability => {
            candidate.source = Some(role.clone());
            candidate.destination = Some(role);
        }
        AccountKind::Expense => candidate.destination = Some(role),
        AccountKind::Revenue => candidate.source = Some(role),
    }
    candidate
}

/// Looks up every identifier the candidate carries and collects the
/// distinct existing accounts they resolve to.
fn collect_matches(store: &AccountStore, candidate: &NewAccount) -> BTreeMap<AccountId, Account> {
    let mut matches = BTreeMap::new();
    let mut remember = |account: Option<Account>| {
        if let Some(account) = account {
            matches.entry(account.id).or_insert(account);
        }
    };
    for name in candidate.alternate_names.keys() {
        remember(store.get_by_name(name));
    }
    for bank in &candidate.bank_numbers {
        remember(store.get_by_bank_number(bank));
    }
    if let Some(akahu) = &candidate.akahu_id {
        remember(store.get_by_akahu_id(akahu));
    }
    for role in candidate.source.iter().chain(candidate.destination.iter()) {
        if let Some(external) = role.external_id {
            remember(store.get_by_external_id(external));
        }
    }
    matches
}

/// Merges an expense/revenue candidate into the one existing account it
/// matched: the two must be role-complements of the same counterparty.
///
/// # Errors
///
/// Returns [`SyncError::AccountConflict`] when the names differ, the
/// feed ids are incompatible, or both sides claim the same role.
fn merge_into_existing(existing: Account, candidate: &NewAccount) -> Result<Account> {
    let conflict = || account_conflict(candidate, [existing.clone()]);
    if existing.normalized_name() != crate::identity::normalize_name(&candidate.name) {
        return Err(conflict());
    }
    match (&existing.akahu_id, &candidate.akahu_id) {
        (Some(left), Some(right)) if left != right => return Err(conflict()),
        _ => {}
    }
    let source = match (existing.source.clone(), candidate.source.clone()) {
        (Some(_), Some(_)) => return Err(conflict()),
        (source, candidate_source) => source.or(candidate_source),
    };
    let destination = match (existing.destination.clone(), candidate.destination.clone()) {
        (Some(_), Some(_)) => return Err(conflict()),
        (destination, candidate_destination) => destination.or(candidate_destination),
    };

    let mut merged = existing;
    merged.source = source;
    merged.destination = destination;
    for (normalized, display) in &candidate.alternate_names {
        merged
            .alternate_names
            .entry(normalized.clone())
            .or_insert_with(|| display.clone());
    }
    merged
        .bank_numbers
        .extend(candidate.bank_numbers.iter().cloned());
    if merged.akahu_id.is_none() {
        merged.akahu_id = candidate.akahu_id.clone();
    }
    Ok(merged)
}

/// Builds the fatal conflict error, dumping the candidate and every
/// match. The entities use ordered collections, so the dumps are
/// stable.
fn account_conflict(
    candidate: &NewAccount,
    matches: impl IntoIterator<Item = Account>,
) -> SyncError {
    SyncError::AccountConflict {
        candidate: format!("{candidate:#?}"),
        matches: matches
            .into_iter()
            .map(|account| format!("{account:#?}"))
            .collect(),
    }
}

/// Imports ledger transaction rows into the store.
///
/// The row's comma-separated external-id list is filtered to feed
/// transaction ids (`trans_` prefix); everything else is discarded.
/// Amounts are stored as absolute values. Rows whose keys collide with
/// an already-imported transaction are skipped with a warning.
///
/// # Errors
///
/// Returns [`SyncError::MissingAccount`] when a row references a ledger
/// account id that was not imported.
#[tracing::instrument(skip_all, fields(rows = rows.len()))]
pub fn import_ledger_transactions(
    store: &mut TransactionStore,
    accounts: &AccountStore,
    rows: &[TransactionRow],
) -> Result<()> {
    for row in rows {
        let source = accounts
            .get_by_external_id(row.source_id)
            .ok_or(SyncError::MissingAccount {
                external_id: row.source_id,
            })?;
        let destination =
            accounts
                .get_by_external_id(row.destination_id)
                .ok_or(SyncError::MissingAccount {
                    external_id: row.destination_id,
                })?;

        let mut new = NewTransaction::new(
            row.description.clone(),
            row.date,
            row.amount.abs(),
            source.id,
            destination.id,
        );
        new.firefly_id = Some(row.id);
        new.akahu_ids = row
            .external_id
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|item| item.starts_with("trans_"))
            .map(AkahuId::from)
            .collect();
        new.foreign_amount = row.foreign_amount.map(|amount| amount.abs());
        new.foreign_currency_code = row.foreign_currency_code.clone();
        new.category_name = row.category_name.clone();

        match store.create(new) {
            Ok(_) => {}
            Err(SyncError::DuplicateKey { index, key }) => {
                tracing::warn!(
                    firefly_id = %row.id,
                    index,
                    key,
                    "skipping duplicate transaction row"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
