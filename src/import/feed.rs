//! Feed importer and matcher: turns cached feed records into
//! transactions against the working account store.
//!
//! Each record is attributed to its owning (asset/liability) account
//! and a counterparty resolved through ordered strategies; missing
//! counterparty roles are promoted onto the matched account. Internal
//! transfers appear twice in the feed (once per owned account), so
//! their debit and credit views are paired and fused into a single
//! transfer transaction before the result is handed to the caller.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::{Result, SyncError};
use crate::merge::merge_transactions;
use crate::models::{
    Account, AccountKind, AccountRole, AkahuId, FeedMeta, FeedTransaction, NewAccount,
    NewTransaction,
};
use crate::store::{AccountStore, TransactionStore};

/// Imports feed records, returning the feed's transaction contribution.
///
/// Counterparty accounts may be created or promoted in `accounts` as a
/// side effect. The returned store contains one fused transaction per
/// internal transfer pair and one transaction per external record.
///
/// # Errors
///
/// Returns [`SyncError::UnconfiguredAccount`] when a record belongs to
/// an account that is not an owned ledger account,
/// [`SyncError::UnmatchedTransfer`] when an internal transfer cannot be
/// paired, and [`SyncError::NoAccounts`] when fuzzy matching runs
/// against an empty store.
#[tracing::instrument(skip_all, fields(rows = rows.len()))]
pub fn import_feed(
    accounts: &mut AccountStore,
    rows: &[FeedTransaction],
) -> Result<TransactionStore> {
    let mut debits = TransactionStore::new();
    let mut credits = TransactionStore::new();
    let mut external = Vec::new();

    for row in rows {
        let owner = accounts
            .get_by_akahu_id(&row.account)
            .filter(Account::is_owned)
            .ok_or_else(|| SyncError::UnconfiguredAccount {
                akahu_id: row.account.clone(),
            })?;
        let meta = row.meta.clone().unwrap_or_default();
        let amount = decimal_amount(row.amount)?;
        let negative = amount.is_sign_negative();
        let cleaned = clean_description(&row.description, &meta);

        let counterparty = resolve_counterparty(accounts, row)?;
        let counterparty = if counterparty.id == owner.id {
            // The best fuzzy match was the owning account itself; a
            // real counterparty has to be synthesized from the
            // description instead.
            let name = if cleaned.is_empty() {
                row.description.trim()
            } else {
                cleaned.as_str()
            };
            let kind = if negative {
                AccountKind::Expense
            } else {
                AccountKind::Revenue
            };
            synthesize_counterparty(accounts, name, kind)?
        } else {
            counterparty
        };

        let (source, destination) = if negative {
            let promoted = ensure_role(accounts, counterparty, AccountKind::Expense, false)?;
            (owner, promoted)
        } else {
            let promoted = ensure_role(accounts, counterparty, AccountKind::Revenue, true)?;
            (promoted, owner)
        };

        let mut new = NewTransaction::new(
            cleaned,
            parse_feed_date(&row.date)?,
            amount.abs(),
            source.id,
            destination.id,
        );
        new.akahu_ids.insert(row.id.clone());
        if let Some(conversion) = &meta.conversion {
            new.foreign_amount = Some(decimal_amount(conversion.amount)?.abs());
            new.foreign_currency_code = Some(conversion.currency.clone());
        }
        new.category_name = row.category_name().map(str::to_owned);

        let internal = source
            .akahu_id
            .as_ref()
            .is_some_and(AkahuId::is_owned_account)
            && destination
                .akahu_id
                .as_ref()
                .is_some_and(AkahuId::is_owned_account);
        if internal {
            let pool = if negative { &mut debits } else { &mut credits };
            create_or_warn(pool, new)?;
        } else {
            external.push(new);
        }
    }

    let outcome = merge_transactions(
        &mut debits,
        credits,
        |_, _| true,
        |entry, other| {
            entry.description = format!("{} - {}", entry.description, other.description);
        },
    )?;
    if !outcome.unmatched_left.is_empty() || !outcome.unmatched_right.is_empty() {
        let leftover = outcome
            .unmatched_left
            .values()
            .chain(outcome.unmatched_right.values())
            .map(|transaction| format!("{transaction:#?}"))
            .collect();
        return Err(SyncError::UnmatchedTransfer { leftover });
    }

    for new in external {
        create_or_warn(&mut debits, new)?;
    }
    Ok(debits)
}

/// Resolves the counterparty account for one feed record.
///
/// Ordered strategies, first hit wins: the interest account for
/// interest lines, the merchant id, the other party's bank number,
/// then the fuzzy name match (also tried with the reference stripped
/// from the description, keeping whichever scores higher).
fn resolve_counterparty(accounts: &AccountStore, row: &FeedTransaction) -> Result<Account> {
    if row.description.to_lowercase().contains("interest") {
        if let Some(account) = accounts.get_by_name("Interest") {
            return Ok(account);
        }
    }
    if let Some(merchant_id) = row.merchant_id() {
        if let Some(account) = accounts.get_by_akahu_id(merchant_id) {
            return Ok(account);
        }
    }
    let meta = row.meta.clone().unwrap_or_default();
    if let Some(other_account) = &meta.other_account {
        if let Some(account) = accounts.get_by_bank_number(other_account) {
            return Ok(account);
        }
    }
    let (mut best, mut best_score) = accounts.get_by_name_fuzzy(&row.description)?;
    if let Some(reference) = meta.reference.as_deref() {
        let stripped = row.description.replace(reference, "");
        let (alternative, alternative_score) = accounts.get_by_name_fuzzy(&stripped)?;
        if alternative_score > best_score {
            best = alternative;
            best_score = alternative_score;
        }
    }
    tracing::trace!(description = %row.description, matched = %best.name, score = best_score, "fuzzy counterparty");
    Ok(best)
}

/// Attaches the needed role to the counterparty when it is missing.
///
/// `as_source` selects which side the transaction needs; the role is
/// added to the same account so that name uniqueness holds.
fn ensure_role(
    accounts: &mut AccountStore,
    account: Account,
    kind: AccountKind,
    as_source: bool,
) -> Result<Account> {
    let missing = if as_source {
        account.source.is_none()
    } else {
        account.destination.is_none()
    };
    if !missing {
        return Ok(account);
    }
    let mut updated = account;
    if as_source {
        updated.source = Some(AccountRole::new(kind));
    } else {
        updated.destination = Some(AccountRole::new(kind));
    }
    accounts.save(updated.clone())?;
    Ok(updated)
}

/// Creates a counterparty account from a description, reusing an
/// existing account of the same name when one exists.
fn synthesize_counterparty(
    accounts: &mut AccountStore,
    name: &str,
    kind: AccountKind,
) -> Result<Account> {
    if let Some(existing) = accounts.get_by_name(name) {
        return Ok(existing);
    }
    let mut new = NewAccount::named(name);
    match kind {
        AccountKind::Revenue => new.source = Some(AccountRole::new(kind)),
        _ => new.destination = Some(AccountRole::new(kind)),
    }
    accounts.create(new)
}

/// Strips the reference, code and particulars fragments from a
/// description, then trims it.
fn clean_description(description: &str, meta: &FeedMeta) -> String {
    let mut cleaned = description.to_owned();
    for fragment in [
        meta.reference.as_deref(),
        meta.code.as_deref(),
        meta.particulars.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        if !fragment.is_empty() {
            cleaned = cleaned.replace(fragment, "");
        }
    }
    cleaned.trim().to_owned()
}

/// Parses a feed timestamp, preserving the hour and minute.
///
/// Accepts full RFC 3339 as well as minute-precision timestamps
/// (`2024-02-03T09:00Z`).
fn parse_feed_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M")?;
    Ok(naive.and_utc())
}

/// Converts a feed amount to an exact decimal.
fn decimal_amount(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| SyncError::InvalidAmount {
        value: value.to_string(),
    })
}

/// Creates a transaction in a pool, downgrading key collisions (a
/// record cached twice) to a warning; the first entry wins.
fn create_or_warn(pool: &mut TransactionStore, new: NewTransaction) -> Result<()> {
    match pool.create(new) {
        Ok(_) => Ok(()),
        Err(SyncError::DuplicateKey { index, key }) => {
            tracing::warn!(index, key, "skipping duplicate feed record");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
