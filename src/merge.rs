//! The structural-key transaction merger.
//!
//! Folds one transaction store into another: transactions that agree on
//! their structural key (accounts, amount, and any identity fields both
//! sides carry) are fused into a single enriched entry; everything else
//! from the incoming side is created in the target. Used twice per run:
//! once to pair the two halves of internal transfers, and once to fold
//! the feed's contribution into the ledger's transactions.

use std::collections::BTreeMap;

use chrono::Timelike;

use crate::error::Result;
use crate::identity::dice_coefficient;
use crate::models::{Transaction, TransactionId};
use crate::store::TransactionStore;

/// Maximum date distance between best-of candidates: three days.
const MATCH_WINDOW_MS: i64 = 3 * 86_400 * 1000;

/// What was left unpaired on each side after both merge passes.
///
/// Unmatched incoming transactions are created in the target store but
/// still reported here, keyed by their id in the *incoming* store.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Target-side transactions that fused with nothing.
    pub unmatched_left: BTreeMap<TransactionId, Transaction>,
    /// Incoming transactions that fused with nothing.
    pub unmatched_right: BTreeMap<TransactionId, Transaction>,
}

/// Folds `incoming` into `target` in place.
///
/// First pass: each target transaction takes its best structural match
/// from the incoming pool and fuses it in. When several candidates
/// match, only those within three days are considered, ordered by date
/// distance and then by ascending description similarity. Second pass:
/// each leftover incoming transaction is matched once more against the
/// leftover target transactions, under the same window and tiebreak,
/// and otherwise created in the target.
///
/// `equivalent` further restricts the structural key (pass `|_, _|
/// true` for no restriction); `combine` runs on every fused pair after
/// the attribute fusion rules (pass `|_, _| {}` for none).
///
/// # Errors
///
/// Propagates store errors from `save`/`create`; these indicate index
/// collisions between the two collections and abort the run.
pub fn merge_transactions<E, C>(
    target: &mut TransactionStore,
    incoming: TransactionStore,
    equivalent: E,
    mut combine: C,
) -> Result<MergeOutcome>
where
    E: Fn(&Transaction, &Transaction) -> bool,
    C: FnMut(&mut Transaction, &Transaction),
{
    let mut pool: BTreeMap<TransactionId, Transaction> = incoming
        .into_transactions()
        .into_iter()
        .map(|transaction| (transaction.id, transaction))
        .collect();
    let mut outcome = MergeOutcome::default();

    for id in target.ids() {
        let Some(mut entry) = target.get(id) else {
            continue;
        };
        let candidates: Vec<TransactionId> = pool
            .values()
            .filter(|other| structural_match(&entry, other) && equivalent(&entry, other))
            .map(|other| other.id)
            .collect();
        let chosen = match candidates.as_slice() {
            [] => None,
            [only] => Some(*only),
            _ => pick_best(&entry, &candidates, &pool),
        };
        match chosen.and_then(|choice| pool.remove(&choice)) {
            Some(other) => {
                fuse(&mut entry, &other);
                combine(&mut entry, &other);
                target.save(entry)?;
            }
            None => {
                outcome.unmatched_left.insert(entry.id, entry);
            }
        }
    }

    for (id, other) in pool {
        let candidates: Vec<TransactionId> = outcome
            .unmatched_left
            .values()
            .filter(|entry| structural_match(entry, &other) && equivalent(entry, &other))
            .map(|entry| entry.id)
            .collect();
        // The leftover entries already went through the first pass, so
        // every candidate here is gated by the window: accepting one at
        // unlimited distance would undo the filter that just rejected
        // it.
        let matched = pick_best(&other, &candidates, &outcome.unmatched_left);
        match matched.and_then(|entry_id| outcome.unmatched_left.remove(&entry_id)) {
            Some(mut entry) => {
                fuse(&mut entry, &other);
                combine(&mut entry, &other);
                target.save(entry)?;
            }
            None => {
                target.create(other.as_new())?;
                outcome.unmatched_right.insert(id, other);
            }
        }
    }

    Ok(outcome)
}

/// The structural matching key: accounts and amount agree exactly, and
/// any identity field present on both sides agrees too.
fn structural_match(a: &Transaction, b: &Transaction) -> bool {
    a.source_id == b.source_id
        && a.destination_id == b.destination_id
        && a.amount == b.amount
        && match (a.firefly_id, b.firefly_id) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        }
        && match (a.foreign_amount, b.foreign_amount) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        }
        && match (&a.foreign_currency_code, &b.foreign_currency_code) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        }
}

/// Filters candidates to the three-day window and orders them:
/// ascending date distance, ties broken by ascending description
/// similarity. Used by both passes.
fn pick_best(
    entry: &Transaction,
    candidates: &[TransactionId],
    pool: &BTreeMap<TransactionId, Transaction>,
) -> Option<TransactionId> {
    let mut scored: Vec<(i64, f64, TransactionId)> = candidates
        .iter()
        .filter_map(|id| {
            let other = pool.get(id)?;
            let distance = (other.date - entry.date).num_milliseconds().abs();
            (distance <= MATCH_WINDOW_MS).then(|| {
                (
                    distance,
                    dice_coefficient(&entry.description, &other.description),
                    *id,
                )
            })
        })
        .collect();
    scored.sort_by(|left, right| {
        left.0
            .cmp(&right.0)
            .then_with(|| {
                left.1
                    .partial_cmp(&right.1)
                    .unwrap_or(core::cmp::Ordering::Equal)
            })
            .then_with(|| left.2.cmp(&right.2))
    });
    scored.first().map(|entry| entry.2)
}

/// Fuses `other`'s attributes into `entry`.
///
/// Identity fields fill in where unset, feed ids accumulate, and
/// `other`'s date wins when it carries time-of-day information.
fn fuse(entry: &mut Transaction, other: &Transaction) {
    if entry.firefly_id.is_none() {
        entry.firefly_id = other.firefly_id;
    }
    entry.akahu_ids.extend(other.akahu_ids.iter().cloned());
    if entry.foreign_amount.is_none() {
        entry.foreign_amount = other.foreign_amount;
    }
    if entry.foreign_currency_code.is_none() {
        entry.foreign_currency_code = other.foreign_currency_code.clone();
    }
    if entry.category_name.is_none() {
        entry.category_name = other.category_name.clone();
    }
    if other.date.hour() != 0 || other.date.minute() != 0 {
        entry.date = other.date;
    }
}
