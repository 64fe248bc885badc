//! Identity primitives: bank-number canonicalization, name
//! normalization and bigram similarity.
//!
//! Accounts are matched across the ledger and the feed by three kinds of
//! identity evidence, none of which arrive in a canonical form: bank
//! account numbers (zero-padding differs per bank), display names
//! (diacritics and casing differ), and free-text descriptions (compared
//! fuzzily). This module owns the canonical forms.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strict shape of a bank account number: four dash-separated digit
/// groups. Anything else is not a bank number.
static BANK_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+-\d+-\d+-\d+$").expect("valid bank number pattern"));

/// Canonical zero-padded widths of the four bank-number groups:
/// bank, branch, body, suffix.
const GROUP_WIDTHS: [usize; 4] = [2, 4, 7, 3];

/// Canonicalizes a bank account number to four dash-separated groups
/// zero-padded to widths 2, 4, 7 and 3.
///
/// Returns `None` when the input does not match the strict four-group
/// shape. Each group is parsed as an integer and reformatted, so the
/// numeric value wins: a group wider than its canonical width is kept
/// as-is, and excess leading zeros are collapsed. The function is
/// idempotent over its own output.
#[must_use]
pub fn canonical_bank_number(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !BANK_NUMBER_RE.is_match(raw) {
        return None;
    }
    let groups = raw
        .split('-')
        .map(|group| group.parse::<u64>().ok())
        .collect::<Option<Vec<u64>>>()?;
    if groups.len() != GROUP_WIDTHS.len() {
        return None;
    }
    Some(format!(
        "{:02}-{:04}-{:07}-{:03}",
        groups[0], groups[1], groups[2], groups[3]
    ))
}

/// Normalizes an account name for index lookups: Unicode NFD with
/// combining marks dropped, lowercased, trimmed.
///
/// Idempotent: normalizing an already-normalized name is a no-op.
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    raw.nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_owned()
}

/// Sørensen–Dice coefficient over character bigrams.
///
/// Returns a similarity in `[0, 1]`. Equal strings score 1; strings
/// shorter than one bigram score 0 against anything but themselves.
/// Bigrams are counted as a multiset, so repeated bigrams contribute
/// proportionally.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    reason = "bigram counts are far below 2^52"
)]
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a_bigrams = bigrams(a);
    let b_bigrams = bigrams(b);
    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        return 0.0;
    }
    let a_total: usize = a_bigrams.values().sum();
    let b_total: usize = b_bigrams.values().sum();
    let overlap: usize = a_bigrams
        .iter()
        .map(|(bigram, count)| count.min(b_bigrams.get(bigram).unwrap_or(&0)))
        .sum();
    (2 * overlap) as f64 / (a_total + b_total) as f64
}

/// Collects the character-bigram multiset of a string.
fn bigrams(text: &str) -> HashMap<(char, char), usize> {
    let chars: Vec<char> = text.chars().collect();
    let mut counts = HashMap::new();
    for pair in chars.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}
