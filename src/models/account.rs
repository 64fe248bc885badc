//! Account model: one party in the ledger, with its identity evidence
//! and its source/destination role records.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{AccountId, AkahuId, FireflyId};
use crate::identity::normalize_name;

/// Ledger-side type of an account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// An account the user owns outright (checking, savings).
    Asset,
    /// An account the user owes against (credit card, loan).
    Liability,
    /// A counterparty the user pays money to.
    Expense,
    /// A counterparty the user receives money from.
    Revenue,
}

impl AccountKind {
    /// Maps the ledger's account-type string to a kind.
    ///
    /// Returns `None` for types outside the mapping (cash, initial
    /// balance and reconciliation accounts); their rows are dropped by
    /// the importer.
    #[must_use]
    pub fn from_ledger_type(raw: &str) -> Option<Self> {
        match raw {
            "Default account" | "Asset account" => Some(Self::Asset),
            "Loan" | "Debt" | "Mortgage" => Some(Self::Liability),
            "Expense account" => Some(Self::Expense),
            "Revenue account" => Some(Self::Revenue),
            _ => None,
        }
    }

    /// The lowercase type string the ledger's write API expects.
    #[inline]
    #[must_use]
    pub const fn as_api_type(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Expense => "expense",
            Self::Revenue => "revenue",
        }
    }

    /// Whether accounts of this kind belong to the user.
    #[inline]
    #[must_use]
    pub const fn is_owned(self) -> bool {
        matches!(self, Self::Asset | Self::Liability)
    }
}

impl core::fmt::Display for AccountKind {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_api_type())
    }
}

/// One side of an account's participation in transactions.
///
/// An account with a `source` role can appear as the debit side of a
/// transaction; one with a `destination` role as the credit side. Owned
/// accounts carry both roles against the same ledger row; a merged
/// Expense/Revenue counterparty carries one role per ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRole {
    /// Ledger-side type of this role.
    pub kind: AccountKind,
    /// Primary key of the backing ledger row, if it exists yet.
    pub external_id: Option<FireflyId>,
    /// Free-text notes carried on the ledger row.
    pub notes: Option<String>,
}

impl AccountRole {
    /// Creates a role of the given kind with no backing ledger row.
    #[inline]
    #[must_use]
    pub const fn new(kind: AccountKind) -> Self {
        Self {
            kind,
            external_id: None,
            notes: None,
        }
    }

    /// Creates a role backed by an existing ledger row.
    #[inline]
    #[must_use]
    pub const fn with_external_id(kind: AccountKind, external_id: FireflyId) -> Self {
        Self {
            kind,
            external_id: Some(external_id),
            notes: None,
        }
    }
}

/// An account candidate before a store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Canonical display name (trimmed).
    pub name: String,
    /// Normalized name -> original display form. Always contains the
    /// primary name.
    pub alternate_names: BTreeMap<String, String>,
    /// Canonicalized bank account numbers.
    pub bank_numbers: BTreeSet<String>,
    /// External party identifier from the feed ecosystem.
    pub akahu_id: Option<AkahuId>,
    /// Debit-side role record.
    pub source: Option<AccountRole>,
    /// Credit-side role record.
    pub destination: Option<AccountRole>,
}

impl NewAccount {
    /// Creates a candidate with the given (trimmed) primary name and no
    /// other identity evidence. The primary name is registered as its
    /// own alternate.
    #[must_use]
    pub fn named<T: Into<String>>(name: T) -> Self {
        let name = name.into().trim().to_owned();
        let mut alternate_names = BTreeMap::new();
        alternate_names.insert(normalize_name(&name), name.clone());
        Self {
            name,
            alternate_names,
            bank_numbers: BTreeSet::new(),
            akahu_id: None,
            source: None,
            destination: None,
        }
    }

    /// Registers an additional display name under its normalized form.
    /// The first display form seen for a normalized key wins.
    pub fn add_alternate_name(&mut self, name: &str) {
        self.alternate_names
            .entry(normalize_name(name))
            .or_insert_with(|| name.trim().to_owned());
    }
}

/// One party in the ledger, as held by an account store.
///
/// Identity fields (`akahu_id`, the roles' `external_id`s) are
/// write-once: the store rejects updates that change them after they
/// are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Internal stable key, unique within one account store.
    pub id: AccountId,
    /// Canonical display name (trimmed).
    pub name: String,
    /// Normalized name -> original display form. Always contains the
    /// primary name.
    pub alternate_names: BTreeMap<String, String>,
    /// Canonicalized bank account numbers.
    pub bank_numbers: BTreeSet<String>,
    /// External party identifier from the feed ecosystem.
    pub akahu_id: Option<AkahuId>,
    /// Debit-side role record.
    pub source: Option<AccountRole>,
    /// Credit-side role record.
    pub destination: Option<AccountRole>,
}

impl Account {
    /// Builds a stored account from a candidate and a freshly assigned
    /// id.
    pub(crate) fn from_new(id: AccountId, new: NewAccount) -> Self {
        Self {
            id,
            name: new.name,
            alternate_names: new.alternate_names,
            bank_numbers: new.bank_numbers,
            akahu_id: new.akahu_id,
            source: new.source,
            destination: new.destination,
        }
    }

    /// Normalized form of the primary name.
    #[inline]
    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Whether this account belongs to the user (asset or liability).
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.source
            .as_ref()
            .is_some_and(|role| role.kind.is_owned())
            || self
                .destination
                .as_ref()
                .is_some_and(|role| role.kind.is_owned())
    }

    /// Ledger row ids referenced by either role, deduplicated.
    #[must_use]
    pub fn external_ids(&self) -> BTreeSet<FireflyId> {
        self.source
            .iter()
            .chain(self.destination.iter())
            .filter_map(|role| role.external_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_type_mapping() {
        assert_eq!(
            AccountKind::from_ledger_type("Default account"),
            Some(AccountKind::Asset)
        );
        assert_eq!(
            AccountKind::from_ledger_type("Asset account"),
            Some(AccountKind::Asset)
        );
        assert_eq!(
            AccountKind::from_ledger_type("Loan"),
            Some(AccountKind::Liability)
        );
        assert_eq!(
            AccountKind::from_ledger_type("Expense account"),
            Some(AccountKind::Expense)
        );
        assert_eq!(
            AccountKind::from_ledger_type("Revenue account"),
            Some(AccountKind::Revenue)
        );
        assert_eq!(AccountKind::from_ledger_type("Cash account"), None);
        assert_eq!(AccountKind::from_ledger_type(""), None);
    }

    #[test]
    fn kind_display_is_api_type() {
        assert_eq!(AccountKind::Asset.to_string(), "asset");
        assert_eq!(AccountKind::Revenue.to_string(), "revenue");
    }

    #[test]
    fn named_registers_primary_alternate() {
        let account = NewAccount::named("  Café Noir ");
        assert_eq!(account.name, "Café Noir");
        assert_eq!(
            account.alternate_names.get("cafe noir").map(String::as_str),
            Some("Café Noir")
        );
    }

    #[test]
    fn add_alternate_name_first_display_form_wins() {
        let mut account = NewAccount::named("Coffee");
        account.add_alternate_name("NEW WORLD");
        account.add_alternate_name("New World");
        assert_eq!(
            account.alternate_names.get("new world").map(String::as_str),
            Some("NEW WORLD")
        );
    }

    #[test]
    fn owned_detection() {
        let mut account = Account::from_new(AccountId::new(1), NewAccount::named("Cheque"));
        account.source = Some(AccountRole::with_external_id(
            AccountKind::Asset,
            FireflyId::new(1),
        ));
        account.destination = Some(AccountRole::with_external_id(
            AccountKind::Asset,
            FireflyId::new(1),
        ));
        assert!(account.is_owned());

        let mut expense = Account::from_new(AccountId::new(2), NewAccount::named("Coffee"));
        expense.destination = Some(AccountRole::new(AccountKind::Expense));
        assert!(!expense.is_owned());
    }

    #[test]
    fn external_ids_deduplicate_owned_roles() {
        let mut account = Account::from_new(AccountId::new(1), NewAccount::named("Cheque"));
        account.source = Some(AccountRole::with_external_id(
            AccountKind::Asset,
            FireflyId::new(5),
        ));
        account.destination = Some(AccountRole::with_external_id(
            AccountKind::Asset,
            FireflyId::new(5),
        ));
        assert_eq!(account.external_ids().len(), 1);
    }
}
