//! The indexed account store.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, SyncError};
use crate::identity::{canonical_bank_number, dice_coefficient, normalize_name};
use crate::models::{Account, AccountId, AkahuId, FireflyId, NewAccount};

/// Keyed collection of [`Account`]s with four secondary indices: feed
/// id, canonical bank number, normalized name, and role external id.
///
/// Every mutation is gated by cross-index uniqueness: no two accounts
/// may share a key in any index. Identity fields (`akahu_id`, the
/// roles' `external_id`s) are write-once. Iteration follows insertion
/// order, which is also the tiebreaker for fuzzy lookups.
#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    /// Next internal id to assign.
    next_id: u64,
    /// Primary storage, keyed (and therefore iterated) by internal id.
    accounts: BTreeMap<AccountId, Account>,
    /// Feed id -> internal id.
    by_akahu: HashMap<AkahuId, AccountId>,
    /// Canonical bank number -> internal id.
    by_bank: HashMap<String, AccountId>,
    /// Normalized name -> internal id.
    by_name: HashMap<String, AccountId>,
    /// Role external id -> internal id.
    by_external: HashMap<FireflyId, AccountId>,
}

/// Every secondary key one account occupies.
struct IndexKeys {
    akahu: Option<AkahuId>,
    banks: Vec<String>,
    names: Vec<String>,
    externals: Vec<FireflyId>,
}

impl IndexKeys {
    fn of(account: &Account) -> Self {
        Self {
            akahu: account.akahu_id.clone(),
            banks: account.bank_numbers.iter().cloned().collect(),
            names: account.alternate_names.keys().cloned().collect(),
            externals: account.external_ids().into_iter().collect(),
        }
    }
}

impl AccountStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts in the store.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Assigns the next internal id to the candidate and indexes it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateKey`] when any secondary key
    /// collides with an existing account, and
    /// [`SyncError::InvalidAccount`] when the candidate's roles violate
    /// the account invariants.
    pub fn create(&mut self, new: NewAccount) -> Result<Account> {
        let account = Account::from_new(AccountId::new(self.next_id), new);
        validate(&account)?;
        self.ensure_unique(&account, None)?;
        self.next_id += 1;
        self.index(&IndexKeys::of(&account), account.id);
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    /// Replaces the stored account with the same id.
    ///
    /// De-indexes the old entry and indexes the new one; all uniqueness
    /// checks run before any index is touched, so a failed save leaves
    /// the store untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownId`] when no account has this id,
    /// [`SyncError::ImmutableField`] when `akahu_id` or a role
    /// `external_id` would change from a set value,
    /// [`SyncError::DuplicateKey`] on a secondary key collision with a
    /// different account, and [`SyncError::InvalidAccount`] on a role
    /// invariant violation.
    pub fn save(&mut self, account: Account) -> Result<()> {
        let existing = self
            .accounts
            .get(&account.id)
            .ok_or(SyncError::UnknownId {
                entity: "account",
                id: account.id.into_inner(),
            })?;
        check_immutable(existing, &account)?;
        validate(&account)?;
        let old_keys = IndexKeys::of(existing);
        self.ensure_unique(&account, Some(account.id))?;
        self.deindex(&old_keys);
        self.index(&IndexKeys::of(&account), account.id);
        self.accounts.insert(account.id, account);
        Ok(())
    }

    /// Returns a deep-cloned snapshot of the account with this id.
    #[must_use]
    pub fn get(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).cloned()
    }

    /// Looks up an account by either role's ledger external id.
    #[must_use]
    pub fn get_by_external_id(&self, external_id: FireflyId) -> Option<Account> {
        self.by_external
            .get(&external_id)
            .and_then(|id| self.accounts.get(id))
            .cloned()
    }

    /// Looks up an account by its feed id.
    #[must_use]
    pub fn get_by_akahu_id(&self, akahu_id: &AkahuId) -> Option<Account> {
        self.by_akahu
            .get(akahu_id)
            .and_then(|id| self.accounts.get(id))
            .cloned()
    }

    /// Looks up an account by bank number, canonicalizing the input
    /// first. Returns `None` for inputs that are not bank numbers.
    #[must_use]
    pub fn get_by_bank_number(&self, raw: &str) -> Option<Account> {
        let canonical = canonical_bank_number(raw)?;
        self.by_bank
            .get(&canonical)
            .and_then(|id| self.accounts.get(id))
            .cloned()
    }

    /// Looks up an account by any of its names, normalizing the input
    /// first.
    #[must_use]
    pub fn get_by_name(&self, raw: &str) -> Option<Account> {
        self.by_name
            .get(&normalize_name(raw))
            .and_then(|id| self.accounts.get(id))
            .cloned()
    }

    /// Returns the account whose name is most similar to the query,
    /// with its Sørensen–Dice score.
    ///
    /// Scans every name in insertion order; on a tied score the
    /// first-seen entry wins.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoAccounts`] when the store is empty.
    pub fn get_by_name_fuzzy(&self, query: &str) -> Result<(Account, f64)> {
        let needle = normalize_name(query);
        let mut best: Option<(AccountId, f64)> = None;
        for (id, account) in &self.accounts {
            for name in account.alternate_names.keys() {
                let score = dice_coefficient(&needle, name);
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((*id, score));
                }
            }
        }
        let (id, score) = best.ok_or(SyncError::NoAccounts)?;
        let account = self.accounts.get(&id).cloned().ok_or(SyncError::UnknownId {
            entity: "account",
            id: id.into_inner(),
        })?;
        Ok((account, score))
    }

    /// Deep clone of the whole store, including the id counter and all
    /// indices. The clone is fully independent.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Iterates deep-cloned snapshots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Account> + '_ {
        self.accounts.values().cloned()
    }

    /// Verifies no secondary key of `account` is held by a different
    /// account.
    fn ensure_unique(&self, account: &Account, exclude: Option<AccountId>) -> Result<()> {
        let taken = |held: Option<&AccountId>| held.is_some_and(|id| Some(*id) != exclude);
        if let Some(akahu) = &account.akahu_id {
            if taken(self.by_akahu.get(akahu)) {
                return Err(SyncError::DuplicateKey {
                    index: "akahuId",
                    key: akahu.to_string(),
                });
            }
        }
        for bank in &account.bank_numbers {
            if taken(self.by_bank.get(bank)) {
                return Err(SyncError::DuplicateKey {
                    index: "bankNumber",
                    key: bank.clone(),
                });
            }
        }
        for name in account.alternate_names.keys() {
            if taken(self.by_name.get(name)) {
                return Err(SyncError::DuplicateKey {
                    index: "name",
                    key: name.clone(),
                });
            }
        }
        for external in account.external_ids() {
            if taken(self.by_external.get(&external)) {
                return Err(SyncError::DuplicateKey {
                    index: "externalId",
                    key: external.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Registers every secondary key of an account.
    fn index(&mut self, keys: &IndexKeys, id: AccountId) {
        if let Some(akahu) = &keys.akahu {
            self.by_akahu.insert(akahu.clone(), id);
        }
        for bank in &keys.banks {
            self.by_bank.insert(bank.clone(), id);
        }
        for name in &keys.names {
            self.by_name.insert(name.clone(), id);
        }
        for external in &keys.externals {
            self.by_external.insert(*external, id);
        }
    }

    /// Removes every secondary key of an account.
    fn deindex(&mut self, keys: &IndexKeys) {
        if let Some(akahu) = &keys.akahu {
            self.by_akahu.remove(akahu);
        }
        for bank in &keys.banks {
            self.by_bank.remove(bank);
        }
        for name in &keys.names {
            self.by_name.remove(name);
        }
        for external in &keys.externals {
            self.by_external.remove(external);
        }
    }
}

/// Checks the account invariants that hold independent of store state.
fn validate(account: &Account) -> Result<()> {
    if account.source.is_none() && account.destination.is_none() {
        return Err(SyncError::InvalidAccount {
            name: account.name.clone(),
            reason: "account must carry at least one role",
        });
    }
    if let (Some(source), Some(destination)) = (&account.source, &account.destination) {
        if source.kind.is_owned()
            && destination.kind.is_owned()
            && source.external_id != destination.external_id
        {
            return Err(SyncError::InvalidAccount {
                name: account.name.clone(),
                reason: "owned roles must reference the same ledger row",
            });
        }
    }
    if !account
        .alternate_names
        .contains_key(&account.normalized_name())
    {
        return Err(SyncError::InvalidAccount {
            name: account.name.clone(),
            reason: "primary name missing from alternate names",
        });
    }
    Ok(())
}

/// Rejects changes to identity fields that are already set.
fn check_immutable(existing: &Account, incoming: &Account) -> Result<()> {
    let id = existing.id.into_inner();
    if existing.akahu_id.is_some() && incoming.akahu_id != existing.akahu_id {
        return Err(SyncError::ImmutableField {
            entity: "account",
            field: "akahuId",
            id,
        });
    }
    let role_external = |role: &Option<crate::models::AccountRole>| {
        role.as_ref().and_then(|role| role.external_id)
    };
    if let Some(old) = role_external(&existing.source) {
        if role_external(&incoming.source) != Some(old) {
            return Err(SyncError::ImmutableField {
                entity: "account",
                field: "source.externalId",
                id,
            });
        }
    }
    if let Some(old) = role_external(&existing.destination) {
        if role_external(&incoming.destination) != Some(old) {
            return Err(SyncError::ImmutableField {
                entity: "account",
                field: "destination.externalId",
                id,
            });
        }
    }
    Ok(())
}
