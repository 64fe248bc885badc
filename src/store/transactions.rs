//! The indexed transaction store.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, SyncError};
use crate::models::{AkahuId, FireflyId, NewTransaction, Transaction, TransactionId};

/// Keyed collection of [`Transaction`]s with two secondary indices:
/// ledger id and feed transaction id.
///
/// `firefly_id` is unique and write-once; every feed id is unique
/// across all transactions in the store and the set on one transaction
/// may only grow. Iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct TransactionStore {
    /// Next internal id to assign.
    next_id: u64,
    /// Primary storage, keyed (and therefore iterated) by internal id.
    transactions: BTreeMap<TransactionId, Transaction>,
    /// Ledger id -> internal id.
    by_firefly: HashMap<FireflyId, TransactionId>,
    /// Feed transaction id -> internal id.
    by_akahu: HashMap<AkahuId, TransactionId>,
}

impl TransactionStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions in the store.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the store is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Assigns the next internal id to the candidate and indexes it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateKey`] when the candidate's ledger
    /// id or any of its feed ids is already held by another
    /// transaction.
    pub fn create(&mut self, new: NewTransaction) -> Result<Transaction> {
        let transaction = Transaction::from_new(TransactionId::new(self.next_id), new);
        self.ensure_unique(&transaction, None)?;
        self.next_id += 1;
        self.index(&transaction);
        self.transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    /// Replaces the stored transaction with the same id.
    ///
    /// All checks run before any index is touched, so a failed save
    /// leaves the store untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownId`] when no transaction has this
    /// id, [`SyncError::ImmutableField`] when a set `firefly_id` would
    /// change or a feed id would be removed, and
    /// [`SyncError::DuplicateKey`] on an index collision with a
    /// different transaction.
    pub fn save(&mut self, transaction: Transaction) -> Result<()> {
        let existing = self
            .transactions
            .get(&transaction.id)
            .ok_or(SyncError::UnknownId {
                entity: "transaction",
                id: transaction.id.into_inner(),
            })?;
        let id = existing.id.into_inner();
        if existing.firefly_id.is_some() && transaction.firefly_id != existing.firefly_id {
            return Err(SyncError::ImmutableField {
                entity: "transaction",
                field: "fireflyId",
                id,
            });
        }
        if !existing
            .akahu_ids
            .iter()
            .all(|akahu| transaction.akahu_ids.contains(akahu))
        {
            return Err(SyncError::ImmutableField {
                entity: "transaction",
                field: "akahuIds",
                id,
            });
        }
        let old = existing.clone();
        self.ensure_unique(&transaction, Some(transaction.id))?;
        self.deindex(&old);
        self.index(&transaction);
        self.transactions.insert(transaction.id, transaction);
        Ok(())
    }

    /// Returns a deep-cloned snapshot of the transaction with this id.
    #[must_use]
    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.get(&id).cloned()
    }

    /// Looks up a transaction by its ledger id.
    #[must_use]
    pub fn get_by_firefly_id(&self, firefly_id: FireflyId) -> Option<Transaction> {
        self.by_firefly
            .get(&firefly_id)
            .and_then(|id| self.transactions.get(id))
            .cloned()
    }

    /// Looks up a transaction by one of its feed ids.
    #[must_use]
    pub fn get_by_akahu_id(&self, akahu_id: &AkahuId) -> Option<Transaction> {
        self.by_akahu
            .get(akahu_id)
            .and_then(|id| self.transactions.get(id))
            .cloned()
    }

    /// Deep clone of the whole store, including the id counter and all
    /// indices. The clone is fully independent.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Iterates deep-cloned snapshots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Transaction> + '_ {
        self.transactions.values().cloned()
    }

    /// Internal ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<TransactionId> {
        self.transactions.keys().copied().collect()
    }

    /// Consumes the store, yielding its transactions in insertion
    /// order.
    #[must_use]
    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions.into_values().collect()
    }

    /// Verifies no index key of `transaction` is held by a different
    /// transaction.
    fn ensure_unique(&self, transaction: &Transaction, exclude: Option<TransactionId>) -> Result<()> {
        let taken = |held: Option<&TransactionId>| held.is_some_and(|id| Some(*id) != exclude);
        if let Some(firefly) = transaction.firefly_id {
            if taken(self.by_firefly.get(&firefly)) {
                return Err(SyncError::DuplicateKey {
                    index: "fireflyId",
                    key: firefly.to_string(),
                });
            }
        }
        for akahu in &transaction.akahu_ids {
            if taken(self.by_akahu.get(akahu)) {
                return Err(SyncError::DuplicateKey {
                    index: "akahuId",
                    key: akahu.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Registers every index key of a transaction.
    fn index(&mut self, transaction: &Transaction) {
        if let Some(firefly) = transaction.firefly_id {
            self.by_firefly.insert(firefly, transaction.id);
        }
        for akahu in &transaction.akahu_ids {
            self.by_akahu.insert(akahu.clone(), transaction.id);
        }
    }

    /// Removes every index key of a transaction.
    fn deindex(&mut self, transaction: &Transaction) {
        if let Some(firefly) = transaction.firefly_id {
            self.by_firefly.remove(&firefly);
        }
        for akahu in &transaction.akahu_ids {
            self.by_akahu.remove(akahu);
        }
    }
}
