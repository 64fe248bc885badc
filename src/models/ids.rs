//! Newtype wrappers for entity identifiers.
//!
//! These prevent accidentally mixing up IDs of different entity types
//! at compile time.

use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapping a `Copy` inner type.
macro_rules! define_copy_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Creates a new identifier from the given value.
            #[inline]
            #[must_use]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Consumes the wrapper and returns the inner value.
            #[inline]
            #[must_use]
            pub const fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

define_copy_id! {
    /// Internal stable key of an account within one account store.
    AccountId(u64)
}

define_copy_id! {
    /// Internal stable key of a transaction within one transaction store.
    TransactionId(u64)
}

define_copy_id! {
    /// Primary key of an entity in the ledger's relational store
    /// (Firefly III). Stable across the life of the entity.
    FireflyId(i64)
}

/// An opaque external identifier issued by the feed provider (Akahu).
///
/// Prefixes distinguish scopes: `acc_` for the user's own accounts,
/// `merchant_` for counterparties, `trans_` for transactions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AkahuId(String);

impl AkahuId {
    /// Creates a new identifier from the given string.
    #[inline]
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifies one of the user's own accounts.
    #[inline]
    #[must_use]
    pub fn is_owned_account(&self) -> bool {
        self.0.starts_with("acc_")
    }

    /// Whether this identifies a feed transaction.
    #[inline]
    #[must_use]
    pub fn is_transaction(&self) -> bool {
        self.0.starts_with("trans_")
    }

    /// Whether this identifies a merchant.
    #[inline]
    #[must_use]
    pub fn is_merchant(&self) -> bool {
        self.0.starts_with("merchant_")
    }
}

impl core::fmt::Display for AkahuId {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<String> for AkahuId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AkahuId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
