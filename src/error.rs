//! Error types for the reconciliation pipeline.

use crate::models::{AccountKind, AkahuId, FireflyId};

/// All errors that can occur during a reconciliation run.
///
/// Configuration and data-integrity variants abort the run; store-level
/// variants (`UnknownId`, `DuplicateKey`, `ImmutableField`) indicate
/// logic bugs when they escape an importer. Remote-write failures are
/// handled inside the exporter and never surface as this type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A required environment variable is missing or empty.
    #[error("missing required environment variable {name}")]
    Config {
        /// Name of the missing variable.
        name: &'static str,
    },

    /// An HTTP request failed at the transport level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote API returned a non-success status.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the server.
        message: String,
    },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A date string could not be parsed.
    #[error("date parse error: {0}")]
    DateParse(#[from] chrono::ParseError),

    /// A numeric amount could not be represented as an exact decimal.
    #[error("amount is not representable as a decimal: {value}")]
    InvalidAmount {
        /// The offending raw value.
        value: String,
    },

    /// A cached feed record is structurally unusable.
    #[error("malformed feed record: {reason}")]
    MalformedFeedRecord {
        /// What was wrong with the record.
        reason: String,
    },

    /// A store operation referenced an id that is not present.
    #[error("unknown {entity} id {id}")]
    UnknownId {
        /// Entity kind ("account" or "transaction").
        entity: &'static str,
        /// The missing internal id.
        id: u64,
    },

    /// A store mutation would collide with an existing secondary key.
    #[error("duplicate {index} key: {key}")]
    DuplicateKey {
        /// Which secondary index collided.
        index: &'static str,
        /// The colliding key value.
        key: String,
    },

    /// A store update attempted to change an identity field that was
    /// already set.
    #[error("{field} is immutable once set on {entity} {id}")]
    ImmutableField {
        /// Entity kind ("account" or "transaction").
        entity: &'static str,
        /// The field that may not change.
        field: &'static str,
        /// The internal id of the entity.
        id: u64,
    },

    /// A fuzzy name lookup was attempted against an empty store.
    #[error("cannot fuzzy-match against an empty account store")]
    NoAccounts,

    /// An account's role records violate the store invariants.
    #[error("invalid account \"{name}\": {reason}")]
    InvalidAccount {
        /// Display name of the offending account.
        name: String,
        /// Which invariant was violated.
        reason: &'static str,
    },

    /// A ledger account row matched more than one distinct existing
    /// account, or matched one it cannot be merged into.
    #[error("account conflict\ncandidate: {candidate}\nmatches:\n{}", matches.join("\n"))]
    AccountConflict {
        /// Debug dump of the candidate account.
        candidate: String,
        /// Debug dumps of every existing account it matched.
        matches: Vec<String>,
    },

    /// A ledger transaction references an account id that was never
    /// imported.
    #[error("transaction references unknown ledger account {external_id}")]
    MissingAccount {
        /// The ledger-side account id that failed to resolve.
        external_id: FireflyId,
    },

    /// A feed transaction belongs to an account that is not configured
    /// as an owned (asset or liability) account in the ledger.
    #[error("feed account {akahu_id} is not configured as an owned account")]
    UnconfiguredAccount {
        /// The feed-side account id.
        akahu_id: AkahuId,
    },

    /// Internal-transfer fusion left one or more sides unpaired.
    #[error("unmatched internal transfers:\n{}", leftover.join("\n"))]
    UnmatchedTransfer {
        /// Debug dumps of every unpaired transfer transaction.
        leftover: Vec<String>,
    },

    /// The (source kind, destination kind) pair has no ledger
    /// transaction kind.
    #[error("no transaction kind for {source_kind} -> {destination_kind}")]
    InvalidKind {
        /// Kind of the source account role.
        source_kind: AccountKind,
        /// Kind of the destination account role.
        destination_kind: AccountKind,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_display_names_variable() {
        let err = SyncError::Config { name: "FIREFLY_API_KEY" };
        assert!(err.to_string().contains("FIREFLY_API_KEY"));
    }

    #[test]
    fn error_from_serde_json() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = SyncError::from(serde_err);
        assert!(matches!(err, SyncError::Serialization(_)));
        assert!(err.to_string().contains("serialization error"));
    }

    #[test]
    fn duplicate_key_display() {
        let err = SyncError::DuplicateKey {
            index: "bankNumber",
            key: "12-3456-7890123-000".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bankNumber"));
        assert!(msg.contains("12-3456-7890123-000"));
    }

    #[test]
    fn account_conflict_lists_matches() {
        let err = SyncError::AccountConflict {
            candidate: "Candidate".to_owned(),
            matches: vec!["First".to_owned(), "Second".to_owned()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Candidate"));
        assert!(msg.contains("First"));
        assert!(msg.contains("Second"));
    }

    #[test]
    fn invalid_kind_display() {
        let err = SyncError::InvalidKind {
            source_kind: AccountKind::Expense,
            destination_kind: AccountKind::Revenue,
        };
        assert!(err.to_string().contains("expense"));
        assert!(err.to_string().contains("revenue"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
