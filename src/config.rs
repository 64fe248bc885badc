//! Environment-driven configuration.

use crate::error::{Result, SyncError};

/// Everything a reconciliation run needs from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Feed cache database URL (`DATABASE_URL`).
    pub database_url: String,
    /// Ledger database URL (`FIREFLY_DATABASE_URL`).
    pub firefly_database_url: String,
    /// Base path of the ledger's write API (`FIREFLY_BASE_PATH`).
    pub firefly_base_path: String,
    /// Personal access token for the write API (`FIREFLY_API_KEY`).
    pub firefly_api_key: String,
    /// Feed application token (`AKAHU_APP_TOKEN`).
    pub akahu_app_token: String,
    /// Feed user token (`AKAHU_USER_TOKEN`).
    pub akahu_user_token: String,
    /// Whether to refresh the feed cache from the provider before the
    /// run (`LOAD_AKAHU_DATA`).
    pub load_akahu_data: bool,
    /// Whether to suppress remote writes (`DRY_RUN`).
    pub dry_run: bool,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the first required variable
    /// that is missing or empty.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            firefly_database_url: required("FIREFLY_DATABASE_URL")?,
            firefly_base_path: required("FIREFLY_BASE_PATH")?,
            firefly_api_key: required("FIREFLY_API_KEY")?,
            akahu_app_token: required("AKAHU_APP_TOKEN")?,
            akahu_user_token: required("AKAHU_USER_TOKEN")?,
            load_akahu_data: truthy("LOAD_AKAHU_DATA"),
            dry_run: truthy("DRY_RUN"),
        })
    }
}

/// Reads a required variable, rejecting empty values.
fn required(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(SyncError::Config { name }),
    }
}

/// Whether an optional flag variable is set to the literal `true`.
fn truthy(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| value == "true")
}
