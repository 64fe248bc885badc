//! Importers: ledger rows and cached feed records into the in-memory
//! stores.

mod feed;
mod ledger;

pub use feed::import_feed;
pub use ledger::{import_ledger_accounts, import_ledger_transactions};
