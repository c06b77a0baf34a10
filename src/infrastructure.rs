//! Infrastructure: configuration, logging, the live-page accessor and the
//! CSV ledger store.

pub mod config;
pub mod logging;
pub mod page;
pub mod store;

pub use config::AppConfig;
pub use page::{FantocciniPage, HistoryPage, PageError};
pub use store::{LedgerStore, MergeMode, StoreError};
