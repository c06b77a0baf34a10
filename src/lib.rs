//! betledger — incremental betting-history scraping into a CSV ledger.
//!
//! The crate reconciles a virtualized, dynamically re-rendered list of
//! wagers against a persisted CSV store: discover the coupons currently in
//! the viewport, expand each new one for detail, skip what the store already
//! has, and merge the collected batch back newest-first.
//!
//! Layout follows the layers:
//! - [`domain`] — the `BetRecord` model and per-run state,
//! - [`infrastructure`] — configuration, logging, the WebDriver-backed page
//!   accessor and the CSV ledger store,
//! - [`scraping`] — visibility tracking, record extraction and the
//!   reconciliation engine itself.

pub mod domain;
pub mod infrastructure;
pub mod scraping;

pub use domain::{BetKind, BetLeg, BetRecord, ResultStatus, RunReport, RunState};
pub use infrastructure::{AppConfig, FantocciniPage, HistoryPage, LedgerStore, MergeMode};
pub use scraping::{ReconciliationEngine, RecordExtractor, RunMode, VisibilityTracker};
