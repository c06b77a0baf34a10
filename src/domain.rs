//! Domain model for the betting-history ledger.

pub mod bet;
pub mod run;

pub use bet::{BetKind, BetLeg, BetRecord, ResultStatus};
pub use run::{RunReport, RunState};
