//! Run modes: the same discover/extract machinery under different
//! termination predicates and merge strategies.

use chrono::NaiveDate;

use crate::infrastructure::store::MergeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Collect records placed on one calendar date; new rows are prepended
    /// to the ledger.
    ByDate(NaiveDate),
    /// Walk the `n` most recent events and keep the ones the ledger does not
    /// have yet. Pending and already-stored events count toward `n`.
    Incremental(u64),
    /// Collect `n` settled records from scratch and replace the ledger,
    /// keeping the previous file as a backup.
    Rewrite(u64),
}

impl RunMode {
    #[must_use]
    pub fn merge_mode(self) -> MergeMode {
        match self {
            Self::ByDate(_) | Self::Incremental(_) => MergeMode::Prepend,
            Self::Rewrite(_) => MergeMode::Replace,
        }
    }

    /// The requested upper bound, when the mode has one.
    #[must_use]
    pub fn requested(self) -> Option<u64> {
        match self {
            Self::ByDate(_) => None,
            Self::Incremental(n) | Self::Rewrite(n) => Some(n),
        }
    }

    /// Whether already-persisted coupons should be skipped instead of
    /// re-extracted.
    #[must_use]
    pub fn dedups_against_store(self) -> bool {
        !matches!(self, Self::Rewrite(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_mode_per_run_mode() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        assert_eq!(RunMode::ByDate(date).merge_mode(), MergeMode::Prepend);
        assert_eq!(RunMode::Incremental(10).merge_mode(), MergeMode::Prepend);
        assert_eq!(RunMode::Rewrite(10).merge_mode(), MergeMode::Replace);
    }

    #[test]
    fn requested_counts() {
        assert_eq!(RunMode::Incremental(25).requested(), Some(25));
        assert_eq!(RunMode::Rewrite(5).requested(), Some(5));
        assert_eq!(
            RunMode::ByDate(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()).requested(),
            None
        );
    }

    #[test]
    fn rewrite_ignores_the_stored_set() {
        assert!(RunMode::Incremental(1).dedups_against_store());
        assert!(!RunMode::Rewrite(1).dedups_against_store());
    }
}
