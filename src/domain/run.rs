//! Per-invocation run state and the report a finished run produces.
//!
//! The seen-set and collected batch are scoped to one engine invocation and
//! discarded with it; the only state that outlives a run is the ledger file.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::bet::BetRecord;

/// Mutable state owned by the reconciliation engine for one run.
#[derive(Debug)]
pub struct RunState {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    seen: HashSet<String>,
    collected: Vec<BetRecord>,
    /// Events handled this run, including pending and already-stored ones.
    pub processed: u64,
    /// Consecutive scroll steps that surfaced nothing new.
    pub empty_scroll_streak: u32,
}

impl RunState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            seen: HashSet::new(),
            collected: Vec::new(),
            processed: 0,
            empty_scroll_streak: 0,
        }
    }

    #[must_use]
    pub fn is_seen(&self, coupon: &str) -> bool {
        self.seen.contains(coupon)
    }

    pub fn mark_seen(&mut self, coupon: &str) {
        self.seen.insert(coupon.to_string());
    }

    pub fn collect(&mut self, record: BetRecord) {
        self.collected.push(record);
    }

    #[must_use]
    pub fn collected_count(&self) -> usize {
        self.collected.len()
    }

    /// Updates the stall counter after a discovery/extract pass.
    pub fn note_batch(&mut self, progressed: usize) {
        if progressed > 0 {
            self.empty_scroll_streak = 0;
        } else {
            self.empty_scroll_streak += 1;
        }
    }

    #[must_use]
    pub fn into_report(self, requested: Option<u64>, stalled: bool) -> RunReport {
        let duration = Utc::now()
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default();
        RunReport {
            session_id: self.session_id,
            requested,
            processed: self.processed,
            records: self.collected,
            stalled,
            duration,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one engine run. Falling short of the requested count is
/// reported, not treated as an error.
#[derive(Debug)]
pub struct RunReport {
    pub session_id: Uuid,
    pub requested: Option<u64>,
    pub processed: u64,
    pub records: Vec<BetRecord>,
    pub stalled: bool,
    pub duration: Duration,
}

impl RunReport {
    #[must_use]
    pub fn collected_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_set_tracks_coupons() {
        let mut state = RunState::new();
        assert!(!state.is_seen("123"));
        state.mark_seen("123");
        assert!(state.is_seen("123"));
    }

    #[test]
    fn empty_batches_build_a_streak() {
        let mut state = RunState::new();
        state.note_batch(0);
        state.note_batch(0);
        assert_eq!(state.empty_scroll_streak, 2);
        state.note_batch(3);
        assert_eq!(state.empty_scroll_streak, 0);
    }

    #[test]
    fn report_carries_counts() {
        let mut state = RunState::new();
        state.processed = 4;
        state.collect(BetRecord::default());
        let report = state.into_report(Some(10), true);
        assert_eq!(report.processed, 4);
        assert_eq!(report.collected_count(), 1);
        assert_eq!(report.requested, Some(10));
        assert!(report.stalled);
    }
}
