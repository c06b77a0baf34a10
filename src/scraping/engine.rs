//! The reconciliation loop: scroll, discover, extract, dedupe, repeat.
//!
//! The engine drives one pass of the virtualized list per scroll step. Every
//! per-record problem is contained to that record; the loop only ends on a
//! termination condition, never on a bad row.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::bet::{BetRecord, ResultStatus};
use crate::domain::run::{RunReport, RunState};
use crate::infrastructure::config::ScrapeConfig;
use crate::infrastructure::page::HistoryPage;

use super::extractor::RecordExtractor;
use super::modes::RunMode;
use super::visibility::VisibilityTracker;

/// Date-bounded scan bookkeeping.
#[derive(Debug, Default)]
struct DateScan {
    /// The target date surfaced at least once.
    found: bool,
    /// Consecutive rows from newer or unparseable dates.
    other_streak: u32,
}

/// Orchestrates one scraping run over the history list.
pub struct ReconciliationEngine<'a, P: HistoryPage + ?Sized> {
    page: &'a P,
    tracker: VisibilityTracker<'a, P>,
    extractor: RecordExtractor<'a, P>,
    config: ScrapeConfig,
    mode: RunMode,
    /// Coupons already persisted; marked seen without re-extraction.
    existing: HashSet<String>,
    today: NaiveDate,
}

impl<'a, P: HistoryPage + ?Sized> ReconciliationEngine<'a, P> {
    #[must_use]
    pub fn new(
        page: &'a P,
        config: ScrapeConfig,
        mode: RunMode,
        existing: HashSet<String>,
        today: NaiveDate,
    ) -> Self {
        let existing = if mode.dedups_against_store() {
            existing
        } else {
            HashSet::new()
        };
        Self {
            tracker: VisibilityTracker::new(page),
            extractor: RecordExtractor::new(page, config.default_stake),
            page,
            config,
            mode,
            existing,
            today,
        }
    }

    /// Runs to a terminal condition and reports what was collected. Falling
    /// short of the requested count ends the run, it does not fail it.
    pub async fn run(self) -> RunReport {
        let mut state = RunState::new();
        info!(session = %state.session_id, mode = ?self.mode, "starting reconciliation run");

        if let Err(err) = self.page.scroll_to_top().await {
            warn!("failed to reset list to top: {err}");
        }

        let mut date_scan = DateScan::default();
        let mut stalled = false;

        loop {
            let visible = self.tracker.visible_ids().await;
            let progressed = self
                .process_batch(&visible, &mut state, &mut date_scan)
                .await;
            state.note_batch(progressed);
            debug!(
                progressed,
                processed = state.processed,
                collected = state.collected_count(),
                "discovery pass done"
            );

            if self.target_reached(&state, &date_scan) {
                break;
            }
            if state.empty_scroll_streak >= self.config.max_empty_scrolls {
                info!(
                    "no new coupons after {} consecutive scroll steps, stopping",
                    state.empty_scroll_streak
                );
                stalled = true;
                break;
            }
            match self.page.has_more_content().await {
                Ok(true) => {}
                Ok(false) => {
                    info!("reached the end of the history list");
                    break;
                }
                Err(err) => {
                    warn!("failed to query list extent: {err}");
                    break;
                }
            }
            match self.page.scroll_by(self.config.scroll_step_px).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("scroll container went away, stopping");
                    stalled = true;
                    break;
                }
                Err(err) => {
                    warn!("scroll failed: {err}");
                    stalled = true;
                    break;
                }
            }
        }

        let report = state.into_report(self.mode.requested(), stalled);
        info!(
            session = %report.session_id,
            processed = report.processed,
            collected = report.collected_count(),
            stalled = report.stalled,
            duration_secs = report.duration.as_secs(),
            "run finished"
        );
        report
    }

    /// Handles every newly visible coupon in viewport order. Returns how
    /// many new coupons this pass surfaced; the stall streak counts passes
    /// that surfaced none.
    async fn process_batch(
        &self,
        visible: &[String],
        state: &mut RunState,
        date_scan: &mut DateScan,
    ) -> usize {
        let mut progressed = 0;

        for coupon in visible {
            if state.is_seen(coupon) {
                continue;
            }
            // Count-bounded modes clamp mid-batch; a date scan finishes the
            // visible batch even after the target date surfaced.
            if !matches!(self.mode, RunMode::ByDate(_))
                && self.target_reached(state, date_scan)
            {
                break;
            }

            let record = match self.extractor.extract_summary(coupon).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(coupon = %coupon, "row not rendered during summary read, retrying on a later pass");
                    continue;
                }
                Err(err) => {
                    warn!(coupon = %coupon, phase = "summary", "extraction failed: {err}");
                    continue;
                }
            };

            progressed += 1;
            state.processed += 1;
            state.mark_seen(coupon);
            if record.status() == ResultStatus::Pending {
                debug!(coupon = %coupon, "pending, excluded from the ledger");
                continue;
            }

            match self.mode {
                RunMode::Incremental(_) => {
                    if self.existing.contains(coupon) {
                        debug!(coupon = %coupon, "already stored");
                        continue;
                    }
                    self.collect(record, state).await;
                }
                RunMode::Rewrite(_) => {
                    self.collect(record, state).await;
                }
                RunMode::ByDate(target) => {
                    let date = record.placed_date(self.today);
                    if date == target {
                        date_scan.found = true;
                        date_scan.other_streak = 0;
                        if self.existing.contains(coupon) {
                            debug!(coupon = %coupon, "already stored");
                            continue;
                        }
                        self.collect(record, state).await;
                    } else if date < target {
                        // Older rows keep the scan alive: the target date may
                        // still be interleaved further down the list.
                        date_scan.other_streak = 0;
                        debug!(coupon = %coupon, %date, "older date, continuing");
                    } else {
                        date_scan.other_streak += 1;
                        debug!(coupon = %coupon, %date, streak = date_scan.other_streak, "date out of range");
                        if date_scan.other_streak >= self.config.date_streak_limit {
                            break;
                        }
                    }
                }
            }
        }

        progressed
    }

    async fn collect(&self, mut record: BetRecord, state: &mut RunState) {
        self.extractor.extract_detail(&mut record).await;
        info!(
            coupon = %record.coupon_number,
            result = %record.result,
            "collected record {} this run",
            state.collected_count() + 1
        );
        state.collect(record);
    }

    fn target_reached(&self, state: &RunState, date_scan: &DateScan) -> bool {
        match self.mode {
            RunMode::Incremental(n) => state.processed >= n,
            RunMode::Rewrite(n) => state.collected_count() as u64 >= n,
            RunMode::ByDate(_) => {
                date_scan.found || date_scan.other_streak >= self.config.date_streak_limit
            }
        }
    }
}
