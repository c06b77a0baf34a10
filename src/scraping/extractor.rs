//! Record extraction: summary row reads and the expand/read/collapse
//! protocol for detail fields.

use tracing::{debug, warn};

use crate::domain::bet::{BetLeg, BetRecord};
use crate::infrastructure::page::{HistoryPage, PageError, RawDetail, RawSummary};

/// Extracts and normalizes one record at a time from the live list.
pub struct RecordExtractor<'a, P: HistoryPage + ?Sized> {
    page: &'a P,
    default_stake: u32,
}

impl<'a, P: HistoryPage + ?Sized> RecordExtractor<'a, P> {
    #[must_use]
    pub fn new(page: &'a P, default_stake: u32) -> Self {
        Self {
            page,
            default_stake,
        }
    }

    /// Reads and normalizes the summary row for `coupon`.
    ///
    /// `None` means the row is not currently rendered; the virtualized list
    /// may surface it again on a later pass, so the caller retries rather
    /// than aborting.
    pub async fn extract_summary(&self, coupon: &str) -> Result<Option<BetRecord>, PageError> {
        let Some(raw) = self.page.summary_of(coupon).await? else {
            return Ok(None);
        };
        Ok(Some(self.normalize(coupon, raw)))
    }

    /// Runs the expansion protocol and folds detail fields into `record`.
    ///
    /// Only one row may be expanded at a time, so every expanded row is
    /// collapsed first; otherwise the detail panel read would hit stale data
    /// from a previously expanded record. Detail problems are logged and
    /// leave the record with `expanded == false`; they never fail the
    /// record as a whole.
    pub async fn extract_detail(&self, record: &mut BetRecord) {
        let coupon = record.coupon_number.clone();

        if let Err(err) = self.page.collapse_expanded().await {
            warn!(coupon = %coupon, "pre-expand collapse failed: {err}");
        }

        match self.page.expand(&coupon).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(coupon = %coupon, "expander not found, keeping summary only");
                return;
            }
            Err(err) => {
                warn!(coupon = %coupon, "expand failed: {err}");
                return;
            }
        }

        match self.page.detail_panel().await {
            Ok(Some(detail)) => {
                apply_detail(record, detail);
                record.expanded = true;
            }
            Ok(None) => debug!(coupon = %coupon, "detail panel did not render"),
            Err(err) => warn!(coupon = %coupon, "detail read failed: {err}"),
        }

        if record.expanded && record.kind().is_multi_leg() {
            match self.page.leg_rows().await {
                Ok(legs) => {
                    record.legs = legs
                        .into_iter()
                        .map(|leg| BetLeg {
                            event: leg.event,
                            pari: leg.pari,
                            result: leg.result,
                        })
                        .collect();
                    debug!(coupon = %coupon, "read {} legs", record.legs.len());
                }
                Err(err) => warn!(coupon = %coupon, "leg read failed: {err}"),
            }
        }

        if let Err(err) = self.page.collapse_expanded().await {
            warn!(coupon = %coupon, "post-read collapse failed: {err}");
        }
    }

    fn normalize(&self, coupon: &str, raw: RawSummary) -> BetRecord {
        let mut description = raw.description;
        if raw.has_freebet && !description.is_empty() {
            description.push_str(" (Фрибет)");
        }

        let mut record = BetRecord {
            coupon_number: coupon.to_string(),
            time: raw.time,
            pari_type: raw.pari_type,
            description,
            factor: raw.factor,
            result: raw.result,
            stake_amount: raw.stake_amount,
            win_amount: raw.win_amount,
            has_freebet: raw.has_freebet,
            ..BetRecord::default()
        };
        record.apply_loss_fallback(self.default_stake);
        record
    }
}

/// Detail fields supplement the summary; they never overwrite a value the
/// summary already established.
fn apply_detail(record: &mut BetRecord, detail: RawDetail) {
    record.start_time = record.start_time.take().or(non_empty(detail.start_time));
    record.event = record.event.take().or(non_empty(detail.event));
    record.pari = record.pari.take().or(non_empty(detail.pari));
    record.detail_factor = record
        .detail_factor
        .take()
        .or(non_empty(detail.detail_factor));
    record.score = record.score.take().or(non_empty(detail.score));
    record.detail_result = record
        .detail_result
        .take()
        .or(non_empty(detail.detail_result));
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
