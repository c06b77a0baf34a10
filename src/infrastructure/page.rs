//! Live-page access for the virtualized betting-history list.
//!
//! All reads and interactions go through in-browser scripts: the list
//! recycles DOM nodes while scrolling, so element handles go stale between
//! any two commands. Scripts query the document at execution time and return
//! plain values, which keeps every operation atomic from the driver's point
//! of view.
//!
//! [`HistoryPage`] is the seam the scraping layer is written against;
//! [`FantocciniPage`] is the WebDriver-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::config::{PageTimings, Selectors};

/// Errors from live-page access.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("webdriver command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),

    #[error("unexpected script result: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("history list container not found within {0:?}")]
    ListUnavailable(Duration),
}

/// Raw summary-row fields, exactly as rendered. Normalization into a
/// [`crate::domain::BetRecord`] happens in the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSummary {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub pari_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub factor: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub stake_amount: String,
    #[serde(default)]
    pub win_amount: String,
    #[serde(default)]
    pub has_freebet: bool,
}

/// Raw expanded-panel fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDetail {
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub pari: String,
    #[serde(default)]
    pub detail_factor: String,
    #[serde(default)]
    pub score: String,
    #[serde(default)]
    pub detail_result: String,
}

/// One leg row of an expanded multi-leg bet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLeg {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub pari: String,
    #[serde(default)]
    pub result: String,
}

/// Operations the scraping layer needs from the history page. One operation
/// is in flight at a time; implementations own the render-settle pauses.
#[async_trait]
pub trait HistoryPage: Send + Sync {
    /// Resets the list viewport to the newest entries.
    async fn scroll_to_top(&self) -> Result<(), PageError>;

    /// Advances the viewport by `px`. `false` means the scroll container was
    /// not found.
    async fn scroll_by(&self, px: u32) -> Result<bool, PageError>;

    /// Coupon ids of rows fully inside the viewport, top to bottom,
    /// date-separator rows excluded.
    async fn visible_coupons(&self) -> Result<Vec<String>, PageError>;

    /// Summary fields of the row bearing `coupon`, or `None` when no such
    /// row is currently rendered.
    async fn summary_of(&self, coupon: &str) -> Result<Option<RawSummary>, PageError>;

    /// Clicks the row's expander. `false` means the row or its expander was
    /// not found.
    async fn expand(&self, coupon: &str) -> Result<bool, PageError>;

    /// Collapses every expanded row; returns how many were closed.
    async fn collapse_expanded(&self) -> Result<u32, PageError>;

    /// Fields of the currently expanded detail panel, if one is rendered.
    async fn detail_panel(&self) -> Result<Option<RawDetail>, PageError>;

    /// Leg rows of the currently expanded multi-leg bet.
    async fn leg_rows(&self) -> Result<Vec<RawLeg>, PageError>;

    /// Whether the list still has content below the current viewport.
    async fn has_more_content(&self) -> Result<bool, PageError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ScrollMetrics {
    #[serde(default)]
    scroll_top: f64,
    #[serde(default)]
    scroll_height: f64,
    #[serde(default)]
    client_height: f64,
}

const VISIBLE_COUPONS_JS: &str = r#"
var list = document.querySelector('__LIST__');
var viewport = document.querySelector('__VIEWPORT__');
if (!list || !viewport) return [];
var bounds = viewport.getBoundingClientRect();
var rows = list.querySelectorAll('div[style*="top"]');
var coupons = [];
for (var i = 0; i < rows.length; i++) {
    var row = rows[i];
    if (row.querySelector('__STICKY__')) continue;
    var rect = row.getBoundingClientRect();
    if (rect.top < bounds.top || rect.bottom > bounds.bottom) continue;
    var cell = row.querySelector('__COUPON__ span');
    if (cell && cell.textContent.trim()) coupons.push(cell.textContent.trim());
}
return coupons;
"#;

const SUMMARY_JS: &str = r#"
var coupon = arguments[0];
var list = document.querySelector('__LIST__');
if (!list) return null;
var rows = list.querySelectorAll('div[style*="top"]');
for (var i = 0; i < rows.length; i++) {
    var row = rows[i];
    if (row.querySelector('__STICKY__')) continue;
    var cell = row.querySelector('__COUPON__ span');
    if (!cell || cell.textContent.trim() !== coupon) continue;

    var timeElem = row.querySelector('__TIME__');
    var typeElem = row.querySelector('__TYPE__ __TEXT__');
    var descElem = row.querySelector('__DESC__ __TEXT__');
    var factorElem = row.querySelector('__FACTOR__ span');
    var resultElem = row.querySelector('__RESULT__');
    var sumElem = row.querySelector('__SUM__');
    var freebetElem = row.querySelector('__DESC__ __FREEBET__');
    var hasFreebet = !!(freebetElem && freebetElem.textContent.trim() === 'Фрибет');

    var stake = '';
    var win = '';
    if (sumElem) {
        var grayed = sumElem.querySelector('__GRAYED__');
        var primary = sumElem.querySelector('__PRIMARY__');
        if (grayed) stake = grayed.textContent.trim();
        if (primary) {
            var text = primary.textContent.trim();
            if (grayed) text = text.replace(grayed.textContent.trim(), '').trim();
            win = text.replace(/\s+/g, ' ').trim();
        }
    }

    return {
        time: timeElem ? timeElem.textContent.trim() : '',
        pari_type: typeElem ? typeElem.textContent.trim() : '',
        description: descElem ? descElem.textContent.trim() : '',
        factor: factorElem ? factorElem.textContent.trim() : '',
        result: resultElem ? resultElem.textContent.trim() : '',
        stake_amount: stake,
        win_amount: win,
        has_freebet: hasFreebet
    };
}
return null;
"#;

const EXPAND_JS: &str = r#"
var coupon = arguments[0];
var list = document.querySelector('__LIST__');
if (!list) return false;
var rows = list.querySelectorAll('div[style*="top"]');
for (var i = 0; i < rows.length; i++) {
    var row = rows[i];
    if (row.querySelector('__STICKY__')) continue;
    var cell = row.querySelector('__COUPON__ span');
    if (cell && cell.textContent.trim() === coupon) {
        var expander = row.querySelector('__EXPANDER__');
        if (expander) {
            expander.click();
            return true;
        }
    }
}
return false;
"#;

const COLLAPSE_JS: &str = r#"
var expanded = document.querySelectorAll('__EXPANDED_ROW__');
var closed = 0;
for (var i = 0; i < expanded.length; i++) {
    var expander = expanded[i].querySelector('__EXPANDER__');
    if (expander) {
        expander.click();
        closed++;
    }
}
return closed;
"#;

const DETAIL_JS: &str = r#"
var block = document.querySelector('__DETAIL_BLOCK__');
if (!block) return null;
var startElem = block.querySelector('__DETAIL_START__');
var eventElem = block.querySelector('__DETAIL_EVENT__');
var pariElem = block.querySelector('__DETAIL_PARI__');
var factorElem = block.querySelector('__DETAIL_FACTOR__');
var scoreElem = block.querySelector('__DETAIL_SCORE__');
var resultElem = block.querySelector('__DETAIL_RESULT__');
return {
    start_time: startElem ? startElem.textContent.trim() : '',
    event: eventElem ? eventElem.textContent.trim() : '',
    pari: pariElem ? pariElem.textContent.trim() : '',
    detail_factor: factorElem ? factorElem.textContent.trim() : '',
    score: scoreElem ? scoreElem.textContent.trim() : '',
    detail_result: resultElem ? resultElem.textContent.trim() : ''
};
"#;

const LEGS_JS: &str = r#"
var legs = [];
var blocks = document.querySelectorAll('__EXPANDED_ROW__ __DETAIL_BLOCK__');
if (blocks.length > 0) {
    var rows = blocks[0].querySelectorAll('__LEG_ROW__');
    for (var i = 0; i < rows.length; i++) {
        var row = rows[i];
        var eventElem = row.querySelector('__DETAIL_EVENT__');
        var pariElem = row.querySelector('__LEG_PARI__');
        var resultElem = row.querySelector('__LEG_RESULT__');
        if (eventElem && pariElem && resultElem) {
            legs.push({
                event: eventElem.textContent.trim(),
                pari: pariElem.textContent.trim(),
                result: resultElem.textContent.trim()
            });
        }
    }
}
return legs;
"#;

const SCROLL_TOP_JS: &str = r#"
var viewport = document.querySelector('__VIEWPORT__');
if (!viewport) return false;
viewport.scrollTop = 0;
return true;
"#;

const SCROLL_BY_JS: &str = r#"
var viewport = document.querySelector('__VIEWPORT__');
if (!viewport) return false;
viewport.scrollTop = viewport.scrollTop + arguments[0];
return true;
"#;

const METRICS_JS: &str = r#"
var viewport = document.querySelector('__VIEWPORT__');
if (!viewport) return null;
return {
    scroll_top: viewport.scrollTop,
    scroll_height: viewport.scrollHeight,
    client_height: viewport.clientHeight
};
"#;

/// Substitutes configured selectors into a script template.
fn fill_template(template: &str, s: &Selectors) -> String {
    template
        .replace("__VIEWPORT__", &s.viewport)
        .replace("__LIST__", &s.virtual_list)
        .replace("__STICKY__", &s.sticky_date)
        .replace("__COUPON__", &s.coupon_cell)
        .replace("__TIME__", &s.time_cell)
        .replace("__TYPE__", &s.type_cell)
        .replace("__DESC__", &s.desc_cell)
        .replace("__TEXT__", &s.label_text)
        .replace("__FREEBET__", &s.freebet_badge)
        .replace("__FACTOR__", &s.factor_cell)
        .replace("__RESULT__", &s.result_cell)
        .replace("__SUM__", &s.sum_cell)
        .replace("__GRAYED__", &s.sum_grayed)
        .replace("__PRIMARY__", &s.sum_primary)
        .replace("__EXPANDER__", &s.expander)
        .replace("__EXPANDED_ROW__", &s.expanded_row)
        .replace("__DETAIL_BLOCK__", &s.detail_block)
        .replace("__DETAIL_START__", &s.detail_start)
        .replace("__DETAIL_EVENT__", &s.detail_event)
        .replace("__DETAIL_PARI__", &s.detail_pari)
        .replace("__DETAIL_FACTOR__", &s.detail_factor)
        .replace("__DETAIL_SCORE__", &s.detail_score)
        .replace("__DETAIL_RESULT__", &s.detail_result)
        .replace("__LEG_ROW__", &s.leg_row)
        .replace("__LEG_PARI__", &s.leg_pari)
        .replace("__LEG_RESULT__", &s.leg_result)
}

/// WebDriver-backed [`HistoryPage`].
pub struct FantocciniPage {
    client: Client,
    selectors: Selectors,
    timings: PageTimings,
}

impl FantocciniPage {
    #[must_use]
    pub fn new(client: Client, selectors: Selectors, timings: PageTimings) -> Self {
        Self {
            client,
            selectors,
            timings,
        }
    }

    /// Hands the client back, e.g. to close the session.
    #[must_use]
    pub fn into_client(self) -> Client {
        self.client
    }

    /// Navigates to the history listing page.
    pub async fn goto(&self, url: &str) -> Result<(), PageError> {
        info!("navigating to {url}");
        self.client.goto(url).await?;
        Ok(())
    }

    /// Waits for the scrollable list container. Its absence is the one page
    /// condition that ends a run before it starts.
    pub async fn wait_for_list(&self) -> Result<(), PageError> {
        let timeout = Duration::from_secs(self.timings.list_wait_secs);
        self.client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(&self.selectors.viewport))
            .await
            .map_err(|_| PageError::ListUnavailable(timeout))?;
        info!("history list container is present");
        Ok(())
    }

    /// Hydrates the virtual list: gradual scroll to the bottom so every row
    /// gets rendered at least once, then back to the top.
    pub async fn preload(&self) -> Result<(), PageError> {
        info!("preloading history list");
        let mut attempts = 0u32;
        while attempts < self.timings.preload_max_attempts {
            let Some(before) = self.metrics().await? else {
                warn!("scroll container disappeared during preload");
                break;
            };
            if !self.scroll_by_raw(self.timings.preload_step_px).await? {
                break;
            }
            sleep(Duration::from_millis(self.timings.preload_delay_ms)).await;

            let Some(after) = self.metrics().await? else {
                break;
            };
            if after.scroll_top + after.client_height >= after.scroll_height {
                debug!("preload reached the end of the list");
                break;
            }
            if (after.scroll_top - before.scroll_top).abs() < f64::EPSILON {
                debug!("preload scroll position stopped advancing");
                break;
            }
            attempts += 1;
        }
        self.scroll_to_top().await
    }

    async fn exec(&self, template: &str, args: Vec<Value>) -> Result<Value, PageError> {
        let script = fill_template(template, &self.selectors);
        Ok(self.client.execute(&script, args).await?)
    }

    async fn scroll_by_raw(&self, px: u32) -> Result<bool, PageError> {
        let value = self.exec(SCROLL_BY_JS, vec![Value::from(px)]).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn metrics(&self) -> Result<Option<ScrollMetrics>, PageError> {
        let value = self.exec(METRICS_JS, Vec::new()).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

#[async_trait]
impl HistoryPage for FantocciniPage {
    async fn scroll_to_top(&self) -> Result<(), PageError> {
        let value = self.exec(SCROLL_TOP_JS, Vec::new()).await?;
        if !value.as_bool().unwrap_or(false) {
            warn!("scroll container not found while resetting to top");
        }
        sleep(Duration::from_millis(self.timings.top_settle_ms)).await;
        Ok(())
    }

    async fn scroll_by(&self, px: u32) -> Result<bool, PageError> {
        let moved = self.scroll_by_raw(px).await?;
        // Give the virtualized list a moment to swap rows in.
        sleep(Duration::from_millis(self.timings.scroll_settle_ms)).await;
        Ok(moved)
    }

    async fn visible_coupons(&self) -> Result<Vec<String>, PageError> {
        let value = self.exec(VISIBLE_COUPONS_JS, Vec::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn summary_of(&self, coupon: &str) -> Result<Option<RawSummary>, PageError> {
        let value = self
            .exec(SUMMARY_JS, vec![Value::from(coupon)])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn expand(&self, coupon: &str) -> Result<bool, PageError> {
        let value = self.exec(EXPAND_JS, vec![Value::from(coupon)]).await?;
        let clicked = value.as_bool().unwrap_or(false);
        if clicked {
            sleep(Duration::from_millis(self.timings.expand_settle_ms)).await;
        }
        Ok(clicked)
    }

    async fn collapse_expanded(&self) -> Result<u32, PageError> {
        let value = self.exec(COLLAPSE_JS, Vec::new()).await?;
        let closed = value.as_u64().unwrap_or(0) as u32;
        if closed > 0 {
            sleep(Duration::from_millis(self.timings.collapse_settle_ms)).await;
        }
        Ok(closed)
    }

    async fn detail_panel(&self) -> Result<Option<RawDetail>, PageError> {
        let value = self.exec(DETAIL_JS, Vec::new()).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn leg_rows(&self) -> Result<Vec<RawLeg>, PageError> {
        let value = self.exec(LEGS_JS, Vec::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn has_more_content(&self) -> Result<bool, PageError> {
        let Some(m) = self.metrics().await? else {
            return Ok(false);
        };
        let margin = f64::from(self.timings.end_of_list_margin_px);
        Ok(m.scroll_top + m.client_height < m.scroll_height - margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_summary_decodes_with_missing_fields() {
        let value = json!({
            "time": "12:30:45",
            "result": "Выигрыш",
            "has_freebet": true
        });
        let raw: RawSummary = serde_json::from_value(value).unwrap();
        assert_eq!(raw.time, "12:30:45");
        assert_eq!(raw.result, "Выигрыш");
        assert!(raw.has_freebet);
        assert_eq!(raw.stake_amount, "");
    }

    #[test]
    fn raw_legs_decode_from_array() {
        let value = json!([
            {"event": "A - B", "pari": "П1", "result": "Выигрыш"},
            {"event": "C - D", "pari": "X", "result": "Проигрыш"}
        ]);
        let legs: Vec<RawLeg> = serde_json::from_value(value).unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[1].event, "C - D");
    }

    #[test]
    fn templates_have_no_unfilled_tokens() {
        let selectors = Selectors::default();
        let scripts = [
            ("visible", VISIBLE_COUPONS_JS),
            ("summary", SUMMARY_JS),
            ("expand", EXPAND_JS),
            ("collapse", COLLAPSE_JS),
            ("detail", DETAIL_JS),
            ("legs", LEGS_JS),
            ("scroll_top", SCROLL_TOP_JS),
            ("scroll_by", SCROLL_BY_JS),
            ("metrics", METRICS_JS),
        ];
        let tokens = [
            "__VIEWPORT__", "__LIST__", "__STICKY__", "__COUPON__", "__TIME__",
            "__TYPE__", "__DESC__", "__TEXT__", "__FREEBET__", "__FACTOR__",
            "__RESULT__", "__SUM__", "__GRAYED__", "__PRIMARY__", "__EXPANDER__",
            "__EXPANDED_ROW__", "__DETAIL_BLOCK__", "__DETAIL_START__",
            "__DETAIL_EVENT__", "__DETAIL_PARI__", "__DETAIL_FACTOR__",
            "__DETAIL_SCORE__", "__DETAIL_RESULT__", "__LEG_ROW__",
            "__LEG_PARI__", "__LEG_RESULT__",
        ];
        for (name, template) in scripts {
            let script = fill_template(template, &selectors);
            for token in tokens {
                assert!(
                    !script.contains(token),
                    "{name} still contains {token}:\n{script}"
                );
            }
        }
    }
}
