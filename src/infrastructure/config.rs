//! Application configuration.
//!
//! Settings are layered: compiled defaults, then an optional TOML file, then
//! `BETLEDGER_*` environment overrides. Every struct round-trips through
//! serde so the same shape works for all three layers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// WebDriver endpoint to attach to.
    pub webdriver_url: String,

    /// Betting-history listing page. The session is expected to be
    /// authenticated by the operator; the scraper only navigates and waits.
    pub history_url: String,

    /// Ledger CSV location. Defaults under the user data directory.
    pub store_path: Option<PathBuf>,

    pub logging: LoggingConfig,

    pub scraping: ScrapeConfig,

    /// Page interaction pacing and waits.
    pub timings: PageTimings,

    /// CSS selectors of the target site's markup. Not part of the engine's
    /// contract; kept in configuration so markup churn is a config edit.
    pub selectors: Selectors,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            history_url: "https://fon.bet/account/history/bets".to_string(),
            store_path: None,
            logging: LoggingConfig::default(),
            scraping: ScrapeConfig::default(),
            timings: PageTimings::default(),
            selectors: Selectors::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from defaults, an optional file and environment
    /// overrides (`BETLEDGER_SCRAPING__DEFAULT_STAKE=500` style).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .context("failed to serialize built-in defaults")?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        } else {
            builder = builder.add_source(config::File::with_name("betledger").required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("BETLEDGER").separator("__"),
        );

        builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("configuration did not match the expected shape")
    }

    /// Resolved ledger path: explicit setting, else the user data directory,
    /// else the working directory.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        if let Some(path) = &self.store_path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("betledger").join("bet_history.csv"))
            .unwrap_or_else(|| PathBuf::from("bet_history.csv"))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: String,

    /// Also write a log file next to the ledger.
    pub file_output: bool,

    /// Directory for log files; defaults to `./logs`.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_output: false,
            directory: None,
        }
    }
}

/// Knobs of the reconciliation loop itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Pixel step of one forward scroll of the virtualized list.
    pub scroll_step_px: u32,

    /// Consecutive no-new-coupon scroll steps before the run is declared
    /// stalled.
    pub max_empty_scrolls: u32,

    /// Stake applied when a lost bet renders no amount at all. Inherited
    /// from the legacy scraper's data; kept configurable on purpose.
    pub default_stake: u32,

    /// Date-bounded scans stop after this many consecutive rows from other,
    /// newer or unparseable dates.
    pub date_streak_limit: u32,

    /// Hydrate the virtual list with a full bottom-and-back scroll before
    /// the first discovery pass.
    pub preload: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            scroll_step_px: 300,
            max_empty_scrolls: 5,
            default_stake: 330,
            date_streak_limit: 3,
            preload: true,
        }
    }
}

/// Waits and settle delays for live-page interaction. The virtualized list
/// re-renders asynchronously after every scroll and expand, so each mutating
/// operation is followed by a fixed settle pause.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageTimings {
    /// Upper bound for the history list container to appear. Generous so an
    /// operator can finish logging in by hand.
    pub list_wait_secs: u64,

    pub top_settle_ms: u64,
    pub scroll_settle_ms: u64,
    pub expand_settle_ms: u64,
    pub collapse_settle_ms: u64,

    /// Pre-run hydration scroll: step, per-step delay, attempt cap.
    pub preload_step_px: u32,
    pub preload_delay_ms: u64,
    pub preload_max_attempts: u32,

    /// Distance from the bottom at which the list counts as fully loaded.
    pub end_of_list_margin_px: u32,
}

impl Default for PageTimings {
    fn default() -> Self {
        Self {
            list_wait_secs: 120,
            top_settle_ms: 3000,
            scroll_settle_ms: 2000,
            expand_settle_ms: 2000,
            collapse_settle_ms: 500,
            preload_step_px: 500,
            preload_delay_ms: 500,
            preload_max_attempts: 50,
            end_of_list_margin_px: 100,
        }
    }
}

/// CSS selectors of the history page markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub viewport: String,
    pub virtual_list: String,
    pub sticky_date: String,
    pub coupon_cell: String,
    pub time_cell: String,
    pub type_cell: String,
    pub desc_cell: String,
    pub label_text: String,
    pub freebet_badge: String,
    pub factor_cell: String,
    pub result_cell: String,
    pub sum_cell: String,
    pub sum_grayed: String,
    pub sum_primary: String,
    pub expander: String,
    pub expanded_row: String,
    pub detail_block: String,
    pub detail_start: String,
    pub detail_event: String,
    pub detail_pari: String,
    pub detail_factor: String,
    pub detail_score: String,
    pub detail_result: String,
    pub leg_row: String,
    pub leg_pari: String,
    pub leg_result: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            viewport: "div.scroll-area__view-port__default--J1yYl._vertical-overflow--MM_JO"
                .to_string(),
            virtual_list: "div.virtual-list--FMDYy".to_string(),
            sticky_date: ".stickyDate--C07hV".to_string(),
            coupon_cell: ".cellCouponNumber--K_lV2".to_string(),
            time_cell: ".cellDateTime--aAcVV".to_string(),
            type_cell: ".cellPariType--NT1UE".to_string(),
            desc_cell: ".cellDescription--qMVcZ".to_string(),
            label_text: ".text--Y2SFL".to_string(),
            freebet_badge: ".desc--FgM5R".to_string(),
            factor_cell: ".cellFactor--EzOlj".to_string(),
            result_cell: ".cellResult--RBrFe".to_string(),
            sum_cell: ".cellSum--xyTuh".to_string(),
            sum_grayed: ".grayed--i1Uac".to_string(),
            sum_primary: ".sum-row-primary--l0hdi".to_string(),
            expander: ".expander--R_AYG".to_string(),
            expanded_row: "div.row--ybiPS._expanded--nyYLU".to_string(),
            detail_block: "div.data--SaCy0".to_string(),
            detail_start: "._cell1--QzpZV:not(._header--Rih2b)".to_string(),
            detail_event: ".event-name--Q2Z2Q".to_string(),
            detail_pari: "._cell3--DvPpz:not(._header--Rih2b)".to_string(),
            detail_factor: ".factor-value--FOM8c".to_string(),
            detail_score: "._cell5--xC26c:not(._header--Rih2b)".to_string(),
            detail_result: "._cell6--x_CDX:not(._header--Rih2b)".to_string(),
            leg_row: "div.row--ybiPS:not(._header--Rih2b)".to_string(),
            leg_pari: "._cell3--DvPpz".to_string(),
            leg_result: "._cell6--x_CDX".to_string(),
        }
    }
}
