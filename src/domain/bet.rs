//! Core betting entities and their normalization logic.
//!
//! A `BetRecord` is one wagering event as it appears in the history list,
//! merged from the summary row and (when expansion succeeded) the detail
//! panel. Field values are kept as display strings so the persisted ledger
//! stays faithful to what the site rendered.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Settlement status parsed from the summary result text.
///
/// The raw text is preserved on the record; this enum only drives control
/// flow (pending short-circuit, loss fallback). The detail panel carries its
/// own result vocabulary which is stored separately and never folded into
/// this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Won,
    Lost,
    Sold,
    Refunded,
    Pending,
    Unknown,
}

impl ResultStatus {
    /// Parses the summary result text by substring match, the way the live
    /// UI mixes statuses into longer labels.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.contains("Не рассчитано") {
            Self::Pending
        } else if text.contains("Выигрыш") {
            Self::Won
        } else if text.contains("Проигрыш") {
            Self::Lost
        } else if text.contains("Продано") {
            Self::Sold
        } else if text.contains("Возврат") {
            Self::Refunded
        } else {
            Self::Unknown
        }
    }
}

/// Wager structure parsed from the summary type label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetKind {
    Single,
    Express,
    System,
    Other,
}

impl BetKind {
    #[must_use]
    pub fn parse(label: &str) -> Self {
        if label.contains("Экспресс") {
            Self::Express
        } else if label.contains("Система") {
            Self::System
        } else if label.contains("Ординар") {
            Self::Single
        } else {
            Self::Other
        }
    }

    /// Multi-leg kinds carry a leg list in the expanded panel.
    #[must_use]
    pub fn is_multi_leg(self) -> bool {
        matches!(self, Self::Express | Self::System)
    }
}

/// One sub-selection of a multi-leg wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetLeg {
    pub event: String,
    pub pari: String,
    pub result: String,
}

impl BetLeg {
    /// Ledger text form: `"{event}: {pari} - {result}"`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}: {} - {}", self.event, self.pari, self.result)
    }
}

/// One wagering event, keyed by coupon number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    /// Stable external identifier; the sole deduplication key.
    pub coupon_number: String,
    /// Wager placement time as shown in the summary row ("HH:MM:SS").
    pub time: String,
    /// Wager type label (single/express/system variant).
    pub pari_type: String,
    pub description: String,
    /// Odds as displayed in the summary row.
    pub factor: String,
    /// Raw summary result text.
    pub result: String,
    pub stake_amount: String,
    /// Signed display amount; a leading "-" encodes a loss.
    pub win_amount: String,
    /// Event start "DD.MM.YYYY HH:MM", from the detail panel.
    pub start_time: Option<String>,
    pub event: Option<String>,
    /// The specific pick within the event, from the detail panel.
    pub pari: Option<String>,
    pub detail_factor: Option<String>,
    pub score: Option<String>,
    /// Result text as shown in the detail panel; may diverge from `result`.
    pub detail_result: Option<String>,
    /// Sub-selections, present only for multi-leg bets whose expansion
    /// succeeded.
    pub legs: Vec<BetLeg>,
    pub has_freebet: bool,
    /// Whether detail extraction succeeded for this record.
    pub expanded: bool,
}

impl BetRecord {
    #[must_use]
    pub fn status(&self) -> ResultStatus {
        ResultStatus::parse(&self.result)
    }

    #[must_use]
    pub fn kind(&self) -> BetKind {
        BetKind::parse(&self.pari_type)
    }

    /// Resolves missing amounts on lost bets.
    ///
    /// The summary row of a lost bet sometimes renders only one figure: the
    /// staked amount sits in the win column while the stake column is empty.
    /// In that case the observed amount becomes the stake and the loss is
    /// encoded as its negation. With no figure at all, the configured
    /// default stake is applied instead of failing the record.
    pub fn apply_loss_fallback(&mut self, default_stake: u32) {
        if self.status() != ResultStatus::Lost {
            return;
        }
        if self.stake_amount.is_empty() && !self.win_amount.is_empty() {
            self.stake_amount = self.win_amount.clone();
            self.win_amount = format!("-{}", self.win_amount);
        } else if self.stake_amount.is_empty() {
            self.stake_amount = default_stake.to_string();
            self.win_amount = format!("-{default_stake}");
        }
    }

    /// Sort key for newest-first ordering.
    ///
    /// Prefers the event start time; falls back to the placement time on
    /// `today`. Records with neither parseable sort last.
    #[must_use]
    pub fn sort_key(&self, today: NaiveDate) -> Option<NaiveDateTime> {
        if let Some(start) = self.start_time.as_deref() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(start, "%d.%m.%Y %H:%M") {
                return Some(dt);
            }
        }
        if !self.time.is_empty() {
            if let Ok(t) = chrono::NaiveTime::parse_from_str(&self.time, "%H:%M:%S") {
                return Some(today.and_time(t));
            }
        }
        None
    }

    /// Calendar date the wager belongs to, for date-bounded scans.
    ///
    /// The summary row shows a bare clock time, so a record without a
    /// date-bearing start time reads as placed today.
    #[must_use]
    pub fn placed_date(&self, today: NaiveDate) -> NaiveDate {
        self.start_time
            .as_deref()
            .and_then(|s| s.split_whitespace().next())
            .and_then(|d| NaiveDate::parse_from_str(d, "%d.%m.%Y").ok())
            .unwrap_or(today)
    }

    /// Legs serialized for the ledger's single text column.
    #[must_use]
    pub fn legs_column(&self) -> String {
        self.legs
            .iter()
            .map(BetLeg::display)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Sorts records newest-first by [`BetRecord::sort_key`].
///
/// The sort is stable: key ties and keyless records keep their discovery
/// order, keyless records go last.
pub fn sort_newest_first(records: &mut [BetRecord], today: NaiveDate) {
    records.sort_by(|a, b| {
        match (a.sort_key(today), b.sort_key(today)) {
            (Some(ka), Some(kb)) => kb.cmp(&ka),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}
