//! CSV ledger persistence.
//!
//! The ledger is read fully at run start (to seed the dedup set) and written
//! back in one merge step at run end. Writes go to a temp file that is
//! renamed into place, so a failed write leaves the previous ledger intact;
//! in replace mode the previous file is renamed aside only after the new one
//! was written successfully.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::bet::{sort_newest_first, BetRecord};

/// Ledger column set. Renaming or removing a column is a breaking change
/// for the dashboard that consumes this file.
pub const COLUMNS: [&str; 17] = [
    "coupon_number",
    "time",
    "pari_type",
    "description",
    "factor",
    "result",
    "stake_amount",
    "win_amount",
    "start_time",
    "event",
    "pari",
    "detail_factor",
    "score",
    "detail_result",
    "expanded",
    "express_events",
    "has_freebet",
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger format error: {0}")]
    Csv(#[from] csv::Error),
}

/// How a batch of freshly collected records is combined with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// New records, sorted newest-first, go before the existing rows.
    Prepend,
    /// The store is replaced by the new set; the old file is kept as a
    /// backup.
    Replace,
}

/// What a merge actually did.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub written_new: usize,
    pub kept_existing: usize,
    pub backup: Option<PathBuf>,
}

/// The persisted betting-history table.
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Coupon ids already persisted. A missing file is an empty store.
    pub fn load_existing_ids(&self) -> Result<HashSet<String>, StoreError> {
        let mut ids = HashSet::new();
        if !self.path.exists() {
            info!("ledger {} does not exist yet", self.path.display());
            return Ok(ids);
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let Some(coupon_idx) = headers.iter().position(|h| h == "coupon_number") else {
            warn!(
                "ledger {} has no coupon_number column, treating as empty",
                self.path.display()
            );
            return Ok(ids);
        };

        for record in reader.records() {
            let record = record?;
            if let Some(coupon) = record.get(coupon_idx) {
                let coupon = coupon.trim();
                if !coupon.is_empty() {
                    ids.insert(coupon.to_string());
                }
            }
        }
        info!("loaded {} stored coupon ids", ids.len());
        Ok(ids)
    }

    /// Sorts `new` newest-first and merges it into the store.
    pub fn merge_write(
        &self,
        new: &mut Vec<BetRecord>,
        mode: MergeMode,
        today: NaiveDate,
    ) -> Result<MergeOutcome, StoreError> {
        sort_newest_first(new, today);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match mode {
            MergeMode::Prepend => self.prepend(new),
            MergeMode::Replace => self.replace(new),
        }
    }

    fn prepend(&self, new: &[BetRecord]) -> Result<MergeOutcome, StoreError> {
        if new.is_empty() {
            info!("no new records, ledger left untouched");
            return Ok(MergeOutcome::default());
        }

        let (existing, legacy_backup) = self.load_rows()?;
        let tmp = self.tmp_path();
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(COLUMNS)?;
            for record in new {
                writer.write_record(row_of(record))?;
            }
            for row in &existing {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        info!(
            "ledger updated: {} new rows prepended to {} existing",
            new.len(),
            existing.len()
        );
        Ok(MergeOutcome {
            written_new: new.len(),
            kept_existing: existing.len(),
            backup: legacy_backup,
        })
    }

    fn replace(&self, new: &[BetRecord]) -> Result<MergeOutcome, StoreError> {
        let tmp = self.tmp_path();
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(COLUMNS)?;
            for record in new {
                writer.write_record(row_of(record))?;
            }
            writer.flush()?;
        }

        let backup = if self.path.exists() {
            let backup = self.backup_path();
            fs::rename(&self.path, &backup)?;
            info!("previous ledger kept as {}", backup.display());
            Some(backup)
        } else {
            None
        };
        fs::rename(&tmp, &self.path)?;
        info!("ledger rewritten with {} rows", new.len());
        Ok(MergeOutcome {
            written_new: new.len(),
            kept_existing: 0,
            backup,
        })
    }

    /// Existing data rows, only when the header matches the current column
    /// set. A store written with an older schema is renamed aside and the
    /// merge starts from an empty table.
    fn load_rows(&self) -> Result<(Vec<csv::StringRecord>, Option<PathBuf>), StoreError> {
        if !self.path.exists() {
            return Ok((Vec::new(), None));
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        if !headers.iter().eq(COLUMNS) {
            drop(reader);
            let backup = self.backup_path();
            warn!(
                "ledger {} has an outdated column set, moving it to {}",
                self.path.display(),
                backup.display()
            );
            fs::rename(&self.path, &backup)?;
            return Ok((Vec::new(), Some(backup)));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?);
        }
        Ok((rows, None))
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("csv.tmp")
    }

    fn backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("ledger");
        self.path.with_file_name(format!("{stem}_backup.csv"))
    }
}

fn row_of(record: &BetRecord) -> Vec<String> {
    vec![
        record.coupon_number.clone(),
        record.time.clone(),
        record.pari_type.clone(),
        record.description.clone(),
        record.factor.clone(),
        record.result.clone(),
        record.stake_amount.clone(),
        record.win_amount.clone(),
        record.start_time.clone().unwrap_or_default(),
        record.event.clone().unwrap_or_default(),
        record.pari.clone().unwrap_or_default(),
        record.detail_factor.clone().unwrap_or_default(),
        record.score.clone().unwrap_or_default(),
        record.detail_result.clone().unwrap_or_default(),
        record.expanded.to_string(),
        record.legs_column(),
        record.has_freebet.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(coupon: &str, start: Option<&str>) -> BetRecord {
        BetRecord {
            coupon_number: coupon.to_string(),
            time: "10:00:00".to_string(),
            pari_type: "Ординар".to_string(),
            result: "Выигрыш".to_string(),
            stake_amount: "100".to_string(),
            win_amount: "150".to_string(),
            start_time: start.map(str::to_string),
            ..BetRecord::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 5).unwrap()
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.csv"));
        assert!(store.load_existing_ids().unwrap().is_empty());
    }

    #[test]
    fn replace_then_load_round_trips_ids() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.csv"));
        let mut batch = vec![record("111", None), record("222", None)];
        store
            .merge_write(&mut batch, MergeMode::Replace, today())
            .unwrap();

        let ids = store.load_existing_ids().unwrap();
        assert!(ids.contains("111"));
        assert!(ids.contains("222"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn prepend_puts_new_rows_first_and_keeps_existing_order() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.csv"));

        let mut first = vec![record("A", Some("02.08.2025 12:00")),
                             record("B", Some("01.08.2025 12:00"))];
        store
            .merge_write(&mut first, MergeMode::Replace, today())
            .unwrap();

        let mut second = vec![record("C", Some("03.08.2025 12:00"))];
        let outcome = store
            .merge_write(&mut second, MergeMode::Prepend, today())
            .unwrap();
        assert_eq!(outcome.written_new, 1);
        assert_eq!(outcome.kept_existing, 2);

        let mut reader = csv::Reader::from_path(store.path()).unwrap();
        let coupons: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect();
        assert_eq!(coupons, ["C", "A", "B"]);
    }

    #[test]
    fn prepend_with_nothing_new_is_a_no_op() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.csv"));
        let outcome = store
            .merge_write(&mut Vec::new(), MergeMode::Prepend, today())
            .unwrap();
        assert_eq!(outcome.written_new, 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn new_records_are_sorted_newest_first() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.csv"));
        let mut batch = vec![
            record("old", Some("01.08.2025 10:00")),
            record("new", Some("04.08.2025 10:00")),
            record("mid", Some("02.08.2025 10:00")),
        ];
        store
            .merge_write(&mut batch, MergeMode::Replace, today())
            .unwrap();

        let mut reader = csv::Reader::from_path(store.path()).unwrap();
        let coupons: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect();
        assert_eq!(coupons, ["new", "mid", "old"]);
    }

    #[test]
    fn replace_keeps_a_backup_of_the_previous_ledger() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.csv"));
        store
            .merge_write(&mut vec![record("1", None)], MergeMode::Replace, today())
            .unwrap();
        let outcome = store
            .merge_write(&mut vec![record("2", None)], MergeMode::Replace, today())
            .unwrap();

        let backup = outcome.backup.expect("backup should exist");
        assert!(backup.ends_with("ledger_backup.csv"));
        assert!(backup.exists());

        let ids = store.load_existing_ids().unwrap();
        assert!(ids.contains("2"));
        assert!(!ids.contains("1"));
    }

    #[test]
    fn replace_rerun_with_same_records_is_byte_identical() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.csv"));
        let batch = vec![
            record("10", Some("03.08.2025 15:00")),
            record("11", Some("02.08.2025 15:00")),
        ];

        store
            .merge_write(&mut batch.clone(), MergeMode::Replace, today())
            .unwrap();
        let first = fs::read_to_string(store.path()).unwrap();

        store
            .merge_write(&mut batch.clone(), MergeMode::Replace, today())
            .unwrap();
        let second = fs::read_to_string(store.path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn outdated_schema_is_moved_aside_on_merge() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "coupon_number,sum\n999,100\n").unwrap();

        let store = LedgerStore::new(path);
        let outcome = store
            .merge_write(&mut vec![record("1", None)], MergeMode::Prepend, today())
            .unwrap();

        assert_eq!(outcome.kept_existing, 0);
        let backup = outcome.backup.expect("legacy file should be moved aside");
        assert!(backup.exists());

        let ids = store.load_existing_ids().unwrap();
        assert!(ids.contains("1"));
        assert!(!ids.contains("999"));
    }

    #[test]
    fn legs_serialize_into_the_express_events_column() {
        use crate::domain::bet::BetLeg;

        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.csv"));
        let mut rec = record("77", None);
        rec.pari_type = "Экспресс".to_string();
        rec.legs = vec![
            BetLeg {
                event: "A - B".to_string(),
                pari: "П1".to_string(),
                result: "Выигрыш".to_string(),
            },
            BetLeg {
                event: "C - D".to_string(),
                pari: "X".to_string(),
                result: "Проигрыш".to_string(),
            },
        ];
        store
            .merge_write(&mut vec![rec], MergeMode::Replace, today())
            .unwrap();

        let mut reader = csv::Reader::from_path(store.path()).unwrap();
        let headers = reader.headers().unwrap().clone();
        let idx = headers.iter().position(|h| h == "express_events").unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(
            row.get(idx).unwrap(),
            "A - B: П1 - Выигрыш; C - D: X - Проигрыш"
        );
    }
}
