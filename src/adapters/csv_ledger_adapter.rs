//! CSV trade ledger store.
//!
//! Header: `signal_date,stock_code,stock_name,prob,threshold,future_days,
//! status,buy_price,sell_price,profit,profit_rate`. Files written before
//! `stock_name` existed still load; the next append rewrites them with the
//! full header.

use crate::domain::error::KabuError;
use crate::domain::ledger::TradeRecord;
use crate::ports::ledger_port::LedgerStore;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

pub const LEDGER_HEADER: [&str; 11] = [
    "signal_date",
    "stock_code",
    "stock_name",
    "prob",
    "threshold",
    "future_days",
    "status",
    "buy_price",
    "sell_price",
    "profit",
    "profit_rate",
];

pub struct CsvLedgerStore {
    path: PathBuf,
}

fn persistence(path: &Path, e: impl std::fmt::Display) -> KabuError {
    KabuError::Persistence {
        reason: format!("{}: {}", path.display(), e),
    }
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_empty_file(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    fn has_current_header(&self) -> Result<bool, KabuError> {
        let mut rdr = csv::Reader::from_path(&self.path).map_err(|e| persistence(&self.path, e))?;
        let headers = rdr.headers().map_err(|e| persistence(&self.path, e))?;
        Ok(headers.iter().eq(LEDGER_HEADER.iter().copied()))
    }
}

impl LedgerStore for CsvLedgerStore {
    fn load(&self) -> Result<Vec<TradeRecord>, KabuError> {
        if self.is_empty_file() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&self.path).map_err(|e| persistence(&self.path, e))?;
        rdr.deserialize()
            .collect::<Result<Vec<TradeRecord>, _>>()
            .map_err(|e| persistence(&self.path, e))
    }

    fn append(&mut self, record: &TradeRecord) -> Result<(), KabuError> {
        let is_new = self.is_empty_file();
        if !is_new && !self.has_current_header()? {
            log::info!(
                "{}: upgrading ledger to the current header",
                self.path.display()
            );
            let mut records = self.load()?;
            records.push(record.clone());
            return self.save_all(&records);
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        wtr.serialize(record)
            .map_err(|e| persistence(&self.path, e))?;
        wtr.flush()?;
        Ok(())
    }

    fn save_all(&mut self, records: &[TradeRecord]) -> Result<(), KabuError> {
        let mut wtr = csv::Writer::from_path(&self.path).map_err(|e| persistence(&self.path, e))?;
        if records.is_empty() {
            wtr.write_record(LEDGER_HEADER)
                .map_err(|e| persistence(&self.path, e))?;
        }
        for record in records {
            wtr.serialize(record)
                .map_err(|e| persistence(&self.path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::TradeStatus;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(day: u32, code: &str) -> TradeRecord {
        TradeRecord::pending(
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            code,
            "Toyota",
            0.81,
            0.75,
            3,
        )
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("trade_log.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trade_log.csv");
        let mut store = CsvLedgerStore::new(&path);
        store.append(&record(4, "7203")).unwrap();
        store.append(&record(5, "7203")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LEDGER_HEADER.join(","));
        assert!(lines[1].starts_with("2024-01-04,7203,Toyota,0.81,0.75,3,PENDING,"));

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![record(4, "7203"), record(5, "7203")]);
    }

    #[test]
    fn save_all_replaces_content() {
        let dir = TempDir::new().unwrap();
        let mut store = CsvLedgerStore::new(dir.path().join("trade_log.csv"));
        store.append(&record(4, "7203")).unwrap();

        let mut done = record(4, "7203");
        done.status = TradeStatus::Done;
        done.buy_price = 2500.0;
        done.sell_price = 2550.0;
        done.profit = 5950.0;
        done.profit_rate = 2.0;
        store.save_all(std::slice::from_ref(&done)).unwrap();

        assert_eq!(store.load().unwrap(), vec![done]);
    }

    #[test]
    fn save_all_empty_keeps_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trade_log.csv");
        let mut store = CsvLedgerStore::new(&path);
        store.save_all(&[]).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("signal_date,"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn legacy_file_without_stock_name_loads_and_upgrades() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trade_log.csv");
        fs::write(
            &path,
            "signal_date,stock_code,prob,threshold,future_days,status,buy_price,sell_price,profit,profit_rate\n\
             2024-01-04,7203,0.8,0.75,1,PENDING,0,0,0,0\n",
        )
        .unwrap();

        let mut store = CsvLedgerStore::new(&path);
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].stock_name, "");
        assert_eq!(loaded[0].holding_period_days, 1);

        store.append(&record(5, "6758")).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&LEDGER_HEADER.join(",")));
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn malformed_row_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trade_log.csv");
        fs::write(
            &path,
            format!("{}\nnot-a-date,7203,x,a,b,c,PENDING,0,0,0,0\n", LEDGER_HEADER.join(",")),
        )
        .unwrap();
        let store = CsvLedgerStore::new(&path);
        assert!(matches!(store.load(), Err(KabuError::Persistence { .. })));
    }
}
