//! CSV price file adapter.
//!
//! One file per stock at `{base_path}/{code}.csv` with a
//! `Date,Open,High,Low,Close,Volume` header (lowercase names accepted).
//! Rows with an empty field are dropped.

use crate::domain::error::KabuError;
use crate::domain::ohlcv::{PriceBar, validate_series};
use crate::ports::data_port::PriceSource;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct PriceRecord {
    #[serde(rename = "Date", alias = "date")]
    date: String,
    #[serde(rename = "Open", alias = "open")]
    open: Option<f64>,
    #[serde(rename = "High", alias = "high")]
    high: Option<f64>,
    #[serde(rename = "Low", alias = "low")]
    low: Option<f64>,
    #[serde(rename = "Close", alias = "close")]
    close: Option<f64>,
    #[serde(rename = "Volume", alias = "volume")]
    volume: Option<f64>,
}

impl PriceRecord {
    fn into_bar(self) -> Result<Option<PriceBar>, KabuError> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|e| {
            KabuError::DataSource {
                reason: format!("invalid date '{}': {}", self.date, e),
            }
        })?;
        match (self.open, self.high, self.low, self.close, self.volume) {
            (Some(open), Some(high), Some(low), Some(close), Some(volume)) => Ok(Some(PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            })),
            _ => Ok(None),
        }
    }
}

pub struct CsvPriceSource {
    base_path: PathBuf,
}

impl CsvPriceSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", code))
    }

    /// Stock codes with a price file in the base directory, sorted.
    pub fn list_codes(&self) -> Result<Vec<String>, KabuError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| KabuError::DataSource {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut codes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| KabuError::DataSource {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            if let Some(code) = name.to_string_lossy().strip_suffix(".csv") {
                codes.push(code.to_string());
            }
        }

        codes.sort();
        Ok(codes)
    }
}

impl PriceSource for CsvPriceSource {
    fn get_daily_prices(
        &self,
        code: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, KabuError> {
        let path = self.csv_path(code);
        if !path.exists() {
            log::debug!("{}: no price file at {}", code, path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| KabuError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        let mut dropped = 0usize;

        for result in rdr.deserialize::<PriceRecord>() {
            let record = result.map_err(|e| KabuError::DataSource {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let Some(bar) = record.into_bar()? else {
                dropped += 1;
                continue;
            };
            if from.is_some_and(|d| bar.date < d) || to.is_some_and(|d| bar.date > d) {
                continue;
            }
            bars.push(bar);
        }

        if dropped > 0 {
            log::debug!("{}: dropped {} incomplete rows", code, dropped);
        }

        bars.sort_by_key(|b| b.date);
        validate_series(code, &bars)?;
        Ok(bars)
    }
}
