#![allow(dead_code)]

use chrono::NaiveDate;
use kabusignal::domain::error::KabuError;
use kabusignal::domain::indicator::{IndicatorParams, IndicatorRow};
use kabusignal::domain::ledger::TradeRecord;
use kabusignal::domain::ohlcv::PriceBar;
use kabusignal::ports::classifier_port::{Classifier, ClassifierFactory};
use kabusignal::ports::data_port::PriceSource;
use kabusignal::ports::indicator_port::IndicatorEngine;
use kabusignal::ports::ledger_port::LedgerStore;
use kabusignal::ports::notifier_port::Notifier;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct MockPriceSource {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl PriceSource for MockPriceSource {
    fn get_daily_prices(
        &self,
        code: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, KabuError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(KabuError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| from.is_none_or(|d| b.date >= d))
                    .filter(|b| to.is_none_or(|d| b.date <= d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Engine with one column: `Momentum` = close - previous close.
pub struct MomentumEngine;

impl IndicatorEngine for MomentumEngine {
    fn compute_indicators(
        &self,
        prices: &[PriceBar],
        _params: &IndicatorParams,
    ) -> Vec<IndicatorRow> {
        prices
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let mut row = IndicatorRow::new(bar.clone());
                let momentum = (i > 0).then(|| bar.close - prices[i - 1].close);
                row.insert("Momentum", momentum);
                row
            })
            .collect()
    }

    fn column_names(&self, _params: &IndicatorParams) -> Vec<String> {
        vec!["Momentum".to_string()]
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: RefCell<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: RefCell::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.borrow().iter().map(|(_, t)| t.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, recipient: &str, text: &str) -> bool {
        self.sent
            .borrow_mut()
            .push((recipient.to_string(), text.to_string()));
        !self.fail
    }
}

/// Predicts the same BUY probability for every row.
pub struct ConstantClassifier {
    pub probability: f64,
    pub fitted: bool,
}

impl Classifier for ConstantClassifier {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), KabuError> {
        assert_eq!(features.len(), targets.len());
        self.fitted = true;
        Ok(())
    }

    fn predict_probability(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, KabuError> {
        if !self.fitted {
            return Err(KabuError::Classifier {
                reason: "not fitted".into(),
            });
        }
        Ok(vec![self.probability; features.len()])
    }
}

pub struct ConstantClassifierFactory {
    pub probability: f64,
}

impl ClassifierFactory for ConstantClassifierFactory {
    fn create(&self) -> Box<dyn Classifier> {
        Box::new(ConstantClassifier {
            probability: self.probability,
            fitted: false,
        })
    }
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    pub records: Vec<TradeRecord>,
    pub fail_writes: bool,
}

impl MemoryLedgerStore {
    pub fn failing() -> Self {
        Self {
            records: Vec::new(),
            fail_writes: true,
        }
    }

    fn check(&self) -> Result<(), KabuError> {
        if self.fail_writes {
            return Err(KabuError::Persistence {
                reason: "disk full".into(),
            });
        }
        Ok(())
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Vec<TradeRecord>, KabuError> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: &TradeRecord) -> Result<(), KabuError> {
        self.check()?;
        self.records.push(record.clone());
        Ok(())
    }

    fn save_all(&mut self, records: &[TradeRecord]) -> Result<(), KabuError> {
        self.check()?;
        self.records = records.to_vec();
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date: &str, open: f64, close: f64) -> PriceBar {
    PriceBar {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open,
        high: open.max(close) + 1.0,
        low: open.min(close) - 1.0,
        close,
        volume: 10_000.0,
    }
}

/// Bars on consecutive calendar days; open at `price`, close at
/// `price + 0.5`, then `price += step`.
pub fn generate_bars(start_date: &str, count: usize, start_price: f64, step: f64) -> Vec<PriceBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| {
            let price = start_price + step * i as f64;
            PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: price,
                high: price + 1.0,
                low: price - 1.0,
                close: price + 0.5,
                volume: 10_000.0,
            }
        })
        .collect()
}

/// Closes alternating 100 / 105 so labels mix BUY and non-BUY.
pub fn zigzag_bars(start_date: &str, count: usize) -> Vec<PriceBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| {
            let close = if i % 2 == 0 { 100.0 } else { 105.0 };
            PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: 102.0,
                high: 106.0,
                low: 99.0,
                close,
                volume: 10_000.0,
            }
        })
        .collect()
}
