//! Indicator rows: a price bar extended with named indicator values.
//!
//! Rows are produced by an [`IndicatorEngine`](crate::ports::indicator_port::IndicatorEngine)
//! and consumed read-only by the rule evaluator and the backtest simulator.
//! A value may be undefined (not enough history yet); undefined values are
//! stored as NaN or simply left out of the map, and [`IndicatorRow::get`]
//! reports both as `None`.

use crate::domain::ohlcv::PriceBar;
use std::collections::BTreeMap;

pub const PRICE_FIELDS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub bar: PriceBar,
    pub values: BTreeMap<String, f64>,
}

/// Result of looking up a name in a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    Value(f64),
    Undefined,
    Missing,
}

impl IndicatorRow {
    pub fn new(bar: PriceBar) -> Self {
        Self {
            bar,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.values.insert(name.into(), value.unwrap_or(f64::NAN));
    }

    /// Resolve a name against the price fields first, then the indicator map.
    pub fn lookup(&self, name: &str) -> Lookup {
        let raw = match name {
            "Open" => Some(self.bar.open),
            "High" => Some(self.bar.high),
            "Low" => Some(self.bar.low),
            "Close" => Some(self.bar.close),
            "Volume" => Some(self.bar.volume),
            _ => self.values.get(name).copied(),
        };
        match raw {
            None => Lookup::Missing,
            Some(v) if v.is_finite() => Lookup::Value(v),
            Some(_) => Lookup::Undefined,
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        match self.lookup(name) {
            Lookup::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        PRICE_FIELDS.contains(&name) || self.values.contains_key(name)
    }
}

/// Parameters handed to the indicator engine.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_stddev: f64,
    pub atr_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            sma_short: 5,
            sma_long: 25,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_stddev: 2.0,
            atr_period: 14,
        }
    }
}
