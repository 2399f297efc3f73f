//! Trade ledger: live signals recorded as pending trades and later
//! reconciled against realized prices.
//!
//! Each record moves PENDING -> DONE exactly once. A record is keyed by
//! (signal_date, stock_code); recording the same key twice keeps one row.
//! Reconciliation buys at the open of the day after the signal and sells at
//! the close `future_days` after it, with `max(1, floor(capital / buy))`
//! lots.

use crate::domain::error::KabuError;
use crate::domain::notification;
use crate::domain::ohlcv::{PriceBar, position_of};
use crate::domain::signal::round2;
use crate::ports::ledger_port::LedgerStore;
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "DONE")]
    Done,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "PENDING"),
            TradeStatus::Done => write!(f, "DONE"),
        }
    }
}

impl std::str::FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TradeStatus::Pending),
            "DONE" => Ok(TradeStatus::Done),
            other => Err(format!("unknown trade status '{}'", other)),
        }
    }
}

/// One ledger row. Field names map onto the fixed CSV header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub signal_date: NaiveDate,
    pub stock_code: String,
    #[serde(default)]
    pub stock_name: String,
    #[serde(rename = "prob")]
    pub probability: f64,
    pub threshold: f64,
    #[serde(rename = "future_days")]
    pub holding_period_days: usize,
    pub status: TradeStatus,
    pub buy_price: f64,
    pub sell_price: f64,
    pub profit: f64,
    pub profit_rate: f64,
}

impl TradeRecord {
    pub fn pending(
        signal_date: NaiveDate,
        stock_code: &str,
        stock_name: &str,
        probability: f64,
        threshold: f64,
        holding_period_days: usize,
    ) -> Self {
        TradeRecord {
            signal_date,
            stock_code: stock_code.to_string(),
            stock_name: stock_name.to_string(),
            probability,
            threshold,
            holding_period_days,
            status: TradeStatus::Pending,
            buy_price: 0.0,
            sell_price: 0.0,
            profit: 0.0,
            profit_rate: 0.0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == TradeStatus::Done
    }

    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }

    fn same_key(&self, date: NaiveDate, code: &str) -> bool {
        self.signal_date == date && self.stock_code == code
    }

    /// Settle against `prices`. `None` when the signal date or the exit bar
    /// is not in the history yet.
    fn settle(&self, prices: &[PriceBar], capital_basis: f64) -> Option<TradeRecord> {
        let idx = position_of(prices, self.signal_date)?;
        let h = self.holding_period_days.max(1);
        if idx + h >= prices.len() {
            return None;
        }
        let buy_price = prices[idx + 1].open;
        let sell_price = prices[idx + h].close;
        if !(buy_price > 0.0) {
            return None;
        }
        let lots = (capital_basis / buy_price).floor().max(1.0);
        let profit = (sell_price - buy_price) * lots;
        let profit_rate = profit / (buy_price * lots) * 100.0;
        Some(TradeRecord {
            status: TradeStatus::Done,
            buy_price,
            sell_price,
            profit,
            profit_rate: round2(profit_rate),
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LedgerSummary {
    pub trade_count: usize,
    pub win_count: usize,
    /// Percentage of winning trades, 0 when nothing is done yet.
    pub win_rate: f64,
    pub cumulative_profit: f64,
}

impl LedgerSummary {
    pub fn loss_count(&self) -> usize {
        self.trade_count - self.win_count
    }
}

pub struct TradeLedger<S: LedgerStore> {
    store: S,
    capital_basis: f64,
}

impl<S: LedgerStore> TradeLedger<S> {
    pub fn new(store: S, capital_basis: f64) -> Self {
        Self {
            store,
            capital_basis,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn records(&self) -> Result<Vec<TradeRecord>, KabuError> {
        self.store.load()
    }

    /// Append a PENDING record unless one exists for (date, code).
    /// Returns whether a row was written.
    pub fn record_signal(
        &mut self,
        date: NaiveDate,
        code: &str,
        name: &str,
        probability: f64,
        threshold: f64,
        holding_period_days: usize,
    ) -> Result<bool, KabuError> {
        let existing = self.store.load()?;
        if existing.iter().any(|r| r.same_key(date, code)) {
            debug!("ledger already holds {} on {}", code, date);
            return Ok(false);
        }
        let record = TradeRecord::pending(
            date,
            code,
            name,
            probability,
            threshold,
            holding_period_days,
        );
        self.store.append(&record)?;
        info!("recorded pending trade {} on {}", code, date);
        Ok(true)
    }

    /// Settle every PENDING record of `code` whose exit bar is in `prices`.
    /// Returns the number of records settled.
    pub fn reconcile(&mut self, code: &str, prices: &[PriceBar]) -> Result<usize, KabuError> {
        let mut records = self.store.load()?;
        let mut settled = 0;
        for record in records.iter_mut() {
            if record.stock_code != code || record.is_done() {
                continue;
            }
            if let Some(done) = record.settle(prices, self.capital_basis) {
                info!(
                    "settled {} signal of {}: profit {:+.0} ({:+.2}%)",
                    code, done.signal_date, done.profit, done.profit_rate
                );
                *record = done;
                settled += 1;
            }
        }
        if settled > 0 {
            self.store.save_all(&records)?;
        }
        Ok(settled)
    }

    /// The last DONE record in ledger order.
    pub fn latest_result(&self) -> Result<Option<TradeRecord>, KabuError> {
        Ok(self.store.load()?.into_iter().rev().find(|r| r.is_done()))
    }

    pub fn summary(&self) -> Result<LedgerSummary, KabuError> {
        let records = self.store.load()?;
        Ok(summarize(&records))
    }

    /// Reconcile `code`, then compose the latest result and running totals.
    /// Empty when nothing has been settled yet.
    pub fn daily_report(&mut self, code: &str, prices: &[PriceBar]) -> Result<String, KabuError> {
        self.reconcile(code, prices)?;
        let records = self.store.load()?;
        let latest = records.iter().rev().find(|r| r.is_done());
        Ok(notification::ledger_report(latest, &summarize(&records)))
    }
}

pub fn summarize(records: &[TradeRecord]) -> LedgerSummary {
    let done: Vec<&TradeRecord> = records.iter().filter(|r| r.is_done()).collect();
    let trade_count = done.len();
    let win_count = done.iter().filter(|r| r.is_win()).count();
    let win_rate = if trade_count > 0 {
        win_count as f64 / trade_count as f64 * 100.0
    } else {
        0.0
    };
    LedgerSummary {
        trade_count,
        win_count,
        win_rate,
        cumulative_profit: done.iter().map(|r| r.profit).sum(),
    }
}
