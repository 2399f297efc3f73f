//! Ground-truth label construction.
//!
//! A label says what the model should have predicted at a historical bar,
//! judged from a bar `horizon_days` ahead. Two entry conventions exist:
//!
//! - [`LabelMode::SameDayClose`]: enter at today's close, exit at the close
//!   `horizon_days` ahead. Binary or ternary.
//! - [`LabelMode::NextOpen`]: enter at tomorrow's open, exit at the close
//!   `horizon_days` ahead of today. Binary only.
//!
//! Rows whose exit bar lies past the end of the series get no label and are
//! dropped. The label at index `i` reads only bars `i`, `i + 1` and
//! `i + horizon_days`.

use crate::domain::error::KabuError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Sell,
    Hold,
    Buy,
}

impl Label {
    pub fn as_i8(self) -> i8 {
        match self {
            Label::Buy => 1,
            Label::Hold => 0,
            Label::Sell => -1,
        }
    }

    /// 1.0 for BUY, 0.0 otherwise. Classifiers are trained on BUY vs rest.
    pub fn buy_target(self) -> f64 {
        if self == Label::Buy { 1.0 } else { 0.0 }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMode {
    SameDayClose,
    NextOpen,
}

impl FromStr for LabelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "same_day_close" | "close" => Ok(LabelMode::SameDayClose),
            "next_open" | "open" => Ok(LabelMode::NextOpen),
            other => Err(format!(
                "unknown label mode '{}', expected same_day_close or next_open",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelClasses {
    Binary,
    Ternary,
}

impl FromStr for LabelClasses {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binary" | "2" => Ok(LabelClasses::Binary),
            "ternary" | "3" => Ok(LabelClasses::Ternary),
            other => Err(format!(
                "unknown label classes '{}', expected binary or ternary",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelSpec {
    pub horizon_days: usize,
    pub threshold_percent: f64,
    pub mode: LabelMode,
    pub classes: LabelClasses,
}

impl LabelSpec {
    pub fn validate(&self) -> Result<(), KabuError> {
        if self.horizon_days == 0 {
            return Err(KabuError::invalid(
                "labels",
                "horizon_days",
                "horizon_days must be at least 1",
            ));
        }
        if !(self.threshold_percent > 0.0 && self.threshold_percent.is_finite()) {
            return Err(KabuError::invalid(
                "labels",
                "threshold_percent",
                "threshold_percent must be positive",
            ));
        }
        if self.mode == LabelMode::NextOpen && self.classes == LabelClasses::Ternary {
            return Err(KabuError::invalid(
                "labels",
                "classes",
                "next_open labels are binary only",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledRow {
    /// Index of the labeled bar in the input series.
    pub index: usize,
    pub date: NaiveDate,
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabeledSeries {
    pub rows: Vec<LabeledRow>,
}

impl LabeledSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn build_labels(prices: &[PriceBar], spec: &LabelSpec) -> Result<LabeledSeries, KabuError> {
    spec.validate()?;
    if prices.is_empty() {
        return Err(KabuError::InsufficientData {
            code: String::new(),
            rows: 0,
            minimum: spec.horizon_days + 1,
        });
    }

    let h = spec.horizon_days;
    let factor = spec.threshold_percent / 100.0;
    let mut rows = Vec::with_capacity(prices.len().saturating_sub(h));

    for i in 0..prices.len().saturating_sub(h) {
        let exit = prices[i + h].close;
        let entry = match spec.mode {
            LabelMode::SameDayClose => prices[i].close,
            LabelMode::NextOpen => prices[i + 1].open,
        };
        if !(entry > 0.0) {
            continue;
        }

        let label = match spec.mode {
            LabelMode::SameDayClose => {
                if exit >= entry * (1.0 + factor) {
                    Label::Buy
                } else if spec.classes == LabelClasses::Ternary && exit <= entry * (1.0 - factor) {
                    Label::Sell
                } else {
                    Label::Hold
                }
            }
            LabelMode::NextOpen => {
                let return_pct = (exit - entry) / entry * 100.0;
                if return_pct >= spec.threshold_percent {
                    Label::Buy
                } else {
                    Label::Hold
                }
            }
        };

        rows.push(LabeledRow {
            index: i,
            date: prices[i].date,
            label,
        });
    }

    log::debug!(
        "built {} labels ({:?}, horizon {}, threshold {}%), dropped {} trailing rows",
        rows.len(),
        spec.mode,
        h,
        spec.threshold_percent,
        prices.len() - rows.len()
    );

    Ok(LabeledSeries { rows })
}

/// How often each class occurs in a labeled series.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelFrequency {
    pub total: usize,
    pub buy: usize,
    pub sell: usize,
    pub hold: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyAssessment {
    /// HOLD above 70%: moves of this size are rare for the instrument.
    Rare,
    /// HOLD below 50%: plenty of signal for training.
    Frequent,
    Balanced,
}

impl LabelFrequency {
    pub fn from_series(series: &LabeledSeries) -> Self {
        let mut freq = LabelFrequency {
            total: series.len(),
            buy: 0,
            sell: 0,
            hold: 0,
        };
        for row in &series.rows {
            match row.label {
                Label::Buy => freq.buy += 1,
                Label::Sell => freq.sell += 1,
                Label::Hold => freq.hold += 1,
            }
        }
        freq
    }

    pub fn percent(&self, label: Label) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let count = match label {
            Label::Buy => self.buy,
            Label::Sell => self.sell,
            Label::Hold => self.hold,
        };
        count as f64 / self.total as f64 * 100.0
    }

    pub fn assessment(&self) -> FrequencyAssessment {
        let hold = self.percent(Label::Hold);
        if hold > 70.0 {
            FrequencyAssessment::Rare
        } else if hold < 50.0 {
            FrequencyAssessment::Frequent
        } else {
            FrequencyAssessment::Balanced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bars(opens: &[f64], closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        opens
            .iter()
            .zip(closes)
            .enumerate()
            .map(|(i, (&open, &close))| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: 1000.0,
            })
            .collect()
    }

    fn closes_only(closes: &[f64]) -> Vec<PriceBar> {
        bars(closes, closes)
    }

    fn spec(h: usize, t: f64, mode: LabelMode, classes: LabelClasses) -> LabelSpec {
        LabelSpec {
            horizon_days: h,
            threshold_percent: t,
            mode,
            classes,
        }
    }

    #[test]
    fn same_day_close_ternary() {
        let prices = closes_only(&[100.0, 103.0, 97.0, 100.0, 100.0]);
        let s = spec(1, 2.0, LabelMode::SameDayClose, LabelClasses::Ternary);
        let labels = build_labels(&prices, &s).unwrap();

        let got: Vec<Label> = labels.rows.iter().map(|r| r.label).collect();
        // 100→103 +3%, 103→97 -5.8%, 97→100 +3.1%, 100→100 flat
        assert_eq!(got, vec![Label::Buy, Label::Sell, Label::Buy, Label::Hold]);
    }

    #[test]
    fn binary_never_produces_sell() {
        let prices = closes_only(&[100.0, 90.0, 80.0]);
        let s = spec(1, 2.0, LabelMode::SameDayClose, LabelClasses::Binary);
        let labels = build_labels(&prices, &s).unwrap();
        assert!(labels.rows.iter().all(|r| r.label == Label::Hold));
    }

    #[test]
    fn threshold_is_inclusive() {
        let prices = closes_only(&[100.0, 102.0]);
        let s = spec(1, 2.0, LabelMode::SameDayClose, LabelClasses::Binary);
        assert_eq!(build_labels(&prices, &s).unwrap().rows[0].label, Label::Buy);
    }

    #[test]
    fn trailing_rows_are_dropped_not_defaulted() {
        let prices = closes_only(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let s = spec(3, 1.0, LabelMode::SameDayClose, LabelClasses::Binary);
        let labels = build_labels(&prices, &s).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.rows[1].index, 1);
        assert!(labels.rows.iter().all(|r| r.index < 2));
    }

    #[test]
    fn horizon_longer_than_series_yields_nothing() {
        let prices = closes_only(&[100.0, 101.0]);
        let s = spec(5, 1.0, LabelMode::SameDayClose, LabelClasses::Binary);
        assert!(build_labels(&prices, &s).unwrap().is_empty());
    }

    #[test]
    fn next_open_uses_tomorrows_open() {
        // close today 100, open tomorrow 105, close in 2 days 106
        // same-day-close would see +6%; next-open sees +0.95%
        let prices = bars(&[100.0, 105.0, 106.0], &[100.0, 105.5, 106.0]);
        let s = spec(2, 2.0, LabelMode::NextOpen, LabelClasses::Binary);
        let labels = build_labels(&prices, &s).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.rows[0].label, Label::Hold);

        let close_spec = spec(2, 2.0, LabelMode::SameDayClose, LabelClasses::Binary);
        assert_eq!(
            build_labels(&prices, &close_spec).unwrap().rows[0].label,
            Label::Buy
        );
    }

    #[test]
    fn empty_series_is_insufficient_data() {
        let s = spec(1, 1.0, LabelMode::SameDayClose, LabelClasses::Binary);
        assert!(matches!(
            build_labels(&[], &s),
            Err(KabuError::InsufficientData { .. })
        ));
    }

    #[test]
    fn ternary_next_open_is_rejected() {
        let prices = closes_only(&[100.0, 101.0, 102.0]);
        let s = spec(1, 1.0, LabelMode::NextOpen, LabelClasses::Ternary);
        assert!(matches!(
            build_labels(&prices, &s),
            Err(KabuError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let prices = closes_only(&[100.0, 101.0]);
        let s = spec(0, 1.0, LabelMode::SameDayClose, LabelClasses::Binary);
        assert!(build_labels(&prices, &s).is_err());
    }

    #[test]
    fn frequency_counts_and_assessment() {
        let prices = closes_only(&[100.0, 103.0, 103.0, 103.0, 103.0, 103.0]);
        let s = spec(1, 2.0, LabelMode::SameDayClose, LabelClasses::Ternary);
        let freq = LabelFrequency::from_series(&build_labels(&prices, &s).unwrap());
        assert_eq!(freq.total, 5);
        assert_eq!(freq.buy, 1);
        assert_eq!(freq.hold, 4);
        assert!((freq.percent(Label::Hold) - 80.0).abs() < 1e-9);
        assert_eq!(freq.assessment(), FrequencyAssessment::Rare);
    }

    #[test]
    fn frequency_of_empty_series() {
        let freq = LabelFrequency::from_series(&LabeledSeries::default());
        assert_eq!(freq.percent(Label::Buy), 0.0);
    }

    proptest! {
        #[test]
        fn past_labels_ignore_mutated_future_beyond_window(
            closes in prop::collection::vec(1.0f64..500.0, 12..40),
            h in 1usize..4,
            bump in 1.0f64..100.0,
        ) {
            let prices = closes_only(&closes);
            let s = spec(h, 1.5, LabelMode::SameDayClose, LabelClasses::Ternary);
            let before = build_labels(&prices, &s).unwrap();

            // Mutate only the last bar: labels whose window ends earlier must not change.
            let mut mutated = prices.clone();
            let last = mutated.len() - 1;
            mutated[last].close += bump;
            mutated[last].open += bump;
            let after = build_labels(&mutated, &s).unwrap();

            for (a, b) in before.rows.iter().zip(&after.rows) {
                if a.index + h < last {
                    prop_assert_eq!(a.label, b.label);
                }
            }
        }

        #[test]
        fn labels_ignore_mutated_earlier_bars(
            closes in prop::collection::vec(1.0f64..500.0, 12..40),
            h in 1usize..4,
            cut in 1usize..6,
        ) {
            let prices = bars(&closes, &closes);
            let s = spec(h, 1.0, LabelMode::NextOpen, LabelClasses::Binary);
            let before = build_labels(&prices, &s).unwrap();

            let mut mutated = prices.clone();
            for bar in mutated.iter_mut().take(cut) {
                bar.close *= 3.0;
                bar.open *= 0.5;
            }
            let after = build_labels(&mutated, &s).unwrap();

            for (a, b) in before.rows.iter().zip(&after.rows) {
                if a.index >= cut {
                    prop_assert_eq!(a.label, b.label);
                }
            }
        }
    }
}
