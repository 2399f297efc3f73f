//! Multi-candidate backtesting.
//!
//! Parses candidate code lists from configuration, backtests each candidate
//! independently, ranks the results by profit and picks a recommendation.
//! A failing candidate is reported as skipped and never stops the batch.

use crate::domain::backtest::{
    self, BacktestConfig, BacktestResult, DailyJournal, ScoringStrategy,
};
use crate::domain::dataset::build_dataset;
use crate::domain::error::KabuError;
use crate::domain::indicator::IndicatorParams;
use crate::domain::label::LabelSpec;
use crate::ports::data_port::PriceSource;
use crate::ports::indicator_port::IndicatorEngine;
use chrono::NaiveDate;
use log::{info, warn};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const DEFAULT_MIN_TRADES_PER_WEEK: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodeListError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, CodeListError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(CodeListError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(CodeListError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    FetchFailed(String),
    NoData,
    MissingColumns(Vec<String>),
    InsufficientRows { rows: usize, minimum: usize },
    DegenerateTraining,
    Failed(String),
}

impl From<KabuError> for SkipReason {
    fn from(e: KabuError) -> Self {
        match e {
            KabuError::DataSource { reason } => SkipReason::FetchFailed(reason),
            KabuError::NoData { .. } => SkipReason::NoData,
            KabuError::MissingColumns { columns, .. } => SkipReason::MissingColumns(columns),
            KabuError::InsufficientData { rows, minimum, .. } => {
                SkipReason::InsufficientRows { rows, minimum }
            }
            KabuError::DegenerateTraining { .. } => SkipReason::DegenerateTraining,
            other => SkipReason::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FetchFailed(reason) => write!(f, "price fetch failed: {}", reason),
            SkipReason::NoData => write!(f, "no price data"),
            SkipReason::MissingColumns(columns) => {
                write!(f, "missing columns: {}", columns.join(", "))
            }
            SkipReason::InsufficientRows { rows, minimum } => {
                write!(f, "only {} usable rows, minimum {}", rows, minimum)
            }
            SkipReason::DegenerateTraining => write!(f, "training labels have a single class"),
            SkipReason::Failed(reason) => write!(f, "{}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCandidate {
    pub code: String,
    pub reason: SkipReason,
}

/// Everything a batch run needs, passed explicitly.
pub struct BatchContext<'a> {
    pub prices: &'a (dyn PriceSource + Sync),
    pub indicators: &'a (dyn IndicatorEngine + Sync),
    pub strategy: &'a dyn ScoringStrategy,
    pub params: IndicatorParams,
    pub label_spec: LabelSpec,
    pub feature_columns: Vec<String>,
    pub backtest: BacktestConfig,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub parallel: bool,
}

impl BatchContext<'_> {
    /// Fetch, compute indicators, build the dataset and backtest one candidate.
    pub fn run_candidate_with_journal(
        &self,
        code: &str,
    ) -> Result<(BacktestResult, DailyJournal), KabuError> {
        let bars = self
            .prices
            .get_daily_prices(code, self.date_from, self.date_to)?;
        if bars.is_empty() {
            return Err(KabuError::NoData {
                code: code.to_string(),
            });
        }
        let rows = self.indicators.compute_indicators(&bars, &self.params);
        let dataset = build_dataset(code, &rows, &self.feature_columns, &self.label_spec)?;
        let config = BacktestConfig {
            horizon_days: self.label_spec.horizon_days,
            ..self.backtest.clone()
        };
        backtest::run_with_journal(&dataset, self.strategy, &config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recommendation<'a> {
    Recommended(&'a BacktestResult),
    NoCandidateMetCriteria,
}

impl fmt::Display for Recommendation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Recommended(r) => write!(
                f,
                "recommended: {} (profit {:.0}, {:.2} trades/week, win rate {:.1}%)",
                r.code,
                r.total_profit,
                r.trades_per_week,
                r.win_rate * 100.0
            ),
            Recommendation::NoCandidateMetCriteria => write!(f, "no candidate met criteria"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    /// Results ordered by total profit, best first.
    pub ranking: Vec<BacktestResult>,
    pub skipped: Vec<SkippedCandidate>,
    /// Daily journal of every ranked candidate, keyed by code.
    pub journals: HashMap<String, DailyJournal>,
}

impl BatchReport {
    pub fn journal(&self, code: &str) -> Option<&DailyJournal> {
        self.journals.get(code)
    }

    /// Best-ranked result trading often enough and making money.
    pub fn recommend(&self, min_trades_per_week: f64) -> Recommendation<'_> {
        self.ranking
            .iter()
            .find(|r| r.trades_per_week >= min_trades_per_week && r.total_profit > 0.0)
            .map(Recommendation::Recommended)
            .unwrap_or(Recommendation::NoCandidateMetCriteria)
    }
}

/// Sort descending by total profit. Stable, so ties keep input order.
pub fn rank(results: &mut [BacktestResult]) {
    results.sort_by(|a, b| {
        b.total_profit
            .partial_cmp(&a.total_profit)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

pub fn run_batch(ctx: &BatchContext<'_>, codes: &[String]) -> BatchReport {
    let outcomes: Vec<Result<(BacktestResult, DailyJournal), KabuError>> = if ctx.parallel {
        codes
            .par_iter()
            .map(|code| ctx.run_candidate_with_journal(code))
            .collect()
    } else {
        codes
            .iter()
            .map(|code| ctx.run_candidate_with_journal(code))
            .collect()
    };

    let mut ranking = Vec::new();
    let mut skipped = Vec::new();
    let mut journals = HashMap::new();
    for (code, outcome) in codes.iter().zip(outcomes) {
        match outcome {
            Ok((result, journal)) => {
                journals.insert(code.clone(), journal);
                ranking.push(result);
            }
            Err(e) => {
                warn!("skipping {} ({})", code, e);
                skipped.push(SkippedCandidate {
                    code: code.clone(),
                    reason: SkipReason::from(e),
                });
            }
        }
    }

    rank(&mut ranking);

    if !skipped.is_empty() {
        info!(
            "backtested {} of {} candidates",
            ranking.len(),
            ranking.len() + skipped.len()
        );
    }

    BatchReport {
        ranking,
        skipped,
        journals,
    }
}
