//! Walk-forward backtest simulator.
//!
//! The dataset is split chronologically: the first `split_ratio` share of
//! rows is the training partition, the rest is the test partition. A
//! [`ScoringStrategy`] assigns a BUY score to every test row; the simulator
//! then walks the test rows with a fixed budget:
//!
//! - at decision row `i` with `i + h < test_days`, if `score[i] >= threshold`
//!   and the budget covers one share at `open[i + 1]`, buy
//!   `floor(budget / open[i + 1])` shares
//! - sell them at `close[i + h]` and settle the profit into the budget
//! - only one position is open at a time; the next decision row is `i + h`
//!
//! There are no commissions or slippage.

use crate::domain::dataset::Dataset;
use crate::domain::error::KabuError;
use crate::domain::label::Label;
use crate::domain::rule::SignalRule;
use crate::domain::rule_eval::evaluate_signals;
use crate::domain::signal::Signal;
use crate::ports::classifier_port::ClassifierFactory;
use chrono::NaiveDate;
use log::{debug, info};

pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;
pub const DEFAULT_INITIAL_BUDGET: f64 = 300_000.0;
pub const DEFAULT_MIN_ROWS: usize = 50;
const TRADING_DAYS_PER_WEEK: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub split_ratio: f64,
    pub initial_budget: f64,
    pub decision_threshold: f64,
    pub horizon_days: usize,
    pub min_rows: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            split_ratio: DEFAULT_SPLIT_RATIO,
            initial_budget: DEFAULT_INITIAL_BUDGET,
            decision_threshold: 0.5,
            horizon_days: 1,
            min_rows: DEFAULT_MIN_ROWS,
        }
    }
}

/// Produces one BUY score per test row.
pub trait ScoringStrategy: Sync {
    fn name(&self) -> &str;

    /// Scores for rows `split..dataset.len()`. May read any row before
    /// `split` for training and any row up to the scored one for context.
    fn score(&self, dataset: &Dataset, split: usize) -> Result<Vec<f64>, KabuError>;
}

/// Fits a fresh classifier on the training partition and scores test rows
/// with its BUY probability.
pub struct ModelStrategy<'a> {
    factory: &'a dyn ClassifierFactory,
}

impl<'a> ModelStrategy<'a> {
    pub fn new(factory: &'a dyn ClassifierFactory) -> Self {
        Self { factory }
    }
}

impl ScoringStrategy for ModelStrategy<'_> {
    fn name(&self) -> &str {
        "model"
    }

    fn score(&self, dataset: &Dataset, split: usize) -> Result<Vec<f64>, KabuError> {
        let train = &dataset.rows[..split];
        let targets: Vec<f64> = train.iter().map(|r| r.label.buy_target()).collect();
        // Training is BUY vs rest, so both sides must be present.
        let buys = train.iter().filter(|r| r.label == Label::Buy).count();
        if buys == 0 || buys == train.len() {
            return Err(KabuError::DegenerateTraining {
                code: dataset.code.clone(),
            });
        }

        let mut classifier = self.factory.create();
        classifier.fit(&dataset.features(0..split), &targets)?;
        let scores = classifier.predict_probability(&dataset.features(split..dataset.len()))?;
        if scores.len() != dataset.len() - split {
            return Err(KabuError::Classifier {
                reason: format!(
                    "expected {} probabilities, got {}",
                    dataset.len() - split,
                    scores.len()
                ),
            });
        }
        Ok(scores)
    }
}

/// Scores 1.0 where the rule list says BUY over the row and its predecessor.
pub struct RuleStrategy {
    rules: Vec<SignalRule>,
}

impl RuleStrategy {
    pub fn new(rules: Vec<SignalRule>) -> Self {
        Self { rules }
    }
}

impl ScoringStrategy for RuleStrategy {
    fn name(&self) -> &str {
        "rules"
    }

    fn score(&self, dataset: &Dataset, split: usize) -> Result<Vec<f64>, KabuError> {
        Ok((split..dataset.len())
            .map(|i| {
                if i == 0 {
                    return 0.0;
                }
                let window = [dataset.rows[i - 1].row.clone(), dataset.rows[i].row.clone()];
                match evaluate_signals(&window, &self.rules).signal {
                    Signal::Buy => 1.0,
                    _ => 0.0,
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTrade {
    pub signal_date: NaiveDate,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u64,
    pub profit: f64,
    pub score: f64,
}

impl SimulatedTrade {
    pub fn cost(&self) -> f64 {
        self.entry_price * self.quantity as f64
    }

    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub code: String,
    pub strategy: String,
    pub initial_budget: f64,
    pub final_budget: f64,
    pub total_profit: f64,
    pub trade_count: usize,
    pub win_count: usize,
    /// Fraction of winning trades, 0 when there were none.
    pub win_rate: f64,
    pub trades_per_week: f64,
    pub test_days: usize,
    pub trades: Vec<SimulatedTrade>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct JournalEntry {
    pub date: NaiveDate,
    /// Budget after every trade that exited on or before this day.
    pub asset_value: f64,
    /// Whether a position was entered on this day.
    pub traded: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailyJournal {
    pub entries: Vec<JournalEntry>,
}

pub fn run(
    dataset: &Dataset,
    strategy: &dyn ScoringStrategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, KabuError> {
    run_with_journal(dataset, strategy, config).map(|(result, _)| result)
}

pub fn run_with_journal(
    dataset: &Dataset,
    strategy: &dyn ScoringStrategy,
    config: &BacktestConfig,
) -> Result<(BacktestResult, DailyJournal), KabuError> {
    if dataset.len() < config.min_rows {
        return Err(KabuError::InsufficientData {
            code: dataset.code.clone(),
            rows: dataset.len(),
            minimum: config.min_rows,
        });
    }
    if config.horizon_days == 0 {
        return Err(KabuError::invalid(
            "backtest",
            "horizon_days",
            "horizon_days must be at least 1",
        ));
    }

    let split = dataset.split_index(config.split_ratio);
    let test_days = dataset.len() - split;
    let scores = strategy.score(dataset, split)?;
    if scores.len() < test_days {
        return Err(KabuError::Classifier {
            reason: format!(
                "strategy '{}' scored {} of {} test rows",
                strategy.name(),
                scores.len(),
                test_days
            ),
        });
    }
    let h = config.horizon_days;

    let mut budget = config.initial_budget;
    let mut trades = Vec::new();
    let mut entered = vec![false; test_days];
    let mut exits: Vec<(usize, f64)> = Vec::new();

    let mut i = 0;
    while i + h < test_days {
        let score = scores[i];
        let entry_price = dataset.bar(split + i + 1).open;
        if score >= config.decision_threshold && entry_price > 0.0 && budget >= entry_price {
            let mut quantity = (budget / entry_price).floor() as u64;
            if quantity as f64 * entry_price > budget {
                quantity -= 1;
            }
            let exit_price = dataset.bar(split + i + h).close;
            let profit = (exit_price - entry_price) * quantity as f64;
            budget += profit;

            debug!(
                "{}: buy {} @ {:.2} on {}, sell @ {:.2} on {}, profit {:.2}",
                dataset.code,
                quantity,
                entry_price,
                dataset.bar(split + i + 1).date,
                exit_price,
                dataset.bar(split + i + h).date,
                profit
            );

            trades.push(SimulatedTrade {
                signal_date: dataset.bar(split + i).date,
                entry_date: dataset.bar(split + i + 1).date,
                exit_date: dataset.bar(split + i + h).date,
                entry_price,
                exit_price,
                quantity,
                profit,
                score,
            });
            entered[i + 1] = true;
            exits.push((i + h, budget));
            i += h;
        } else {
            i += 1;
        }
    }

    let mut entries = Vec::with_capacity(test_days);
    let mut asset_value = config.initial_budget;
    let mut pending = exits.iter().peekable();
    for (day, traded) in entered.iter().enumerate() {
        while let Some((_, after)) = pending.next_if(|(exit_day, _)| *exit_day <= day) {
            asset_value = *after;
        }
        entries.push(JournalEntry {
            date: dataset.bar(split + day).date,
            asset_value,
            traded: *traded,
        });
    }

    let trade_count = trades.len();
    let win_count = trades.iter().filter(|t| t.is_win()).count();
    let win_rate = if trade_count > 0 {
        win_count as f64 / trade_count as f64
    } else {
        0.0
    };
    let trades_per_week = if test_days > 0 {
        trade_count as f64 / (test_days as f64 / TRADING_DAYS_PER_WEEK)
    } else {
        0.0
    };

    let result = BacktestResult {
        code: dataset.code.clone(),
        strategy: strategy.name().to_string(),
        initial_budget: config.initial_budget,
        final_budget: budget,
        total_profit: budget - config.initial_budget,
        trade_count,
        win_count,
        win_rate,
        trades_per_week,
        test_days,
        trades,
    };

    info!(
        "{}: {} trades over {} test days, profit {:.0}, win rate {:.1}%",
        result.code,
        result.trade_count,
        result.test_days,
        result.total_profit,
        result.win_rate * 100.0
    );

    Ok((result, DailyJournal { entries }))
}
