//! Multi-stock monitoring run.
//!
//! For each enabled stock: fetch prices, compute indicators, decide a
//! signal, notify when the stock's settings ask for that signal, record BUY
//! signals in the ledger, then reconcile the ledger and send its report.
//!
//! One stock's data or evaluation failure never stops the others. Ledger
//! persistence failures abort the run.

use crate::domain::dataset::build_dataset;
use crate::domain::error::KabuError;
use crate::domain::indicator::{IndicatorParams, IndicatorRow};
use crate::domain::label::LabelSpec;
use crate::domain::ledger::TradeLedger;
use crate::domain::notification::signal_message;
use crate::domain::rule_eval::evaluate_signals;
use crate::domain::settings::StockSettings;
use crate::domain::signal::{HoldReason, Signal, SignalDecision, decide_from_probability};
use crate::ports::classifier_port::ClassifierFactory;
use crate::ports::data_port::PriceSource;
use crate::ports::indicator_port::IndicatorEngine;
use crate::ports::ledger_port::LedgerStore;
use crate::ports::notifier_port::Notifier;
use chrono::NaiveDate;
use log::{error, info, warn};

/// How a stock's signal is decided.
pub enum DecisionMode<'a> {
    /// The stock's rule list over the last two indicator rows.
    Rules,
    /// A classifier fitted on the stock's labeled history predicts the BUY
    /// probability of the latest row.
    Model {
        factory: &'a dyn ClassifierFactory,
        feature_columns: Vec<String>,
        threshold: f64,
    },
}

/// Collaborators for a monitoring run, passed explicitly.
pub struct MonitorContext<'a> {
    pub prices: &'a dyn PriceSource,
    pub indicators: &'a dyn IndicatorEngine,
    pub notifier: &'a dyn Notifier,
    pub recipient: Option<String>,
    pub params: IndicatorParams,
    pub label_spec: LabelSpec,
    pub mode: DecisionMode<'a>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StockOutcome {
    Disabled,
    Failed(String),
    Decided {
        signal: Signal,
        notified: bool,
        recorded: bool,
        report_sent: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorReport {
    pub outcomes: Vec<(String, StockOutcome)>,
}

impl MonitorReport {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, StockOutcome::Failed(_)))
            .count()
    }
}

impl MonitorContext<'_> {
    fn notify(&self, stock: &StockSettings, text: &str) -> bool {
        match &self.recipient {
            Some(recipient) => {
                let sent = self.notifier.send(recipient, text);
                if !sent {
                    error!("{}: notification delivery failed", stock.code);
                }
                sent
            }
            None => {
                warn!("{}: no recipient configured, notification skipped", stock.code);
                false
            }
        }
    }

    fn decide(
        &self,
        stock: &StockSettings,
        rows: &[IndicatorRow],
    ) -> Result<(SignalDecision, f64), KabuError> {
        match &self.mode {
            DecisionMode::Rules => {
                if stock.rules.is_empty() {
                    warn!("{}: no signal rules configured", stock.code);
                }
                Ok((evaluate_signals(rows, &stock.rules), 1.0))
            }
            DecisionMode::Model {
                factory,
                feature_columns,
                threshold,
            } => {
                let latest = match rows.last() {
                    Some(row) => row,
                    None => return Ok((SignalDecision::hold(HoldReason::InsufficientData), 0.0)),
                };
                let features: Option<Vec<f64>> =
                    feature_columns.iter().map(|c| latest.get(c)).collect();
                let Some(features) = features else {
                    warn!("{}: latest row has undefined features", stock.code);
                    return Ok((SignalDecision::hold(HoldReason::InsufficientData), 0.0));
                };

                let dataset = build_dataset(&stock.code, rows, feature_columns, &self.label_spec)?;
                let targets: Vec<f64> = dataset.rows.iter().map(|r| r.label.buy_target()).collect();
                let buys = targets.iter().filter(|t| **t > 0.5).count();
                if buys == 0 || buys == targets.len() {
                    return Err(KabuError::DegenerateTraining {
                        code: stock.code.clone(),
                    });
                }

                let mut classifier = factory.create();
                classifier.fit(&dataset.features(0..dataset.len()), &targets)?;
                let probability = classifier
                    .predict_probability(&[features])?
                    .first()
                    .copied()
                    .ok_or_else(|| KabuError::Classifier {
                        reason: "no probability returned".to_string(),
                    })?;
                Ok((decide_from_probability(probability, *threshold), probability))
            }
        }
    }

    fn threshold(&self) -> f64 {
        match &self.mode {
            DecisionMode::Rules => 1.0,
            DecisionMode::Model { threshold, .. } => *threshold,
        }
    }

    fn monitor_stock<S: LedgerStore>(
        &self,
        stock: &StockSettings,
        ledger: &mut TradeLedger<S>,
    ) -> Result<StockOutcome, KabuError> {
        let bars = self
            .prices
            .get_daily_prices(&stock.code, self.date_from, self.date_to)?;
        if bars.is_empty() {
            return Err(KabuError::NoData {
                code: stock.code.clone(),
            });
        }
        info!("{}: {} price bars", stock.code, bars.len());

        let rows = self.indicators.compute_indicators(&bars, &self.params);
        let (decision, probability) = self.decide(stock, &rows)?;
        info!(
            "{}: {} ({})",
            stock.code,
            decision.signal,
            decision.explanation.message()
        );

        let notified = if stock.notifications.wants(decision.signal) {
            let text = signal_message(&stock.name, &stock.code, &decision, rows.last());
            self.notify(stock, &text)
        } else {
            false
        };

        let mut recorded = false;
        if decision.signal == Signal::Buy {
            if let Some(latest) = rows.last() {
                recorded = ledger.record_signal(
                    latest.bar.date,
                    &stock.code,
                    &stock.name,
                    probability,
                    self.threshold(),
                    self.label_spec.horizon_days,
                )?;
            }
        }

        let report = ledger.daily_report(&stock.code, &bars)?;
        let report_sent = if report.is_empty() {
            false
        } else {
            self.notify(stock, &report)
        };

        Ok(StockOutcome::Decided {
            signal: decision.signal,
            notified,
            recorded,
            report_sent,
        })
    }
}

pub fn run_monitor<S: LedgerStore>(
    ctx: &MonitorContext<'_>,
    ledger: &mut TradeLedger<S>,
    stocks: &[StockSettings],
) -> Result<MonitorReport, KabuError> {
    let mut outcomes = Vec::with_capacity(stocks.len());

    for stock in stocks {
        if !stock.enabled {
            info!("{}: disabled, skipping", stock.code);
            outcomes.push((stock.code.clone(), StockOutcome::Disabled));
            continue;
        }
        info!("--- {} ({}) ---", stock.name, stock.code);
        match ctx.monitor_stock(stock, ledger) {
            Ok(outcome) => outcomes.push((stock.code.clone(), outcome)),
            Err(e) if e.is_skippable() => {
                warn!("{}: skipped ({})", stock.code, e);
                outcomes.push((stock.code.clone(), StockOutcome::Failed(e.to_string())));
            }
            Err(e) => return Err(e),
        }
    }

    info!("monitoring finished for {} stocks", stocks.len());
    Ok(MonitorReport { outcomes })
}
