//! Rule evaluation engine.
//!
//! Evaluates signal rules against the two most recent indicator rows.
//!
//! # Evaluation Semantics
//!
//! - Rules are tried in the given order; the first rule whose conditions all
//!   hold decides the signal
//! - Conditions of a rule are AND-ed and short-circuit on the first `false`
//! - `and` / `or` inside a condition short-circuit the same way
//! - Booleans used as numbers count as `1.0` / `0.0`; a number used as a
//!   boolean is true when finite and non-zero
//! - A missing or undefined field, a division by zero, or a condition that
//!   did not parse makes the rule fail; the failure is logged and the next
//!   rule is tried

use crate::domain::error::ParseError;
use crate::domain::indicator::{IndicatorRow, Lookup};
use crate::domain::rule::{ArithOp, CmpOp, Expr, RowRef, SignalRule};
use crate::domain::signal::{Explanation, HoldReason, SignalDecision, round2};
use log::{debug, warn};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Num(f64),
    Bool(bool),
}

impl Value {
    pub fn as_num(self) -> f64 {
        match self {
            Value::Num(n) => n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
        }
    }

    pub fn truthy(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Num(n) => n.is_finite() && n != 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("{row}['{name}'] is not a column of the indicator rows")]
    MissingField { row: RowRef, name: String },

    #[error("{row}['{name}'] is undefined")]
    UndefinedValue { row: RowRef, name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("malformed condition '{condition}': {error}")]
    Malformed { condition: String, error: ParseError },
}

/// Evaluate one expression with `latest` and `previous` bound.
pub fn evaluate_expr(
    expr: &Expr,
    latest: &IndicatorRow,
    previous: &IndicatorRow,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Num(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Field { row, name } => {
            let source = match row {
                RowRef::Latest => latest,
                RowRef::Previous => previous,
            };
            match source.lookup(name) {
                Lookup::Value(v) => Ok(Value::Num(v)),
                Lookup::Undefined => Err(EvalError::UndefinedValue {
                    row: *row,
                    name: name.clone(),
                }),
                Lookup::Missing => Err(EvalError::MissingField {
                    row: *row,
                    name: name.clone(),
                }),
            }
        }
        Expr::Neg(inner) => {
            let v = evaluate_expr(inner, latest, previous)?;
            Ok(Value::Num(-v.as_num()))
        }
        Expr::Arith { op, left, right } => {
            let l = evaluate_expr(left, latest, previous)?.as_num();
            let r = evaluate_expr(right, latest, previous)?.as_num();
            let out = match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
                ArithOp::Mul => l * r,
                ArithOp::Div => {
                    if r == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l / r
                }
            };
            Ok(Value::Num(out))
        }
        Expr::Compare { op, left, right } => {
            let l = evaluate_expr(left, latest, previous)?.as_num();
            let r = evaluate_expr(right, latest, previous)?.as_num();
            let holds = match op {
                CmpOp::Lt => l < r,
                CmpOp::Le => l <= r,
                CmpOp::Gt => l > r,
                CmpOp::Ge => l >= r,
                CmpOp::Eq => l == r,
                CmpOp::Ne => l != r,
            };
            Ok(Value::Bool(holds))
        }
        Expr::And(items) => {
            for item in items {
                if !evaluate_expr(item, latest, previous)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Expr::Or(items) => {
            for item in items {
                if evaluate_expr(item, latest, previous)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Expr::Not(inner) => {
            let v = evaluate_expr(inner, latest, previous)?;
            Ok(Value::Bool(!v.truthy()))
        }
    }
}

/// Whether every condition of `rule` holds. Stops at the first `false`.
pub fn rule_fires(
    rule: &SignalRule,
    latest: &IndicatorRow,
    previous: &IndicatorRow,
) -> Result<bool, EvalError> {
    for condition in &rule.conditions {
        let expr = condition
            .parsed
            .as_ref()
            .map_err(|error| EvalError::Malformed {
                condition: condition.source.clone(),
                error: error.clone(),
            })?;
        let holds = evaluate_expr(expr, latest, previous)?.truthy();
        debug!(
            "rule '{}': condition '{}' -> {}",
            rule.name, condition.source, holds
        );
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Decide a signal from the last two rows of `rows`.
pub fn evaluate_signals(rows: &[IndicatorRow], rules: &[SignalRule]) -> SignalDecision {
    if rows.len() < 2 {
        return SignalDecision::hold(HoldReason::InsufficientData);
    }
    if rules.is_empty() {
        return SignalDecision::hold(HoldReason::NoRulesConfigured);
    }

    let latest = &rows[rows.len() - 1];
    let previous = &rows[rows.len() - 2];

    for rule in rules {
        if rule.conditions.is_empty() {
            warn!("rule '{}' has no conditions, skipping", rule.name);
            continue;
        }
        match rule_fires(rule, latest, previous) {
            Ok(true) => {
                let values: BTreeMap<String, f64> = rule
                    .referenced_fields()
                    .into_iter()
                    .filter_map(|name| latest.get(&name).map(|v| (name, round2(v))))
                    .collect();
                return SignalDecision {
                    signal: rule.action,
                    explanation: Explanation::RuleMatched {
                        rule: rule.name.clone(),
                        values,
                    },
                };
            }
            Ok(false) => {}
            Err(e) => warn!("rule '{}' failed on {}: {}", rule.name, latest.bar.date, e),
        }
    }

    SignalDecision::hold(HoldReason::NoRuleMatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::PriceBar;
    use crate::domain::rule::Condition;
    use crate::domain::signal::Signal;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn make_row(day: u32, values: &[(&str, f64)]) -> IndicatorRow {
        let mut row = IndicatorRow::new(PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1000.0,
        });
        for (name, v) in values {
            row = row.with_value(name, *v);
        }
        row
    }

    fn golden_cross_rows() -> Vec<IndicatorRow> {
        vec![
            make_row(2, &[("SMA_5", 100.0), ("SMA_25", 102.0), ("RSI_14", 50.0)]),
            make_row(3, &[("SMA_5", 101.0), ("SMA_25", 101.0), ("RSI_14", 60.0)]),
            make_row(4, &[("SMA_5", 103.0), ("SMA_25", 101.5), ("RSI_14", 25.0)]),
        ]
    }

    fn golden_cross_rule() -> SignalRule {
        SignalRule::new(
            "golden cross",
            Signal::Buy,
            &[
                "latest['SMA_5'] > latest['SMA_25']",
                "previous['SMA_5'] <= previous['SMA_25']",
                "latest['RSI_14'] < 70",
            ],
        )
    }

    #[test]
    fn golden_cross_is_buy() {
        let decision = evaluate_signals(&golden_cross_rows(), &[golden_cross_rule()]);
        assert_eq!(decision.signal, Signal::Buy);
        assert_eq!(decision.explanation.rule_applied(), Some("golden cross"));
        match decision.explanation {
            Explanation::RuleMatched { values, .. } => {
                assert_eq!(values.get("SMA_5"), Some(&103.0));
                assert_eq!(values.get("SMA_25"), Some(&101.5));
                assert_eq!(values.get("RSI_14"), Some(&25.0));
            }
            other => panic!("expected RuleMatched, got {:?}", other),
        }
    }

    #[test]
    fn fewer_than_two_rows_is_insufficient_data() {
        let rows = golden_cross_rows();
        let decision = evaluate_signals(&rows[..1], &[golden_cross_rule()]);
        assert_eq!(
            decision,
            SignalDecision::hold(HoldReason::InsufficientData)
        );
        let decision = evaluate_signals(&[], &[golden_cross_rule()]);
        assert_eq!(decision.signal, Signal::Hold);
    }

    #[test]
    fn empty_rule_list() {
        let decision = evaluate_signals(&golden_cross_rows(), &[]);
        assert_eq!(
            decision,
            SignalDecision::hold(HoldReason::NoRulesConfigured)
        );
    }

    #[test]
    fn no_rule_matched() {
        let rule = SignalRule::new("overbought", Signal::Sell, &["latest['RSI_14'] > 70"]);
        let decision = evaluate_signals(&golden_cross_rows(), &[rule]);
        assert_eq!(decision, SignalDecision::hold(HoldReason::NoRuleMatched));
    }

    #[test]
    fn rule_without_conditions_is_skipped() {
        let empty = SignalRule {
            name: "always".to_string(),
            action: Signal::Sell,
            conditions: Vec::new(),
        };
        let decision = evaluate_signals(&golden_cross_rows(), &[empty, golden_cross_rule()]);
        assert_eq!(decision.signal, Signal::Buy);
    }

    #[test]
    fn failing_rule_falls_through() {
        let missing = SignalRule::new("missing", Signal::Sell, &["latest['MACD_12_26_9'] > 0"]);
        let broken = SignalRule::new("broken", Signal::Sell, &["latest['RSI_14'] <"]);
        let div = SignalRule::new(
            "div",
            Signal::Sell,
            &["latest.RSI_14 / (latest.SMA_5 - 103) > 1"],
        );
        let decision = evaluate_signals(
            &golden_cross_rows(),
            &[missing, broken, div, golden_cross_rule()],
        );
        assert_eq!(decision.signal, Signal::Buy);
        assert_eq!(decision.explanation.rule_applied(), Some("golden cross"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let sell = SignalRule::new("low rsi sell", Signal::Sell, &["latest.RSI_14 < 30"]);
        let decision = evaluate_signals(&golden_cross_rows(), &[sell, golden_cross_rule()]);
        assert_eq!(decision.signal, Signal::Sell);
        assert_eq!(decision.explanation.rule_applied(), Some("low rsi sell"));
    }

    #[test]
    fn undefined_value_is_an_error() {
        let rows = vec![
            make_row(2, &[("SMA_25", f64::NAN)]),
            make_row(3, &[("SMA_25", f64::NAN)]),
        ];
        let expr = crate::domain::rule_parser::parse("latest.SMA_25 > 0").unwrap();
        let err = evaluate_expr(&expr, &rows[1], &rows[0]).unwrap_err();
        assert!(matches!(err, EvalError::UndefinedValue { .. }));
    }

    #[test]
    fn short_circuit_skips_failing_branch() {
        let rows = golden_cross_rows();
        let expr =
            crate::domain::rule_parser::parse("latest.RSI_14 < 30 or latest.MISSING > 0").unwrap();
        assert_eq!(
            evaluate_expr(&expr, &rows[2], &rows[1]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn price_fields_and_arithmetic() {
        let rows = golden_cross_rows();
        let expr = crate::domain::rule_parser::parse(
            "(latest['Close'] - latest['Open']) / latest.Open * 100 >= 0.4",
        )
        .unwrap();
        assert!(evaluate_expr(&expr, &rows[2], &rows[1]).unwrap().truthy());
    }

    #[test]
    fn malformed_condition_reports_source() {
        let rows = golden_cross_rows();
        let rule = SignalRule {
            name: "bad".to_string(),
            action: Signal::Buy,
            conditions: vec![Condition::parse("latest[")],
        };
        let err = rule_fires(&rule, &rows[2], &rows[1]).unwrap_err();
        assert!(err.to_string().contains("latest["));
    }

    proptest! {
        #[test]
        fn evaluation_is_idempotent(
            a in 0.0f64..200.0,
            b in 0.0f64..200.0,
            rsi in 0.0f64..100.0,
        ) {
            let rows = vec![
                make_row(2, &[("SMA_5", b), ("SMA_25", a), ("RSI_14", rsi)]),
                make_row(3, &[("SMA_5", a), ("SMA_25", b), ("RSI_14", rsi)]),
            ];
            let rules = [
                golden_cross_rule(),
                SignalRule::new("exit", Signal::Sell, &["latest.RSI_14 > 70"]),
            ];
            let first = evaluate_signals(&rows, &rules);
            let second = evaluate_signals(&rows, &rules);
            prop_assert_eq!(first, second);
        }
    }
}
