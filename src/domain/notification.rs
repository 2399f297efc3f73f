//! Message text for signal notifications and ledger reports.

use crate::domain::indicator::IndicatorRow;
use crate::domain::ledger::{LedgerSummary, TradeRecord};
use crate::domain::signal::{Explanation, Signal, SignalDecision};

const SEPARATOR: &str = "---------------";

/// Which signals a stock wants to be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSettings {
    pub on_buy: bool,
    pub on_sell: bool,
    pub on_hold: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            on_buy: true,
            on_sell: true,
            on_hold: false,
        }
    }
}

impl NotificationSettings {
    pub fn wants(&self, signal: Signal) -> bool {
        match signal {
            Signal::Buy => self.on_buy,
            Signal::Sell => self.on_sell,
            Signal::Hold => self.on_hold,
        }
    }
}

/// Text announcing a decision for one stock.
pub fn signal_message(
    stock_name: &str,
    stock_code: &str,
    decision: &SignalDecision,
    latest: Option<&IndicatorRow>,
) -> String {
    let mut lines = vec![
        format!("[{} signal]", decision.signal),
        format!("Stock: {} ({})", stock_name, stock_code),
    ];

    match &decision.explanation {
        Explanation::RuleMatched { rule, values } => {
            lines.push(format!("Rule: {}", rule));
            if !values.is_empty() {
                lines.push("--- reference values ---".to_string());
                for (name, value) in values {
                    lines.push(format!("{}: {}", name, value));
                }
            }
        }
        other => lines.push(format!("Detail: {}", other.message())),
    }

    if let Some(row) = latest {
        lines.push(format!(
            "Last data: {} close: {:.2}",
            row.bar.date.format("%Y-%m-%d"),
            row.bar.close
        ));
    }

    lines.join("\n")
}

/// Latest settled result plus running totals. Empty when nothing is settled.
pub fn ledger_report(latest: Option<&TradeRecord>, summary: &LedgerSummary) -> String {
    let mut parts = Vec::new();

    if let Some(last) = latest {
        let outcome = if last.is_win() { "WIN" } else { "LOSS" };
        parts.push("[Latest result]".to_string());
        parts.push(format!(
            "{} signal -> {}\nP/L: {:+.0} JPY ({:+.1}%)",
            last.signal_date, outcome, last.profit, last.profit_rate
        ));
        parts.push(SEPARATOR.to_string());
    }

    if summary.trade_count > 0 {
        parts.push(format!(
            "[Running record (forward test)]\nTrades: {} ({} wins, {} losses)\nWin rate: {:.1}%\nP/L: {:+.0} JPY",
            summary.trade_count,
            summary.win_count,
            summary.loss_count(),
            summary.win_rate,
            summary.cumulative_profit
        ));
        parts.push(SEPARATOR.to_string());
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::TradeStatus;
    use crate::domain::ohlcv::PriceBar;
    use crate::domain::signal::HoldReason;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn row() -> IndicatorRow {
        IndicatorRow::new(PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            open: 2500.0,
            high: 2550.0,
            low: 2490.0,
            close: 2543.5,
            volume: 1.0,
        })
    }

    #[test]
    fn settings_select_signals() {
        let s = NotificationSettings {
            on_buy: true,
            on_sell: false,
            on_hold: false,
        };
        assert!(s.wants(Signal::Buy));
        assert!(!s.wants(Signal::Sell));
        assert!(!s.wants(Signal::Hold));
    }

    #[test]
    fn rule_message_lists_values_and_last_close() {
        let mut values = BTreeMap::new();
        values.insert("RSI_14".to_string(), 25.0);
        let decision = SignalDecision {
            signal: Signal::Buy,
            explanation: Explanation::RuleMatched {
                rule: "golden cross".to_string(),
                values,
            },
        };
        let text = signal_message("Toyota", "7203", &decision, Some(&row()));
        assert_eq!(
            text,
            "[BUY signal]\nStock: Toyota (7203)\nRule: golden cross\n--- reference values ---\nRSI_14: 25\nLast data: 2024-01-05 close: 2543.50"
        );
    }

    #[test]
    fn hold_message_has_detail() {
        let decision = SignalDecision::hold(HoldReason::NoRuleMatched);
        let text = signal_message("Toyota", "7203", &decision, None);
        assert!(text.ends_with("Detail: no rule matched"));
    }

    #[test]
    fn ledger_report_empty_without_results() {
        assert_eq!(ledger_report(None, &LedgerSummary::default()), "");
    }

    #[test]
    fn ledger_report_text() {
        let record = TradeRecord {
            signal_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            stock_code: "7203".to_string(),
            stock_name: "Toyota".to_string(),
            probability: 0.8,
            threshold: 0.7,
            holding_period_days: 3,
            status: TradeStatus::Done,
            buy_price: 2520.0,
            sell_price: 2600.0,
            profit: 9520.0,
            profit_rate: 3.17,
        };
        let summary = LedgerSummary {
            trade_count: 2,
            win_count: 1,
            win_rate: 50.0,
            cumulative_profit: 5950.0,
        };
        let text = ledger_report(Some(&record), &summary);
        assert!(text.starts_with("[Latest result]\n2024-01-02 signal -> WIN\nP/L: +9520 JPY (+3.2%)"));
        assert!(text.contains("Trades: 2 (1 wins, 1 losses)"));
        assert!(text.contains("Win rate: 50.0%"));
        assert!(text.contains("P/L: +5950 JPY"));
    }
}
