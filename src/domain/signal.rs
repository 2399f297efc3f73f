//! Trade signals and the explanation attached to each decision.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Signal::Buy),
            "SELL" => Ok(Signal::Sell),
            "HOLD" => Ok(Signal::Hold),
            other => Err(format!("unknown action '{}', expected BUY, SELL or HOLD", other)),
        }
    }
}

/// Why a decision came out as HOLD without any rule or model firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    InsufficientData,
    NoRuleMatched,
    NoRulesConfigured,
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldReason::InsufficientData => write!(f, "insufficient data to evaluate"),
            HoldReason::NoRuleMatched => write!(f, "no rule matched"),
            HoldReason::NoRulesConfigured => write!(f, "no rules configured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Explanation {
    Hold(HoldReason),
    /// A rule fired. `values` holds the latest value of every indicator the
    /// rule referenced, rounded to two decimals.
    RuleMatched {
        rule: String,
        values: BTreeMap<String, f64>,
    },
    /// A model probability was compared against the decision threshold.
    Probability { probability: f64, threshold: f64 },
}

impl Explanation {
    pub fn rule_applied(&self) -> Option<&str> {
        match self {
            Explanation::RuleMatched { rule, .. } => Some(rule),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Explanation::Hold(reason) => reason.to_string(),
            Explanation::RuleMatched { rule, .. } => format!("matched rule '{}'", rule),
            Explanation::Probability {
                probability,
                threshold,
            } => {
                if probability >= threshold {
                    format!(
                        "model predicts BUY with probability {:.2}% (threshold {:.0}%)",
                        probability * 100.0,
                        threshold * 100.0
                    )
                } else {
                    format!(
                        "model BUY probability {:.2}% is below threshold {:.0}%",
                        probability * 100.0,
                        threshold * 100.0
                    )
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecision {
    pub signal: Signal,
    pub explanation: Explanation,
}

impl SignalDecision {
    pub fn hold(reason: HoldReason) -> Self {
        SignalDecision {
            signal: Signal::Hold,
            explanation: Explanation::Hold(reason),
        }
    }
}

/// BUY when the predicted probability reaches the threshold, HOLD otherwise.
pub fn decide_from_probability(probability: f64, threshold: f64) -> SignalDecision {
    let signal = if probability >= threshold {
        Signal::Buy
    } else {
        Signal::Hold
    };
    SignalDecision {
        signal,
        explanation: Explanation::Probability {
            probability,
            threshold,
        },
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
