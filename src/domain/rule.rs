//! Rule condition AST and signal rule definitions.
//!
//! Conditions are a restricted expression language over two bound rows,
//! `latest` and `previous`:
//! - `Expr::Field`: a named value on one of the two rows
//! - `Expr::Number` / `Expr::Bool`: literals
//! - `Expr::Neg`, `Expr::Arith`: numeric arithmetic
//! - `Expr::Compare`: a single comparison (chains are desugared to `And`)
//! - `Expr::And`, `Expr::Or`, `Expr::Not`: boolean composition
//!
//! Nothing outside the two rows can be named, so a condition can never reach
//! process state.

use crate::domain::error::ParseError;
use crate::domain::rule_parser;
use crate::domain::signal::Signal;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRef {
    Latest,
    Previous,
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::Latest => write!(f, "latest"),
            RowRef::Previous => write!(f, "previous"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Field { row: RowRef, name: String },
    Neg(Box<Expr>),
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Names referenced on the `latest` row, in first-seen order without duplicates.
    pub fn latest_fields(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        self.collect_fields(RowRef::Latest, &mut seen, &mut out);
        out
    }

    fn collect_fields(&self, want: RowRef, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) | Expr::Bool(_) => {}
            Expr::Field { row, name } => {
                if *row == want && seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(inner) | Expr::Not(inner) => inner.collect_fields(want, seen, out),
            Expr::Arith { left, right, .. } | Expr::Compare { left, right, .. } => {
                left.collect_fields(want, seen, out);
                right.collect_fields(want, seen, out);
            }
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_fields(want, seen, out);
                }
            }
        }
    }
}

/// One condition of a rule: the source text and its parse outcome.
///
/// Parse failures are kept rather than raised so that a malformed condition
/// disables only its own rule at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub source: String,
    pub parsed: Result<Expr, ParseError>,
}

impl Condition {
    pub fn parse(source: &str) -> Self {
        Condition {
            source: source.trim().to_string(),
            parsed: rule_parser::parse(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalRule {
    pub name: String,
    pub action: Signal,
    pub conditions: Vec<Condition>,
}

impl SignalRule {
    pub fn new<S: AsRef<str>>(name: &str, action: Signal, conditions: &[S]) -> Self {
        SignalRule {
            name: name.to_string(),
            action,
            conditions: conditions.iter().map(|c| Condition::parse(c.as_ref())).collect(),
        }
    }

    /// First parse error among the conditions, if any.
    pub fn parse_error(&self) -> Option<(&str, &ParseError)> {
        self.conditions.iter().find_map(|c| match &c.parsed {
            Err(e) => Some((c.source.as_str(), e)),
            Ok(_) => None,
        })
    }

    /// Latest-row names referenced by any condition, in first-seen order.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for cond in &self.conditions {
            if let Ok(expr) = &cond.parsed {
                for name in expr.latest_fields() {
                    if seen.insert(name.clone()) {
                        out.push(name);
                    }
                }
            }
        }
        out
    }
}
