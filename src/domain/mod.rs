//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod label;
pub mod signal;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod dataset;
pub mod backtest;
pub mod batch;
pub mod ledger;
pub mod notification;
pub mod monitor;
pub mod settings;
pub mod config_validation;
pub mod error;
