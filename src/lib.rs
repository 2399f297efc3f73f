//! kabusignal: trading signal assistant for daily equities.
//!
//! Labels price history, evaluates signal rules, backtests candidates and
//! keeps a forward-test trade ledger.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
