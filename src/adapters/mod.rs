//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_ledger_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod log_notifier;
pub mod logistic_classifier;
#[cfg(feature = "sqlite")]
pub mod sqlite_ledger_adapter;
pub mod technical_indicators;
