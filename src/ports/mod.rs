//! Port traits: the narrow interfaces the domain uses to reach the outside.

pub mod classifier_port;
pub mod config_port;
pub mod data_port;
pub mod indicator_port;
pub mod ledger_port;
pub mod notifier_port;
pub mod report_port;
