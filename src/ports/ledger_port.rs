//! Trade ledger persistence port trait.

use crate::domain::error::KabuError;
use crate::domain::ledger::TradeRecord;

/// Flat table of trade records keyed by (signal_date, stock_code).
pub trait LedgerStore {
    /// All records in stored order. A store that does not exist yet is empty.
    fn load(&self) -> Result<Vec<TradeRecord>, KabuError>;

    fn append(&mut self, record: &TradeRecord) -> Result<(), KabuError>;

    /// Replace the stored table with `records`.
    fn save_all(&mut self, records: &[TradeRecord]) -> Result<(), KabuError>;
}

impl LedgerStore for Box<dyn LedgerStore> {
    fn load(&self) -> Result<Vec<TradeRecord>, KabuError> {
        (**self).load()
    }

    fn append(&mut self, record: &TradeRecord) -> Result<(), KabuError> {
        (**self).append(record)
    }

    fn save_all(&mut self, records: &[TradeRecord]) -> Result<(), KabuError> {
        (**self).save_all(records)
    }
}
