//! Price data access port trait.

use crate::domain::error::KabuError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;

pub trait PriceSource {
    /// Daily bars for `code` within `[from, to]`, sorted by date.
    ///
    /// An empty vector is a valid answer (unknown code or no trading days);
    /// `Err` is reserved for failures of the source itself.
    fn get_daily_prices(
        &self,
        code: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, KabuError>;
}
