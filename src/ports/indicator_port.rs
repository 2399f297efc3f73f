//! Indicator computation port trait.

use crate::domain::indicator::{IndicatorParams, IndicatorRow};
use crate::domain::ohlcv::PriceBar;

pub trait IndicatorEngine {
    /// One row per input bar, same order. Values needing more history than
    /// is available are left undefined.
    fn compute_indicators(&self, prices: &[PriceBar], params: &IndicatorParams)
    -> Vec<IndicatorRow>;

    /// Feature columns this engine produces for `params`.
    fn column_names(&self, params: &IndicatorParams) -> Vec<String>;
}
