//! Report generation port trait.

use crate::domain::batch::{BatchReport, Recommendation};
use crate::domain::error::KabuError;

/// Port for writing batch backtest reports.
pub trait ReportPort {
    /// Writes the ranking together with the recommendation outcome.
    fn write_batch(
        &self,
        report: &BatchReport,
        recommendation: &Recommendation<'_>,
        output_path: &str,
    ) -> Result<(), KabuError>;
}
