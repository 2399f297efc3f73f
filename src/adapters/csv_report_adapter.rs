//! CSV ranking report.
//!
//! One row per ranked candidate, then a closing `recommendation` record
//! holding the chosen code or `no candidate met criteria`.

use crate::domain::batch::{BatchReport, Recommendation};
use crate::domain::error::KabuError;
use crate::ports::report_port::ReportPort;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct RankingRow<'a> {
    rank: usize,
    code: &'a str,
    profit: f64,
    trades_per_week: f64,
    /// Percent.
    win_rate: f64,
    trade_count: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        CsvReportAdapter
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_batch(
        &self,
        report: &BatchReport,
        recommendation: &Recommendation<'_>,
        output_path: &str,
    ) -> Result<(), KabuError> {
        let persistence = |e: csv::Error| KabuError::Persistence {
            reason: format!("{}: {}", output_path, e),
        };
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(output_path)
            .map_err(persistence)?;
        if report.ranking.is_empty() {
            wtr.write_record([
                "rank",
                "code",
                "profit",
                "trades_per_week",
                "win_rate",
                "trade_count",
            ])
            .map_err(persistence)?;
        }
        for (i, result) in report.ranking.iter().enumerate() {
            wtr.serialize(RankingRow {
                rank: i + 1,
                code: &result.code,
                profit: result.total_profit.round(),
                trades_per_week: (result.trades_per_week * 100.0).round() / 100.0,
                win_rate: (result.win_rate * 1000.0).round() / 10.0,
                trade_count: result.trade_count,
            })
            .map_err(persistence)?;
        }
        let chosen = match recommendation {
            Recommendation::Recommended(r) => r.code.as_str(),
            Recommendation::NoCandidateMetCriteria => "no candidate met criteria",
        };
        wtr.write_record(["recommendation", chosen])
            .map_err(persistence)?;
        wtr.flush()?;
        log::info!(
            "ranking of {} candidates written to {}",
            report.ranking.len(),
            output_path
        );
        Ok(())
    }
}
