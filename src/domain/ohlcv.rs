//! Daily price bar representation.

use crate::domain::error::KabuError;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Check that a series is strictly increasing by date and every bar holds
/// non-negative finite numbers.
pub fn validate_series(code: &str, bars: &[PriceBar]) -> Result<(), KabuError> {
    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_finite() {
            return Err(KabuError::DataSource {
                reason: format!("{}: non-finite or negative value on {}", code, bar.date),
            });
        }
        if i > 0 && bars[i - 1].date >= bar.date {
            return Err(KabuError::DataSource {
                reason: format!(
                    "{}: dates not strictly increasing at {} (previous {})",
                    code,
                    bar.date,
                    bars[i - 1].date
                ),
            });
        }
    }
    Ok(())
}

/// Position of the bar dated exactly `date`, if any. Requires a sorted series.
pub fn position_of(bars: &[PriceBar], date: NaiveDate) -> Option<usize> {
    bars.binary_search_by_key(&date, |b| b.date).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn ordered_series_is_valid() {
        let bars = vec![bar("2024-01-04", 100.0), bar("2024-01-05", 101.0)];
        assert!(validate_series("7203", &bars).is_ok());
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let bars = vec![bar("2024-01-04", 100.0), bar("2024-01-04", 101.0)];
        assert!(matches!(
            validate_series("7203", &bars),
            Err(KabuError::DataSource { .. })
        ));
    }

    #[test]
    fn nan_close_is_rejected() {
        let bars = vec![bar("2024-01-04", f64::NAN)];
        assert!(validate_series("7203", &bars).is_err());
    }

    #[test]
    fn position_of_exact_date() {
        let bars = vec![
            bar("2024-01-04", 100.0),
            bar("2024-01-05", 101.0),
            bar("2024-01-09", 102.0),
        ];
        let d = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(position_of(&bars, d), Some(2));
        let missing = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(position_of(&bars, missing), None);
    }
}
