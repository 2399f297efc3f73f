//! Reference indicator engine.
//!
//! Produces, per bar:
//! - `SMA_n` for the short and long periods, plus `SMA_n_Rate` =
//!   (close - SMA) / SMA * 100
//! - `RSI_n` with Wilder smoothing (RSI = 100 when the average loss is 0)
//! - `MACD_f_s_g`, `MACDs_f_s_g` (signal) and `MACDh_f_s_g` (histogram),
//!   EMAs seeded with the SMA of their first window, plus `MACD_Rate`
//! - `BB_Position`, the close's position inside the Bollinger bands
//!   (population standard deviation, 0 = lower band, 1 = upper band)
//! - `ATR_n` with Wilder smoothing, plus `ATR_Rate`
//! - `Change_Rate_1/3/5` and `Volume_Change_1` as percent changes
//!
//! Every value needing more history than is available is undefined.

use crate::domain::indicator::{IndicatorParams, IndicatorRow};
use crate::domain::ohlcv::PriceBar;
use crate::ports::indicator_port::IndicatorEngine;

const CHANGE_PERIODS: [usize; 3] = [1, 3, 5];

#[derive(Debug, Default, Clone, Copy)]
pub struct TechnicalIndicators;

impl TechnicalIndicators {
    pub fn new() -> Self {
        TechnicalIndicators
    }
}

fn macd_suffix(params: &IndicatorParams) -> String {
    format!(
        "{}_{}_{}",
        params.macd_fast, params.macd_slow, params.macd_signal
    )
}

impl IndicatorEngine for TechnicalIndicators {
    fn compute_indicators(
        &self,
        prices: &[PriceBar],
        params: &IndicatorParams,
    ) -> Vec<IndicatorRow> {
        let closes: Vec<f64> = prices.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = prices.iter().map(|b| b.volume).collect();
        let macd_name = macd_suffix(params);

        let sma_short = sma(&closes, params.sma_short);
        let sma_long = sma(&closes, params.sma_long);
        let rsi_values = rsi(&closes, params.rsi_period);
        let (macd_line, macd_signal, macd_hist) = macd(
            &closes,
            params.macd_fast,
            params.macd_slow,
            params.macd_signal,
        );
        let bb_position = bollinger_position(
            &closes,
            params.bollinger_period,
            params.bollinger_stddev,
        );
        let atr_values = atr(prices, params.atr_period);
        let changes: Vec<Vec<Option<f64>>> = CHANGE_PERIODS
            .iter()
            .map(|n| pct_change(&closes, *n))
            .collect();
        let volume_change = pct_change(&volumes, 1);

        prices
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let close = bar.close;
                let mut row = IndicatorRow::new(bar.clone());

                row.insert(format!("SMA_{}", params.sma_short), sma_short[i]);
                row.insert(format!("SMA_{}", params.sma_long), sma_long[i]);
                row.insert(format!("RSI_{}", params.rsi_period), rsi_values[i]);
                row.insert(format!("MACD_{}", macd_name), macd_line[i]);
                row.insert(format!("MACDs_{}", macd_name), macd_signal[i]);
                row.insert(format!("MACDh_{}", macd_name), macd_hist[i]);
                row.insert("BB_Position", bb_position[i]);
                row.insert(format!("ATR_{}", params.atr_period), atr_values[i]);

                row.insert(
                    format!("SMA_{}_Rate", params.sma_short),
                    deviation_rate(close, sma_short[i]),
                );
                row.insert(
                    format!("SMA_{}_Rate", params.sma_long),
                    deviation_rate(close, sma_long[i]),
                );
                row.insert("MACD_Rate", ratio_to_close(macd_line[i], close));
                row.insert("ATR_Rate", ratio_to_close(atr_values[i], close));

                for (n, change) in CHANGE_PERIODS.iter().zip(&changes) {
                    row.insert(format!("Change_Rate_{}", n), change[i]);
                }
                row.insert("Volume_Change_1", volume_change[i]);
                row
            })
            .collect()
    }

    fn column_names(&self, params: &IndicatorParams) -> Vec<String> {
        let macd_name = macd_suffix(params);
        let mut names = vec![
            format!("SMA_{}", params.sma_short),
            format!("SMA_{}", params.sma_long),
            format!("RSI_{}", params.rsi_period),
            format!("MACD_{}", macd_name),
            format!("MACDs_{}", macd_name),
            format!("MACDh_{}", macd_name),
            "BB_Position".to_string(),
            format!("ATR_{}", params.atr_period),
            format!("SMA_{}_Rate", params.sma_short),
            format!("SMA_{}_Rate", params.sma_long),
            "MACD_Rate".to_string(),
            "ATR_Rate".to_string(),
        ];
        names.extend(CHANGE_PERIODS.iter().map(|n| format!("Change_Rate_{}", n)));
        names.push("Volume_Change_1".to_string());
        names
    }
}

fn deviation_rate(close: f64, average: Option<f64>) -> Option<f64> {
    match average {
        Some(avg) if avg != 0.0 => Some((close - avg) / avg * 100.0),
        _ => None,
    }
}

fn ratio_to_close(value: Option<f64>, close: f64) -> Option<f64> {
    match value {
        Some(v) if close != 0.0 => Some(v / close * 100.0),
        _ => None,
    }
}

/// Simple moving average. Warmup: first (period-1) values undefined.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out[i] = Some(sum / period as f64);
        }
    }
    out
}

/// EMA over a partially defined series. k = 2/(n+1), seeded with the SMA of
/// the first n defined values.
pub fn ema(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut seen = 0usize;
    let mut sum = 0.0;
    let mut ema = 0.0;

    for (i, value) in values.iter().enumerate() {
        let Some(v) = value else { continue };
        seen += 1;
        if seen < period {
            sum += v;
        } else if seen == period {
            sum += v;
            ema = sum / period as f64;
            out[i] = Some(ema);
        } else {
            ema = v * k + ema * (1.0 - k);
            out[i] = Some(ema);
        }
    }
    out
}

/// Wilder RSI. Warmup: first `period` values undefined.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i < period {
            avg_gain += gain;
            avg_loss += loss;
            continue;
        }
        if i == period {
            avg_gain = (avg_gain + gain) / period as f64;
            avg_loss = (avg_loss + loss) / period as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }
        out[i] = Some(if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        });
    }
    out
}

type MacdSeries = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

/// MACD line, signal line and histogram.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let defined: Vec<Option<f64>> = closes.iter().map(|c| Some(*c)).collect();
    let fast_ema = ema(&defined, fast);
    let slow_ema = ema(&defined, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    (line, signal_line, histogram)
}

/// %B: (close - lower) / (upper - lower). Undefined on a flat window.
pub fn bollinger_position(closes: &[f64], period: usize, mult: f64) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..closes.len() {
        let window = &closes[i + 1 - period..=i];
        let middle = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|c| {
                let diff = c - middle;
                diff * diff
            })
            .sum::<f64>()
            / period as f64;
        let width = 2.0 * mult * variance.sqrt();
        if width > 0.0 {
            let lower = middle - mult * variance.sqrt();
            out[i] = Some((closes[i] - lower) / width);
        }
    }
    out
}

/// Wilder ATR. The first bar's true range is high - low.
pub fn atr(bars: &[PriceBar], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }

    let true_ranges: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                let prev_close = bars[i - 1].close;
                (bar.high - bar.low)
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs())
            }
        })
        .collect();

    let mut current = true_ranges[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(current);
    for i in period..bars.len() {
        current = (current * (period - 1) as f64 + true_ranges[i]) / period as f64;
        out[i] = Some(current);
    }
    out
}

/// Percent change over `n` steps. Undefined when the base is 0.
pub fn pct_change(values: &[f64], n: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if n == 0 || i < n {
                return None;
            }
            let base = values[i - n];
            if base == 0.0 {
                None
            } else {
                Some((values[i] / base - 1.0) * 100.0)
            }
        })
        .collect()
}
